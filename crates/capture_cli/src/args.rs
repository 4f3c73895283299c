use std::path::PathBuf;

use clap::Args;

/// Options shared by live capture and replay.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Output file. When omitted the file is auto-named inside the output directory once
    /// the data mode is known.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Directory for auto-named captures (default: out/phase2).
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// TOML file supplying defaults for any option not given on the command line.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop after this many data rows (0 = never).
    #[arg(long)]
    pub stop_after_rows: Option<u64>,

    /// Stop after a data row with iter >= N (0 = never; default 500).
    #[arg(long)]
    pub stop_after_iter: Option<u64>,

    /// Disable the iteration stop condition.
    #[arg(long)]
    pub no_stop_after_iter: bool,

    /// Record immediately instead of waiting for a CFG line or the CSV header.
    #[arg(long)]
    pub start_immediately: bool,

    /// Stop after this many seconds regardless of rows (0 = never).
    #[arg(long)]
    pub overall_timeout: Option<f64>,

    /// Seconds to wait for a line before re-checking stop conditions (default 0.5).
    #[arg(long)]
    pub read_timeout: Option<f64>,

    /// Extra label appended to auto-generated file names.
    #[arg(long)]
    pub tag: Option<String>,

    /// Run id for auto-generated names; reuse it to pair captures. Defaults to a timestamp.
    #[arg(long)]
    pub run_id: Option<String>,

    /// Do not echo captured lines or progress to stdout.
    #[arg(long)]
    pub quiet: bool,

    /// Print the capture outcome as one JSON object on stdout.
    #[arg(long)]
    pub summary_json: bool,

    /// Exit with status 2 when no data row was captured.
    #[arg(long)]
    pub require_data: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CaptureArgs {
    /// Serial port, e.g. COM5 or /dev/ttyACM0.
    #[arg(long)]
    pub port: String,

    /// Baud rate (default 115200).
    #[arg(long)]
    pub baud: Option<u32>,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Raw log file to replay.
    pub input: PathBuf,

    /// Port label used in auto-generated file names.
    #[arg(long, default_value = "replay")]
    pub port: String,

    /// Baud rate recorded in auto-generated file names (default 115200).
    #[arg(long)]
    pub baud: Option<u32>,

    #[command(flatten)]
    pub session: SessionArgs,
}
