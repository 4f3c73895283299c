use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use time::macros::format_description;
use time::OffsetDateTime;
use uart_capture::{duration_from_secs, CaptureConfig, NamingInputs, OutputTarget, StopConfig};

use crate::args::SessionArgs;

const DEFAULT_BAUD: u32 = 115_200;
const DEFAULT_STOP_AFTER_ITER: u64 = 500;
const DEFAULT_READ_TIMEOUT_SECS: f64 = 0.5;

/// Optional `--config` file. Every field is a fallback for the matching flag.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub baud: Option<u32>,
    pub out_dir: Option<PathBuf>,
    pub stop_after_rows: Option<u64>,
    pub stop_after_iter: Option<u64>,
    pub start_immediately: Option<bool>,
    pub overall_timeout: Option<f64>,
    pub read_timeout: Option<f64>,
    pub tag: Option<String>,
}

impl FileSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file `{}`", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file `{}`", path.display()))
    }
}

/// Everything the run needs once flags, config file, and defaults are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub capture: CaptureConfig,
    pub port: String,
    pub baud: u32,
    pub quiet: bool,
    pub summary_json: bool,
    pub require_data: bool,
}

impl Settings {
    pub fn resolve(port: String, baud: Option<u32>, args: SessionArgs) -> anyhow::Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };
        Self::merge(port, baud, args, file)
    }

    fn merge(
        port: String,
        baud: Option<u32>,
        args: SessionArgs,
        file: FileSettings,
    ) -> anyhow::Result<Self> {
        let baud = baud.or(file.baud).unwrap_or(DEFAULT_BAUD);
        let gating = !(args.start_immediately || file.start_immediately.unwrap_or(false));

        let max_iter = if args.no_stop_after_iter {
            0
        } else {
            args.stop_after_iter
                .or(file.stop_after_iter)
                .unwrap_or(DEFAULT_STOP_AFTER_ITER)
        };
        let max_rows = args.stop_after_rows.or(file.stop_after_rows).unwrap_or(0);
        let overall_timeout = duration_from_secs(
            "overall_timeout",
            args.overall_timeout.or(file.overall_timeout).unwrap_or(0.0),
        )?;
        let read_timeout = duration_from_secs(
            "read_timeout",
            args.read_timeout
                .or(file.read_timeout)
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        )?;

        let output = match args.out {
            Some(path) => OutputTarget::Explicit(path),
            None => OutputTarget::Auto {
                dir: args
                    .out_dir
                    .or(file.out_dir)
                    .unwrap_or_else(|| PathBuf::from("out").join("phase2")),
                naming: NamingInputs {
                    run_id: args.run_id.unwrap_or_else(timestamp_run_id),
                    port: port.clone(),
                    baud,
                    tag: args.tag.or(file.tag),
                },
            },
        };

        Ok(Self {
            capture: CaptureConfig {
                gating,
                stop: StopConfig {
                    max_iter: Some(max_iter),
                    max_rows: Some(max_rows),
                    overall_timeout: Some(overall_timeout),
                },
                read_timeout,
                output,
            },
            port,
            baud,
            quiet: args.quiet,
            summary_json: args.summary_json,
            require_data: args.require_data,
        })
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        self.capture.stop.overall_timeout()
    }
}

/// Local `YYYYMMDD_HHMMSS`, falling back to UTC when the offset is unknown.
fn timestamp_run_id() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    now.format(&format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
