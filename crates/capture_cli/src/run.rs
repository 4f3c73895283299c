use std::fs::File;
use std::process::ExitCode;

use anyhow::Context;
use tracing::info;
use uart_capture::{
    CaptureError, CaptureOutcome, CaptureSession, LineSource, OutputTarget, ReaderLineSource,
};

use crate::args::{CaptureArgs, ReplayArgs};
use crate::echo::ConsoleEcho;
use crate::serial::SerialLineSource;
use crate::settings::Settings;

const EXIT_NO_DATA: u8 = 2;

pub async fn capture(args: CaptureArgs) -> anyhow::Result<ExitCode> {
    let settings = Settings::resolve(args.port, args.baud, args.session)?;
    let source =
        SerialLineSource::open(&settings.port, settings.baud, settings.capture.read_timeout)
            .with_context(|| format!("failed to open serial port `{}`", settings.port))?;
    execute(source, settings).await
}

pub async fn replay(args: ReplayArgs) -> anyhow::Result<ExitCode> {
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open input `{}`", args.input.display()))?;
    let settings = Settings::resolve(args.port, args.baud, args.session)?;
    execute(ReaderLineSource::new(file), settings).await
}

async fn execute<S>(source: S, settings: Settings) -> anyhow::Result<ExitCode>
where
    S: LineSource + Send + 'static,
{
    if !settings.quiet {
        print_banner(&settings);
    }

    let mut session = CaptureSession::new(source, settings.capture.clone())?;
    if !settings.quiet {
        session = session.with_observer(Box::new(ConsoleEcho::new()));
    }

    let interrupt = session.interrupt_handle();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            interrupt.interrupt();
        }
    });

    let result = tokio::task::spawn_blocking(move || session.run())
        .await
        .context("capture task panicked")?;
    signal_task.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(CaptureError::Transport { source, outcome }) => {
            report(&settings, &outcome)?;
            return Err(source).context("reading the device stream failed");
        }
        Err(err) => return Err(err.into()),
    };

    report(&settings, &outcome)?;
    if settings.require_data && !outcome.captured_data() {
        return Ok(ExitCode::from(EXIT_NO_DATA));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_banner(settings: &Settings) {
    let capture = &settings.capture;
    match &capture.output {
        OutputTarget::Explicit(path) => println!(
            "Capturing from {} @ {} -> {}",
            settings.port,
            settings.baud,
            path.display()
        ),
        OutputTarget::Auto { dir, .. } => println!(
            "Capturing from {} @ {} -> {} (auto file name)",
            settings.port,
            settings.baud,
            dir.display()
        ),
    }
    if let Some(rows) = capture.stop.max_rows() {
        println!("Auto-stop after {rows} CSV rows");
    }
    if let Some(iter) = capture.stop.max_iter() {
        println!("Auto-stop at iter == {iter}");
    }
    if let Some(timeout) = settings.overall_timeout() {
        println!("Auto-stop after {:.1}s", timeout.as_secs_f64());
    }
    if capture.gating {
        println!("Start-on-header enabled: waiting for CFG or CSV header...");
    }
    println!("(Press Ctrl+C to stop)\n");
}

fn report(settings: &Settings, outcome: &CaptureOutcome) -> anyhow::Result<()> {
    if settings.summary_json {
        println!("{}", serde_json::to_string(outcome)?);
    }
    if settings.quiet {
        return Ok(());
    }

    match &outcome.output_path {
        Some(path) => println!("Wrote raw log to: {}", path.display()),
        None => println!("No output file was created (CSV header/data not detected)."),
    }
    println!(
        "CSV rows captured: {} ({} lines observed, stop reason: {})",
        outcome.rows_written, outcome.lines_observed, outcome.stop_reason
    );
    if outcome.mode_mismatches > 0 {
        println!(
            "Note: {} rows reported a mode other than {}",
            outcome.mode_mismatches,
            outcome.detected_variant.unwrap_or_default()
        );
    }
    Ok(())
}
