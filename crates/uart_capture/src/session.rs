use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::classify::{classify, ClassifiedLine};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, SinkError, SourceError};
use crate::gate::StartGate;
use crate::outcome::{CaptureOutcome, StopReason};
use crate::pending::PendingLines;
use crate::sink::OutputSink;
use crate::source::{LineSource, SourceLine};
use crate::stop::StopEvaluator;
use crate::variant::VariantDetector;

/// Cooperative cancellation handle, checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callbacks for a surrounding UI (console echo, status lines).
pub trait CaptureObserver: Send {
    /// A line passed the start gate; called in arrival order, buffered or not.
    fn on_line_accepted(&mut self, _line: &str) {}
    fn on_output_opened(&mut self, _path: &Path, _variant: u64) {}
    fn on_stopped(&mut self, _reason: StopReason) {}
}

enum LoopExit {
    Stopped(StopReason),
    SourceFailed(SourceError),
    SinkFailed(SinkError),
}

/// Drives one capture from the first read to the closed output file.
pub struct CaptureSession<S: LineSource> {
    source: S,
    config: CaptureConfig,
    interrupt: InterruptFlag,
    observer: Option<Box<dyn CaptureObserver>>,
    gate: StartGate,
    variant: VariantDetector,
    pending: PendingLines,
    sink: OutputSink,
    rows_written: u64,
    lines_observed: u64,
    last_config: BTreeMap<String, String>,
}

impl<S: LineSource> CaptureSession<S> {
    pub fn new(source: S, config: CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let sink = OutputSink::new(config.output.clone(), config.gating, config.stop);
        Ok(Self {
            source,
            gate: StartGate::new(config.gating),
            config,
            interrupt: InterruptFlag::new(),
            observer: None,
            variant: VariantDetector::new(),
            pending: PendingLines::new(),
            sink,
            rows_written: 0,
            lines_observed: 0,
            last_config: BTreeMap::new(),
        })
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn CaptureObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// A clone of the flag this session polls; set it to stop the capture.
    pub fn interrupt_handle(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Runs the capture to completion.
    ///
    /// Whatever ends the loop, the output file is closed before this returns. A transport
    /// failure is reported as [`CaptureError::Transport`] carrying the partial outcome.
    pub fn run(mut self) -> Result<CaptureOutcome, CaptureError> {
        let started_at = Instant::now();
        let stop = StopEvaluator::new(&self.config.stop, started_at);

        let exit = self.capture_loop(&stop);

        self.source.close();
        let closed = self.sink.close();

        let stop_reason = match &exit {
            LoopExit::Stopped(reason) => *reason,
            LoopExit::SourceFailed(_) => StopReason::TransportError,
            LoopExit::SinkFailed(_) => StopReason::OutputError,
        };
        if let Some(observer) = self.observer.as_mut() {
            observer.on_stopped(stop_reason);
        }

        let outcome = CaptureOutcome {
            output_path: self.sink.path().map(Path::to_path_buf),
            rows_written: self.rows_written,
            lines_observed: self.lines_observed,
            lines_written: self.sink.lines_written(),
            detected_variant: self.variant.detected(),
            mode_mismatches: self.variant.mismatches(),
            oversized_lines: self.source.oversized_lines(),
            last_config: std::mem::take(&mut self.last_config),
            elapsed: started_at.elapsed(),
            stop_reason,
        };
        info!(
            reason = %stop_reason,
            rows = outcome.rows_written,
            lines = outcome.lines_observed,
            "capture finished"
        );

        match exit {
            LoopExit::Stopped(_) => {
                closed?;
                Ok(outcome)
            }
            LoopExit::SourceFailed(source) => {
                if let Err(err) = closed {
                    warn!("failed to close capture file after transport error: {err}");
                }
                Err(CaptureError::Transport {
                    source,
                    outcome: Box::new(outcome),
                })
            }
            LoopExit::SinkFailed(err) => {
                if let Err(close_err) = closed {
                    warn!("failed to close capture file after write error: {close_err}");
                }
                Err(err.into())
            }
        }
    }

    fn capture_loop(&mut self, stop: &StopEvaluator) -> LoopExit {
        loop {
            if self.interrupt.is_interrupted() {
                return LoopExit::Stopped(StopReason::UserInterrupt);
            }

            let now = Instant::now();
            if stop.deadline_passed(now) {
                return LoopExit::Stopped(StopReason::Timeout);
            }
            let timeout = stop
                .remaining(now)
                .map_or(self.config.read_timeout, |left| {
                    left.min(self.config.read_timeout)
                });

            let line = match self.source.next_line(timeout) {
                Ok(SourceLine::Line(line)) => line,
                Ok(SourceLine::Empty) => continue,
                Ok(SourceLine::End) => return LoopExit::Stopped(StopReason::EndOfSource),
                Err(err) => return LoopExit::SourceFailed(err),
            };
            self.lines_observed += 1;

            match self.process_line(line, stop) {
                Ok(None) => {}
                Ok(Some(reason)) => return LoopExit::Stopped(reason),
                Err(err) => return LoopExit::SinkFailed(err),
            }
        }
    }

    fn process_line(
        &mut self,
        line: String,
        stop: &StopEvaluator,
    ) -> Result<Option<StopReason>, SinkError> {
        let classified = classify(&line);
        let was_open = self.gate.is_open();
        if !self.gate.admit(&classified) {
            debug!(line = %line, "discarding line before start marker");
            return Ok(None);
        }
        if !was_open {
            info!("start marker seen, recording");
        }

        if let Some(observer) = self.observer.as_mut() {
            observer.on_line_accepted(&line);
        }

        let row = match classified {
            ClassifiedLine::Data(row) => row,
            ClassifiedLine::Config(cfg) => {
                self.last_config = cfg;
                self.record(&line)?;
                return Ok(None);
            }
            ClassifiedLine::Header | ClassifiedLine::Other(_) => {
                self.record(&line)?;
                return Ok(None);
            }
        };

        let variant = self.variant.observe(row.mode);
        if !self.sink.is_open() {
            self.open_output(variant)?;
        }
        self.sink.write_line(&line)?;
        self.rows_written += 1;

        Ok(stop.after_row(&row, self.rows_written))
    }

    /// Writes a non-data line, or holds it until the output file exists.
    fn record(&mut self, line: &str) -> Result<(), SinkError> {
        if self.sink.is_open() {
            self.sink.write_line(line)
        } else {
            self.pending.push(line.to_owned());
            Ok(())
        }
    }

    fn open_output(&mut self, variant: u64) -> Result<(), SinkError> {
        let path = self.sink.ensure_open(variant)?.to_path_buf();
        if let Some(observer) = self.observer.as_mut() {
            observer.on_output_opened(&path, variant);
        }
        let buffered = self.pending.drain();
        debug!(lines = buffered.len(), "flushing pre-detection lines");
        for line in &buffered {
            self.sink.write_line(line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputTarget, StopConfig};
    use crate::naming::NamingInputs;
    use crate::CSV_HEADER;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FixtureSource {
        lines: VecDeque<Result<SourceLine, SourceError>>,
    }

    impl FixtureSource {
        fn from_lines(lines: &[&str]) -> Self {
            Self {
                lines: lines
                    .iter()
                    .map(|l| Ok(SourceLine::Line((*l).to_string())))
                    .collect(),
            }
        }
    }

    impl LineSource for FixtureSource {
        fn next_line(&mut self, _timeout: Duration) -> Result<SourceLine, SourceError> {
            self.lines.pop_front().unwrap_or(Ok(SourceLine::End))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl CaptureObserver for Recorder {
        fn on_line_accepted(&mut self, line: &str) {
            self.0.lock().unwrap().push(format!("line:{line}"));
        }

        fn on_output_opened(&mut self, _path: &Path, variant: u64) {
            self.0.lock().unwrap().push(format!("open:{variant}"));
        }

        fn on_stopped(&mut self, reason: StopReason) {
            self.0.lock().unwrap().push(format!("stop:{reason}"));
        }
    }

    fn config(dir: &Path, stop: StopConfig) -> CaptureConfig {
        CaptureConfig {
            gating: true,
            stop,
            read_timeout: Duration::from_millis(10),
            output: OutputTarget::Auto {
                dir: dir.to_path_buf(),
                naming: NamingInputs {
                    run_id: "t".to_string(),
                    port: "loop".to_string(),
                    baud: 9600,
                    tag: None,
                },
            },
        }
    }

    fn read(path: &Option<PathBuf>) -> String {
        std::fs::read_to_string(path.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn pending_lines_precede_the_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixtureSource::from_lines(&[
            "boot",
            "CFG,realistic=1",
            "STATS,warmup",
            CSV_HEADER,
            "1,2,10,8,3",
            "after",
        ]);
        let outcome = CaptureSession::new(source, config(dir.path(), StopConfig::default()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(
            read(&outcome.output_path),
            format!("CFG,realistic=1\nSTATS,warmup\n{CSV_HEADER}\n1,2,10,8,3\nafter\n")
        );
        assert_eq!(outcome.stop_reason, StopReason::EndOfSource);
        assert_eq!(outcome.lines_observed, 6);
        assert_eq!(outcome.lines_written, 5);
        assert_eq!(outcome.detected_variant, Some(2));
        assert_eq!(
            outcome.last_config.get("realistic").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn observer_sees_accepted_lines_open_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let source = FixtureSource::from_lines(&["noise", CSV_HEADER, "1,1,1,1,1"]);
        let stop = StopConfig {
            max_rows: Some(1),
            ..StopConfig::default()
        };
        CaptureSession::new(source, config(dir.path(), stop))
            .unwrap()
            .with_observer(Box::new(recorder.clone()))
            .run()
            .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                format!("line:{CSV_HEADER}"),
                "line:1,1,1,1,1".to_string(),
                "open:1".to_string(),
                "stop:rows-reached".to_string(),
            ]
        );
    }

    #[test]
    fn interrupt_before_first_read_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let session = CaptureSession::new(
            FixtureSource::from_lines(&[CSV_HEADER, "1,1,1,1,1"]),
            config(dir.path(), StopConfig::default()),
        )
        .unwrap();
        session.interrupt_handle().interrupt();

        let outcome = session.run().unwrap();
        assert_eq!(outcome.stop_reason, StopReason::UserInterrupt);
        assert_eq!(outcome.output_path, None);
        assert_eq!(outcome.lines_observed, 0);
    }

    #[test]
    fn transport_error_runs_teardown_then_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FixtureSource::from_lines(&[CSV_HEADER, "1,1,1,1,1"]);
        source.lines.push_back(Err(SourceError::Disconnected));

        let err = CaptureSession::new(source, config(dir.path(), StopConfig::default()))
            .unwrap()
            .run()
            .unwrap_err();
        let (source, outcome) = match err {
            CaptureError::Transport { source, outcome } => (source, outcome),
            other => panic!("expected transport error, got {other:?}"),
        };
        assert!(matches!(source, SourceError::Disconnected));
        assert_eq!(outcome.stop_reason, StopReason::TransportError);
        assert_eq!(outcome.rows_written, 1);
        assert_eq!(
            read(&outcome.output_path),
            format!("{CSV_HEADER}\n1,1,1,1,1\n")
        );
    }

    #[test]
    fn unwritable_output_stops_with_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let mut cfg = config(dir.path(), StopConfig::default());
        // A directory cannot be created as a file.
        cfg.output = OutputTarget::Explicit(dir.path().to_path_buf());

        let err = CaptureSession::new(
            FixtureSource::from_lines(&[CSV_HEADER, "1,1,1,1,1", "2,1,1,1,1"]),
            cfg,
        )
        .unwrap()
        .with_observer(Box::new(recorder.clone()))
        .run()
        .unwrap_err();

        assert!(matches!(err, CaptureError::Sink(SinkError::Create { .. })));
        assert_eq!(
            recorder.0.lock().unwrap().last().map(String::as_str),
            Some("stop:output-error")
        );
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), StopConfig::default());
        cfg.read_timeout = Duration::ZERO;
        assert!(matches!(
            CaptureSession::new(FixtureSource::default(), cfg),
            Err(CaptureError::Config(_))
        ));
    }
}
