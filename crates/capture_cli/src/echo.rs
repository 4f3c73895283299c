use std::io::{self, Write};
use std::path::Path;

use uart_capture::{CaptureObserver, StopReason};

/// Mirrors accepted lines and capture milestones to stdout.
pub struct ConsoleEcho {
    out: io::Stdout,
}

impl ConsoleEcho {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        // Echo is best-effort; a closed stdout must not end the capture.
        let _ = out.write_fmt(text).and_then(|()| out.flush());
    }
}

impl CaptureObserver for ConsoleEcho {
    fn on_line_accepted(&mut self, line: &str) {
        self.emit(format_args!("{line}\n"));
    }

    fn on_output_opened(&mut self, path: &Path, variant: u64) {
        self.emit(format_args!(
            "\nDetected mode={variant}; writing to {}\n\n",
            path.display()
        ));
    }

    fn on_stopped(&mut self, reason: StopReason) {
        let message = match reason {
            StopReason::IterReached => "Iteration threshold reached, stopping.",
            StopReason::RowsReached => "Row threshold reached, stopping.",
            StopReason::Timeout => "Overall timeout reached, stopping.",
            StopReason::UserInterrupt => "Stopped by user.",
            StopReason::TransportError => "Transport error, stopping.",
            StopReason::OutputError => "Could not write the capture file, stopping.",
            StopReason::EndOfSource => "Input ended.",
        };
        self.emit(format_args!("\n{message}\n"));
    }
}
