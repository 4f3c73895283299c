use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    IterReached,
    RowsReached,
    Timeout,
    UserInterrupt,
    TransportError,
    /// The capture file could not be created or written.
    OutputError,
    EndOfSource,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::IterReached => "iter-reached",
            StopReason::RowsReached => "rows-reached",
            StopReason::Timeout => "timeout",
            StopReason::UserInterrupt => "user-interrupt",
            StopReason::TransportError => "transport-error",
            StopReason::OutputError => "output-error",
            StopReason::EndOfSource => "end-of-source",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished session recorded and why it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureOutcome {
    /// `None` when no data row ever arrived, so no file was created.
    pub output_path: Option<PathBuf>,
    pub rows_written: u64,
    /// Every line read from the source, including ones the gate discarded.
    pub lines_observed: u64,
    pub lines_written: u64,
    pub detected_variant: Option<u64>,
    pub mode_mismatches: u64,
    pub oversized_lines: u64,
    /// Payload of the most recent `CFG,` line.
    pub last_config: BTreeMap<String, String>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl CaptureOutcome {
    pub fn captured_data(&self) -> bool {
        self.rows_written > 0
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
