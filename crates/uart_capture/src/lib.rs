#![forbid(unsafe_code)]
//! Online capture of a device's line-oriented UART log into a durable file.
//!
//! The crate is the stateful core of the capture tooling. It provides:
//! - A bounded, timeout-tolerant line source over any `std::io::Read`.
//! - A pure classifier for the firmware's `CFG,` / CSV header / data row grammar.
//! - The capture session: start gating, variant detection, pre-detection buffering,
//!   lazily named output, and independent stop conditions.

mod classify;
mod config;
mod error;
mod gate;
mod naming;
mod outcome;
mod pending;
mod session;
mod sink;
mod source;
mod stop;
mod variant;

pub use classify::{classify, ClassifiedLine, DataRow, CFG_PREFIX, CSV_HEADER};
pub use config::{duration_from_secs, CaptureConfig, OutputTarget, StopConfig};
pub use error::{CaptureError, ConfigError, NamingError, SinkError, SourceError};
pub use gate::StartGate;
pub use naming::{auto_file_name, choose_non_overwriting_path, sanitize_token, NamingInputs};
pub use outcome::{CaptureOutcome, StopReason};
pub use pending::PendingLines;
pub use session::{CaptureObserver, CaptureSession, InterruptFlag};
pub use sink::OutputSink;
pub use source::{LineSource, ReaderLineSource, SourceLine, DEFAULT_MAX_LINE_BYTES};
pub use stop::StopEvaluator;
pub use variant::VariantDetector;
