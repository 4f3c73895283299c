use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::naming::NamingInputs;

/// Stop thresholds fixed for the lifetime of a session.
///
/// `None` and zero both mean "never trigger".
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StopConfig {
    pub max_iter: Option<u64>,
    pub max_rows: Option<u64>,
    pub overall_timeout: Option<Duration>,
}

impl StopConfig {
    pub fn max_iter(&self) -> Option<u64> {
        self.max_iter.filter(|n| *n > 0)
    }

    pub fn max_rows(&self) -> Option<u64> {
        self.max_rows.filter(|n| *n > 0)
    }

    pub fn overall_timeout(&self) -> Option<Duration> {
        self.overall_timeout.filter(|d| !d.is_zero())
    }
}

/// Where the capture file goes.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OutputTarget {
    /// Fixed before the session starts; used as-is.
    Explicit(PathBuf),
    /// Named inside `dir` once the variant is known.
    Auto { dir: PathBuf, naming: NamingInputs },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CaptureConfig {
    /// Discard input until a `CFG,` line or the CSV header shows up.
    pub gating: bool,
    pub stop: StopConfig,
    pub read_timeout: Duration,
    pub output: OutputTarget,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            gating: true,
            stop: StopConfig::default(),
            read_timeout: Duration::from_millis(500),
            output: OutputTarget::Auto {
                dir: PathBuf::from("out").join("phase2"),
                naming: NamingInputs::default(),
            },
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroReadTimeout);
        }
        Ok(())
    }
}

/// Converts user-facing fractional seconds into a [`Duration`].
pub fn duration_from_secs(field: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    if !secs.is_finite() {
        return Err(ConfigError::NonFiniteDuration { field });
    }
    if secs < 0.0 {
        return Err(ConfigError::NegativeDuration { field, secs });
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::DurationOutOfRange { field, secs })
}
