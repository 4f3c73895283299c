use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{OutputTarget, StopConfig};
use crate::error::SinkError;
use crate::naming::{auto_file_name, choose_non_overwriting_path};

enum SinkState {
    Unopened,
    Open {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    Closed {
        path: Option<PathBuf>,
    },
}

/// Owns the capture file from path resolution to close.
///
/// Lifecycle is `Unopened -> Open -> Closed`; a file is created at most once and is
/// never renamed or reopened. Every written line is flushed before `write_line`
/// returns.
pub struct OutputSink {
    target: OutputTarget,
    gating: bool,
    stop: StopConfig,
    state: SinkState,
    lines_written: u64,
}

impl OutputSink {
    /// `gating` and `stop` only feed the auto-generated file name.
    pub fn new(target: OutputTarget, gating: bool, stop: StopConfig) -> Self {
        Self {
            target,
            gating,
            stop,
            state: SinkState::Unopened,
            lines_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SinkState::Open { .. })
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            SinkState::Unopened => None,
            SinkState::Open { path, .. } => Some(path),
            SinkState::Closed { path } => path.as_deref(),
        }
    }

    fn resolve_path(&self, variant: u64) -> Result<PathBuf, SinkError> {
        match &self.target {
            OutputTarget::Explicit(path) => Ok(path.clone()),
            OutputTarget::Auto { dir, naming } => {
                let name = auto_file_name(variant, naming, self.gating, &self.stop);
                Ok(choose_non_overwriting_path(&dir.join(name))?)
            }
        }
    }

    /// Creates the capture file on the first call; later calls return the same path.
    pub fn ensure_open(&mut self, variant: u64) -> Result<&Path, SinkError> {
        if let SinkState::Unopened = self.state {
            let path = self.resolve_path(variant)?;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|source| SinkError::Create {
                        path: path.clone(),
                        source,
                    })?;
                }
            }
            let file = File::create(&path).map_err(|source| SinkError::Create {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), variant, "opened capture file");
            self.state = SinkState::Open {
                path,
                writer: BufWriter::new(file),
            };
        }

        match &self.state {
            SinkState::Open { path, .. } => Ok(path),
            SinkState::Unopened | SinkState::Closed { .. } => Err(SinkError::NotOpen),
        }
    }

    /// Appends `line` plus `\n` and flushes it to the OS.
    pub fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let (path, writer) = match &mut self.state {
            SinkState::Open { path, writer } => (path, writer),
            SinkState::Unopened | SinkState::Closed { .. } => return Err(SinkError::NotOpen),
        };
        writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush())
            .map_err(|source| SinkError::Write {
                path: path.clone(),
                source,
            })?;
        self.lines_written += 1;
        debug!(bytes = line.len(), "wrote capture line");
        Ok(())
    }

    /// Flushes and closes the file if one is open. Safe to call more than once.
    pub fn close(&mut self) -> Result<Option<PathBuf>, SinkError> {
        let state = std::mem::replace(&mut self.state, SinkState::Closed { path: None });
        match state {
            SinkState::Unopened => Ok(None),
            SinkState::Closed { path } => {
                self.state = SinkState::Closed { path: path.clone() };
                Ok(path)
            }
            SinkState::Open { path, mut writer } => {
                self.state = SinkState::Closed {
                    path: Some(path.clone()),
                };
                writer.flush().map_err(|source| SinkError::Write {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), lines = self.lines_written, "closed capture file");
                Ok(Some(path))
            }
        }
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close capture file: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingInputs;

    fn auto_target(dir: &Path) -> OutputTarget {
        OutputTarget::Auto {
            dir: dir.join("nested"),
            naming: NamingInputs {
                run_id: "run1".to_string(),
                port: "COM5".to_string(),
                baud: 115_200,
                tag: None,
            },
        }
    }

    #[test]
    fn auto_path_is_resolved_once_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputSink::new(auto_target(dir.path()), true, StopConfig::default());
        assert_eq!(sink.path(), None);

        let first = sink.ensure_open(2).unwrap().to_path_buf();
        assert_eq!(
            first,
            dir.path()
                .join("nested")
                .join("mode2_run1_pCOM5_b115200_hdr1_iter0.txt")
        );
        let again = sink.ensure_open(7).unwrap().to_path_buf();
        assert_eq!(first, again);

        sink.write_line("header").unwrap();
        sink.write_line("1,2,3,4,5").unwrap();
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "header\n1,2,3,4,5\n");
        assert_eq!(sink.close().unwrap(), Some(first.clone()));
        assert_eq!(sink.close().unwrap(), Some(first));
        assert!(matches!(sink.ensure_open(2), Err(SinkError::NotOpen)));
        assert!(matches!(sink.write_line("late"), Err(SinkError::NotOpen)));
    }

    #[test]
    fn existing_auto_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        let taken = nested.join("mode1_run1_pCOM5_b115200_hdr1_iter0.txt");
        std::fs::write(&taken, "keep me").unwrap();

        let mut sink = OutputSink::new(auto_target(dir.path()), true, StopConfig::default());
        let path = sink.ensure_open(1).unwrap().to_path_buf();
        assert_eq!(path, nested.join("mode1_run1_pCOM5_b115200_hdr1_iter0_2.txt"));
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "keep me");
    }

    #[test]
    fn explicit_path_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("capture.txt");
        let mut sink = OutputSink::new(
            OutputTarget::Explicit(explicit.clone()),
            false,
            StopConfig::default(),
        );
        assert_eq!(sink.ensure_open(3).unwrap(), explicit.as_path());
    }

    #[test]
    fn unopened_sink_closes_to_none_and_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = OutputSink::new(auto_target(dir.path()), true, StopConfig::default());
        assert!(matches!(sink.write_line("x"), Err(SinkError::NotOpen)));
        assert_eq!(sink.close().unwrap(), None);
        assert!(!dir.path().join("nested").exists());
    }
}
