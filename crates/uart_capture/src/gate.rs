use crate::classify::ClassifiedLine;

/// One-way latch that keeps boot chatter out of the capture.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StartGate {
    started: bool,
}

impl StartGate {
    /// A closed gate when `gating` is enabled, an already-open one otherwise.
    pub fn new(gating: bool) -> Self {
        Self { started: !gating }
    }

    pub fn is_open(&self) -> bool {
        self.started
    }

    /// Feeds one line through the gate and reports whether it may be recorded.
    ///
    /// A config banner or the CSV header opens a closed gate and is itself accepted.
    pub fn admit(&mut self, line: &ClassifiedLine<'_>) -> bool {
        if !self.started && line.is_start_marker() {
            self.started = true;
        }
        self.started
    }
}
