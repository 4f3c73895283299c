use tracing::warn;

/// Remembers the mode of the first data row for the rest of the session.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct VariantDetector {
    detected: Option<u64>,
    mismatches: u64,
}

impl VariantDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected(&self) -> Option<u64> {
        self.detected
    }

    /// Rows seen after detection whose mode differed from the fixed variant.
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }

    /// Observes one data row's mode and returns the session variant.
    pub fn observe(&mut self, mode: u64) -> u64 {
        let Some(variant) = self.detected else {
            self.detected = Some(mode);
            return mode;
        };
        if mode != variant {
            if self.mismatches == 0 {
                warn!(variant, mode, "data row mode differs from detected variant");
            }
            self.mismatches += 1;
        }
        variant
    }
}
