use std::time::{Duration, Instant};

use crate::classify::DataRow;
use crate::config::StopConfig;
use crate::outcome::StopReason;

/// Decides when a session has captured enough.
#[derive(Debug, Clone, Copy)]
pub struct StopEvaluator {
    max_iter: Option<u64>,
    max_rows: Option<u64>,
    deadline: Option<Instant>,
}

impl StopEvaluator {
    pub fn new(config: &StopConfig, started_at: Instant) -> Self {
        Self {
            max_iter: config.max_iter(),
            max_rows: config.max_rows(),
            deadline: config
                .overall_timeout()
                .and_then(|timeout| started_at.checked_add(timeout)),
        }
    }

    /// Checked after each written data row. The iteration threshold takes precedence.
    pub fn after_row(&self, row: &DataRow, rows_written: u64) -> Option<StopReason> {
        if matches!(self.max_iter, Some(max) if row.iter >= max) {
            return Some(StopReason::IterReached);
        }
        if matches!(self.max_rows, Some(max) if rows_written >= max) {
            return Some(StopReason::RowsReached);
        }
        None
    }

    /// Checked once per loop iteration, whether or not a row arrived.
    pub fn deadline_passed(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(iter: u64) -> DataRow {
        DataRow {
            iter,
            mode: 1,
            high_wait: 0,
            low_hold: 0,
            spin: 0,
        }
    }

    #[test]
    fn iter_threshold_wins_over_rows() {
        let config = StopConfig {
            max_iter: Some(5),
            max_rows: Some(5),
            overall_timeout: None,
        };
        let stop = StopEvaluator::new(&config, Instant::now());
        assert_eq!(stop.after_row(&row(4), 4), None);
        assert_eq!(stop.after_row(&row(5), 5), Some(StopReason::IterReached));
        assert_eq!(stop.after_row(&row(2), 5), Some(StopReason::RowsReached));
    }

    #[test]
    fn disabled_thresholds_never_fire() {
        let config = StopConfig {
            max_iter: Some(0),
            max_rows: None,
            overall_timeout: Some(Duration::ZERO),
        };
        let start = Instant::now();
        let stop = StopEvaluator::new(&config, start);
        assert_eq!(stop.after_row(&row(u64::MAX), u64::MAX), None);
        assert!(!stop.deadline_passed(start + Duration::from_secs(3600)));
        assert_eq!(stop.remaining(start), None);
    }

    #[test]
    fn deadline_is_independent_of_rows() {
        let config = StopConfig {
            overall_timeout: Some(Duration::from_secs(2)),
            ..StopConfig::default()
        };
        let start = Instant::now();
        let stop = StopEvaluator::new(&config, start);
        assert!(!stop.deadline_passed(start + Duration::from_secs(1)));
        assert!(stop.deadline_passed(start + Duration::from_secs(2)));
    }
}
