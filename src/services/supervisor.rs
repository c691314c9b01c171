//! Bounded retry for storage faults raised by worker cycles.
//!
//! A cycle that hits a storage fault is abandoned and retried after the normal
//! inter-cycle sleep. After `max_consecutive` faults in a row the worker stops
//! for good and leaves restarting to the process manager.

use crate::services::persistence::StoreError;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Retry after the next sleep.
    Retry { consecutive_failures: u32 },
    /// Stop the worker permanently.
    Fatal { consecutive_failures: u32 },
}

#[derive(Debug)]
pub struct FailureSupervisor {
    max_consecutive: u32,
    consecutive: u32,
}

impl FailureSupervisor {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            consecutive: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// A cycle finished without a storage fault.
    pub fn record_success(&mut self) {
        if self.consecutive > 0 {
            tracing::info!(
                previous_failures = self.consecutive,
                "Storage recovered, resetting failure count"
            );
        }
        self.consecutive = 0;
    }

    pub fn record_failure(&mut self, error: &StoreError) -> Escalation {
        self.consecutive += 1;
        metrics::counter!("worker_storage_faults_total").increment(1);

        if self.consecutive >= self.max_consecutive {
            tracing::error!(
                error = %error,
                consecutive_failures = self.consecutive,
                "Storage failed too many consecutive times, stopping worker"
            );
            Escalation::Fatal {
                consecutive_failures: self.consecutive,
            }
        } else {
            tracing::warn!(
                error = %error,
                consecutive_failures = self.consecutive,
                max_failures = self.max_consecutive,
                "Storage fault during cycle, will retry"
            );
            Escalation::Retry {
                consecutive_failures: self.consecutive,
            }
        }
    }
}

impl Default for FailureSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }
}
