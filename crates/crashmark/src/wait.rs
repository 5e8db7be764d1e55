//! Bounded wait for the crash dump writer.
//!
//! Device-loss errors reach the application asynchronously to the driver's
//! crash handling, so the dump writer may still be collecting when present
//! fails. The wait polls the dump status at a fixed interval until it is
//! `Finished` or `CollectingFailed`, or until the budget is spent. It always
//! ends within `budget + poll_interval` (plus the cost of the last poll).
//!
//! | state     | observed status                | elapsed    | next                    |
//! |-----------|--------------------------------|------------|-------------------------|
//! | `Polling` | `Finished`                     | any        | `Done(Finished)`        |
//! | `Polling` | `CollectingFailed`             | any        | `Done(CollectingFailed)`|
//! | `Polling` | other                          | `< budget` | sleep, `Polling`        |
//! | `Polling` | other                          | `>= budget`| `Done(TimedOut)`        |

use std::time::Duration;

use crashmark_types::{CrashDumpStatus, DumpOutcome};
use tracing::{debug, warn};

use crate::{Clock, MonitorConfig, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Polling,
    Done(DumpOutcome),
}

/// What the caller must do after feeding one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    Sleep(Duration),
    Done(DumpOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpWaitReport {
    pub outcome: DumpOutcome,
    pub final_status: CrashDumpStatus,
    pub elapsed: Duration,
    pub polls: u32,
}

#[derive(Debug, Clone)]
pub struct DumpWait {
    poll_interval: Duration,
    budget: Duration,
    state: WaitState,
    polls: u32,
    last_status: CrashDumpStatus,
}

impl DumpWait {
    pub fn new(poll_interval: Duration, budget: Duration) -> Self {
        Self {
            poll_interval,
            budget,
            state: WaitState::Polling,
            polls: 0,
            last_status: CrashDumpStatus::Unknown,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.poll_interval, config.dump_timeout)
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_status(&self) -> CrashDumpStatus {
        self.last_status
    }

    /// Feed one status observation taken `elapsed` after the wait started.
    pub fn observe(&mut self, status: CrashDumpStatus, elapsed: Duration) -> WaitStep {
        if let WaitState::Done(outcome) = self.state {
            return WaitStep::Done(outcome);
        }

        self.polls += 1;
        self.last_status = status;

        let step = match status {
            CrashDumpStatus::Finished => WaitStep::Done(DumpOutcome::Finished),
            CrashDumpStatus::CollectingFailed => WaitStep::Done(DumpOutcome::CollectingFailed),
            _ if elapsed >= self.budget => WaitStep::Done(DumpOutcome::TimedOut),
            _ => WaitStep::Sleep(self.poll_interval),
        };

        if let WaitStep::Done(outcome) = step {
            self.state = WaitState::Done(outcome);
        }
        step
    }

    /// Drive the wait to completion, sleeping on `clock` between polls.
    ///
    /// A failed status query counts as `Unknown`; the wait keeps polling.
    pub fn run<F>(mut self, clock: &dyn Clock, mut poll: F) -> DumpWaitReport
    where
        F: FnMut() -> Result<CrashDumpStatus, TrackerError>,
    {
        let started = clock.now();
        loop {
            let status = match poll() {
                Ok(status) => status,
                Err(e) => {
                    warn!(%e, "crash dump status query failed");
                    CrashDumpStatus::Unknown
                }
            };
            let elapsed = clock.now().saturating_sub(started);
            debug!(%status, elapsed_ms = elapsed.as_millis() as u64, "crash dump status");

            match self.observe(status, elapsed) {
                WaitStep::Sleep(interval) => clock.sleep(interval),
                WaitStep::Done(outcome) => {
                    return DumpWaitReport {
                        outcome,
                        final_status: status,
                        elapsed,
                        polls: self.polls,
                    };
                }
            }
        }
    }
}
