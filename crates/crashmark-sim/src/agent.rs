use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use crashmark::CrashDumpStatus;
use tracing::{error, info, warn};

use crate::{SimDump, SimTracker};

/// How the simulated dump thread ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentBehavior {
    /// Write the dump and report `Finished`.
    Finish,
    /// Report `CollectingFailed` without writing anything.
    Fail,
    /// Never leave `InvokingCallback`.
    Stall,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub behavior: AgentBehavior,
    /// Total time spent collecting; split evenly around the resolver pass.
    pub collect_time: Duration,
    /// Where the finished dump is written as JSON.
    pub output: Option<PathBuf>,
}

impl AgentConfig {
    pub fn finishing(collect_time: Duration) -> Self {
        Self {
            behavior: AgentBehavior::Finish,
            collect_time,
            output: None,
        }
    }

    pub fn with_behavior(mut self, behavior: AgentBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Background thread standing in for the vendor's dump writer.
pub struct DumpAgent {
    inner: AgentInner,
}

enum AgentInner {
    Thread(JoinHandle<Option<SimDump>>),
    /// Thread spawn failed; the dump was collected on the caller's thread.
    Inline(Option<SimDump>),
}

impl DumpAgent {
    pub(crate) fn spawn(tracker: SimTracker, config: AgentConfig) -> Self {
        let worker = tracker.clone();
        let worker_config = config.clone();
        let spawned = std::thread::Builder::new()
            .name("crashmark-sim-dump".into())
            .spawn(move || run_agent(&worker, &worker_config));
        let inner = match spawned {
            Ok(thread) => AgentInner::Thread(thread),
            Err(e) => {
                error!(%e, "failed to spawn dump agent thread; collecting inline");
                AgentInner::Inline(run_agent(&tracker, &config))
            }
        };
        Self { inner }
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            AgentInner::Thread(thread) => thread.is_finished(),
            AgentInner::Inline(_) => true,
        }
    }

    /// Wait for the agent. Returns the dump it produced, if any. A stalled
    /// agent still exits its thread once the collect time has passed.
    pub fn join(self) -> Option<SimDump> {
        match self.inner {
            AgentInner::Thread(thread) => match thread.join() {
                Ok(dump) => dump,
                Err(_) => {
                    error!("dump agent thread panicked");
                    None
                }
            },
            AgentInner::Inline(dump) => dump,
        }
    }
}

fn run_agent(tracker: &SimTracker, config: &AgentConfig) -> Option<SimDump> {
    let half = config.collect_time / 2;
    tracker.set_status(CrashDumpStatus::Collecting);
    std::thread::sleep(half);

    if config.behavior == AgentBehavior::Fail {
        warn!("simulated dump collection failed");
        tracker.set_status(CrashDumpStatus::CollectingFailed);
        return None;
    }

    tracker.set_status(CrashDumpStatus::InvokingCallback);
    let dump = tracker.collect_dump();
    std::thread::sleep(config.collect_time - half);

    if config.behavior == AgentBehavior::Stall {
        warn!("simulated dump agent stalled in callback");
        return Some(dump);
    }

    if let Some(path) = &config.output {
        match dump.to_json() {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    error!(%e, path = %path.display(), "failed to write crash dump");
                    tracker.set_status(CrashDumpStatus::CollectingFailed);
                    return Some(dump);
                }
                info!(path = %path.display(), "wrote crash dump");
            }
            Err(e) => {
                error!(%e, "failed to serialize crash dump");
                tracker.set_status(CrashDumpStatus::CollectingFailed);
                return Some(dump);
            }
        }
    }

    tracker.set_status(CrashDumpStatus::Finished);
    Some(dump)
}
