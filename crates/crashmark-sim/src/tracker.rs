use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crashmark::{
    CrashDumpStatus, CrashTracker, DumpDescription, MarkerId, MarkerPayload, MarkerResolver,
    TrackerError, TrackingFeatures,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{AgentConfig, Breadcrumb, DumpAgent, SimDump};

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
}

impl SimDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone)]
pub struct SimCommandList {
    pub name: String,
}

impl SimCommandList {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Tracking handle for one simulated command list. Not `Clone`: releasing
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct SimContextHandle {
    id: u64,
}

impl SimContextHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMarker {
    Token(MarkerId),
    Inline(String),
}

struct ContextRecord {
    command_list: String,
    markers_set: u64,
    last: Option<RecordedMarker>,
}

#[derive(Default)]
pub(crate) struct SimState {
    description: Option<DumpDescription>,
    resolver: Option<Arc<dyn MarkerResolver>>,
    device: Option<String>,
    features: Option<TrackingFeatures>,
    next_handle: u64,
    contexts: BTreeMap<u64, ContextRecord>,
    released: Vec<u64>,
    status: Option<CrashDumpStatus>,
    script: VecDeque<CrashDumpStatus>,
    status_queries: u32,
    fail_enable: bool,
    fail_device_init: bool,
    fail_context_creation: bool,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct SimTracker {
    state: Arc<Mutex<SimState>>,
}

impl SimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses returned by successive status queries; the last one repeats.
    pub fn script_status(&self, statuses: impl IntoIterator<Item = CrashDumpStatus>) {
        let mut state = self.state.lock();
        state.script = statuses.into_iter().collect();
    }

    pub(crate) fn set_status(&self, status: CrashDumpStatus) {
        self.state.lock().status = Some(status);
    }

    pub fn fail_enable_crash_dumps(&self) {
        self.state.lock().fail_enable = true;
    }

    pub fn fail_device_initialization(&self) {
        self.state.lock().fail_device_init = true;
    }

    pub fn fail_context_creation(&self) {
        self.state.lock().fail_context_creation = true;
    }

    pub fn features(&self) -> Option<TrackingFeatures> {
        self.state.lock().features
    }

    pub fn device_name(&self) -> Option<String> {
        self.state.lock().device.clone()
    }

    pub fn has_resolver(&self) -> bool {
        self.state.lock().resolver.is_some()
    }

    pub fn live_contexts(&self) -> usize {
        self.state.lock().contexts.len()
    }

    pub fn released_contexts(&self) -> Vec<u64> {
        self.state.lock().released.clone()
    }

    pub fn status_queries(&self) -> u32 {
        self.state.lock().status_queries
    }

    /// Last marker set on the context with this handle id.
    pub fn last_marker(&self, context: u64) -> Option<RecordedMarker> {
        self.state
            .lock()
            .contexts
            .get(&context)
            .and_then(|c| c.last.clone())
    }

    /// Simulate a device loss: start the dump agent that collects the dump
    /// in the background. Present calls should report failure from here on.
    pub fn device_lost(&self, config: AgentConfig) -> DumpAgent {
        info!(behavior = ?config.behavior, "simulated GPU device loss");
        self.set_status(CrashDumpStatus::Collecting);
        DumpAgent::spawn(self.clone(), config)
    }

    /// Resolve every live context's last marker into a dump, the way the
    /// vendor dump thread would.
    pub fn collect_dump(&self) -> SimDump {
        // resolver calls happen outside the tracker lock
        let (description, device, features, resolver, contexts) = {
            let state = self.state.lock();
            let contexts: Vec<(u64, String, u64, Option<RecordedMarker>)> = state
                .contexts
                .iter()
                .map(|(id, c)| (*id, c.command_list.clone(), c.markers_set, c.last.clone()))
                .collect();
            (
                state.description.clone(),
                state.device.clone(),
                state.features,
                state.resolver.clone(),
                contexts,
            )
        };

        let breadcrumbs = contexts
            .into_iter()
            .map(|(context, command_list, markers_set, last)| {
                let (token, text) = match last {
                    Some(RecordedMarker::Token(id)) => {
                        let text = resolver
                            .as_ref()
                            .and_then(|r| r.resolve_marker(id))
                            .map(|t| t.to_string());
                        debug!(context, token = id.get(), resolved = text.is_some(), "resolved marker");
                        (Some(id.get()), text)
                    }
                    Some(RecordedMarker::Inline(text)) => (None, Some(text)),
                    None => (None, None),
                };
                Breadcrumb {
                    context,
                    command_list,
                    markers_set,
                    token,
                    text,
                }
            })
            .collect();

        let description = description.unwrap_or_else(|| DumpDescription::new("unknown", "unknown"));
        SimDump {
            application_name: description.application_name,
            application_version: description.application_version,
            user_defined: description.user_defined,
            device,
            feature_bits: features.map(TrackingFeatures::to_bits).unwrap_or(0),
            breadcrumbs,
        }
    }
}

impl CrashTracker for SimTracker {
    type Device = SimDevice;
    type CommandList = SimCommandList;
    type ContextHandle = SimContextHandle;

    fn enable_crash_dumps(
        &self,
        description: &DumpDescription,
        resolver: Arc<dyn MarkerResolver>,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        if state.fail_enable {
            return Err(TrackerError::Unavailable("crash dump collection"));
        }
        state.description = Some(description.clone());
        state.resolver = Some(resolver);
        state.status = Some(CrashDumpStatus::NotStarted);
        Ok(())
    }

    fn initialize_device(
        &self,
        device: &SimDevice,
        features: &TrackingFeatures,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        if state.fail_device_init {
            return Err(TrackerError::Vendor {
                call: "initialize_device",
                code: 0xBAD0_0002,
            });
        }
        state.device = Some(device.name.clone());
        state.features = Some(*features);
        Ok(())
    }

    fn crash_dump_status(&self) -> Result<CrashDumpStatus, TrackerError> {
        let mut state = self.state.lock();
        state.status_queries += 1;
        if state.script.len() > 1 {
            if let Some(next) = state.script.pop_front() {
                return Ok(next);
            }
        }
        if let Some(last) = state.script.front() {
            return Ok(*last);
        }
        Ok(state.status.unwrap_or(CrashDumpStatus::Unknown))
    }

    fn create_context(
        &self,
        command_list: &SimCommandList,
    ) -> Result<SimContextHandle, TrackerError> {
        let mut state = self.state.lock();
        if state.fail_context_creation {
            return Err(TrackerError::Vendor {
                call: "create_context",
                code: 0xBAD0_0003,
            });
        }
        state.next_handle += 1;
        let id = state.next_handle;
        state.contexts.insert(
            id,
            ContextRecord {
                command_list: command_list.name.clone(),
                markers_set: 0,
                last: None,
            },
        );
        Ok(SimContextHandle { id })
    }

    fn release_context(&self, handle: SimContextHandle) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        if state.contexts.remove(&handle.id).is_none() {
            return Err(TrackerError::InvalidHandle);
        }
        state.released.push(handle.id);
        Ok(())
    }

    fn set_event_marker(
        &self,
        handle: &SimContextHandle,
        payload: MarkerPayload<'_>,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        let Some(context) = state.contexts.get_mut(&handle.id) else {
            return Err(TrackerError::InvalidHandle);
        };
        let marker = match payload {
            MarkerPayload::Token(id) => RecordedMarker::Token(id),
            MarkerPayload::Inline(bytes) => {
                let bytes = bytes.strip_suffix(b"\0").unwrap_or(bytes);
                RecordedMarker::Inline(String::from_utf8_lossy(bytes).into_owned())
            }
        };
        context.markers_set += 1;
        context.last = Some(marker);
        Ok(())
    }
}
