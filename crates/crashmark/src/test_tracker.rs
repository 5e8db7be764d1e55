use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use compact_str::CompactString;
use crashmark_types::{CrashDumpStatus, DumpDescription, TrackingFeatures};
use parking_lot::Mutex;

use crate::{CrashTracker, MarkerPayload, MarkerResolver, TrackerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    Token(u64),
    Inline(Vec<u8>),
}

/// Minimal in-crate tracker for unit tests.
#[derive(Default)]
pub(crate) struct TestTracker {
    pub(crate) fail_device_init: AtomicBool,
    next_handle: AtomicU64,
    live: Mutex<Vec<u64>>,
    released: Mutex<Vec<u64>>,
    markers: Mutex<Vec<(u64, Recorded)>>,
    status: Mutex<Option<CrashDumpStatus>>,
    features: Mutex<Option<TrackingFeatures>>,
    description: Mutex<Option<DumpDescription>>,
    resolver: Mutex<Option<Arc<dyn MarkerResolver>>>,
}

impl TestTracker {
    pub(crate) fn set_status(&self, status: CrashDumpStatus) {
        *self.status.lock() = Some(status);
    }

    pub(crate) fn features(&self) -> Option<TrackingFeatures> {
        *self.features.lock()
    }

    pub(crate) fn description(&self) -> Option<DumpDescription> {
        self.description.lock().clone()
    }

    pub(crate) fn last_marker(&self) -> Option<Recorded> {
        self.markers.lock().last().map(|(_, m)| m.clone())
    }

    pub(crate) fn live_handles(&self) -> Vec<u64> {
        self.live.lock().clone()
    }

    pub(crate) fn released_handles(&self) -> Vec<u64> {
        self.released.lock().clone()
    }

    pub(crate) fn resolve_through_registered(&self, token: u64) -> Option<CompactString> {
        let resolver = self.resolver.lock().clone()?;
        resolver.resolve_token(token)
    }
}

impl CrashTracker for TestTracker {
    type Device = ();
    type CommandList = ();
    type ContextHandle = u64;

    fn enable_crash_dumps(
        &self,
        description: &DumpDescription,
        resolver: Arc<dyn MarkerResolver>,
    ) -> Result<(), TrackerError> {
        *self.description.lock() = Some(description.clone());
        *self.resolver.lock() = Some(resolver);
        Ok(())
    }

    fn initialize_device(
        &self,
        _device: &(),
        features: &TrackingFeatures,
    ) -> Result<(), TrackerError> {
        if self.fail_device_init.load(Ordering::SeqCst) {
            return Err(TrackerError::Unavailable("test device"));
        }
        *self.features.lock() = Some(*features);
        Ok(())
    }

    fn crash_dump_status(&self) -> Result<CrashDumpStatus, TrackerError> {
        Ok(self.status.lock().unwrap_or(CrashDumpStatus::NotStarted))
    }

    fn create_context(&self, _command_list: &()) -> Result<u64, TrackerError> {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.lock().push(handle);
        Ok(handle)
    }

    fn release_context(&self, handle: u64) -> Result<(), TrackerError> {
        let mut live = self.live.lock();
        let Some(pos) = live.iter().position(|h| *h == handle) else {
            return Err(TrackerError::InvalidHandle);
        };
        live.remove(pos);
        self.released.lock().push(handle);
        Ok(())
    }

    fn set_event_marker(
        &self,
        handle: &u64,
        payload: MarkerPayload<'_>,
    ) -> Result<(), TrackerError> {
        if !self.live.lock().contains(handle) {
            return Err(TrackerError::InvalidHandle);
        }
        let recorded = match payload {
            MarkerPayload::Token(id) => Recorded::Token(id.get()),
            MarkerPayload::Inline(bytes) => Recorded::Inline(bytes.to_vec()),
        };
        self.markers.lock().push((*handle, recorded));
        Ok(())
    }
}
