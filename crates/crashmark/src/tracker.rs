//! Boundary to the vendor crash tracker.
//!
//! The tracker is the native component that watches the GPU, records which
//! event marker each command list reached, and writes a crash dump when the
//! device is lost. Everything behind this trait is opaque; crashmark only
//! passes configuration through, hands out markers, and polls dump status.

use std::sync::Arc;

use crashmark_types::{CrashDumpStatus, DumpDescription, MarkerId, TrackingFeatures};

use crate::{MarkerResolver, TrackerError};

/// Data attached to one event marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPayload<'a> {
    /// Bytes the tracker copies, NUL terminator included.
    Inline(&'a [u8]),
    /// Opaque token with zero data length. The tracker stores only the value
    /// and resolves it through the registered [`MarkerResolver`] when it
    /// writes a dump.
    Token(MarkerId),
}

impl MarkerPayload<'_> {
    /// Length reported to the tracker; zero marks an app-managed token.
    pub fn data_len(&self) -> usize {
        match self {
            Self::Inline(bytes) => bytes.len(),
            Self::Token(_) => 0,
        }
    }
}

pub trait CrashTracker: Send + Sync + 'static {
    type Device: ?Sized;
    type CommandList: ?Sized;
    type ContextHandle: Send;

    /// Enable crash dump collection for this process and register the
    /// resolver the dump writer calls back into for app-managed markers.
    fn enable_crash_dumps(
        &self,
        description: &DumpDescription,
        resolver: Arc<dyn MarkerResolver>,
    ) -> Result<(), TrackerError>;

    /// Start tracking `device` with the requested features.
    fn initialize_device(
        &self,
        device: &Self::Device,
        features: &TrackingFeatures,
    ) -> Result<(), TrackerError>;

    fn crash_dump_status(&self) -> Result<CrashDumpStatus, TrackerError>;

    /// Allocate a tracking handle bound to `command_list`.
    fn create_context(
        &self,
        command_list: &Self::CommandList,
    ) -> Result<Self::ContextHandle, TrackerError>;

    fn release_context(&self, handle: Self::ContextHandle) -> Result<(), TrackerError>;

    fn set_event_marker(
        &self,
        handle: &Self::ContextHandle,
        payload: MarkerPayload<'_>,
    ) -> Result<(), TrackerError>;
}
