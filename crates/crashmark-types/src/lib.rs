//! Plain data shared by the crashmark crates: marker identifiers, frame
//! counters, crash-dump status values, and the report emitted when a device
//! failure terminates the process.

use facet::Facet;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    ZeroId(&'static str),
    ZeroSize(&'static str),
    IdSpaceOverflow { ring_slots: u64, slot_capacity: u64 },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroId(field) => write!(f, "{field} must be non-zero"),
            Self::ZeroSize(field) => write!(f, "{field} must be at least 1"),
            Self::IdSpaceOverflow {
                ring_slots,
                slot_capacity,
            } => write!(
                f,
                "marker id space overflows u64: {ring_slots} slots x {slot_capacity} markers"
            ),
        }
    }
}

impl Error for InvariantError {}

// ── Marker identifiers ───────────────────────────────────

/// Opaque marker identifier handed to the crash tracker in place of the
/// marker text. Zero is reserved for "no marker".
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct MarkerId(u64);

impl MarkerId {
    pub fn new(value: u64) -> Result<Self, InvariantError> {
        if value == 0 {
            return Err(InvariantError::ZeroId("marker_id"));
        }
        Ok(Self(value))
    }

    /// `slot * slot_capacity + count + 1`.
    ///
    /// Callers guarantee `count < slot_capacity`; the id is then unique
    /// among the markers of one live slot.
    pub fn encode(slot: u64, count: u64, slot_capacity: u64) -> Result<Self, InvariantError> {
        let raw = slot
            .checked_mul(slot_capacity)
            .and_then(|base| base.checked_add(count))
            .and_then(|v| v.checked_add(1))
            .ok_or(InvariantError::IdSpaceOverflow {
                ring_slots: slot.saturating_add(1),
                slot_capacity,
            })?;
        Ok(Self(raw))
    }

    /// Ring slot this id was issued from.
    pub fn slot(self, slot_capacity: u64) -> u64 {
        (self.0 - 1) / slot_capacity
    }

    /// Position of this id within its slot (0-based).
    pub fn index_in_slot(self, slot_capacity: u64) -> u64 {
        (self.0 - 1) % slot_capacity
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Frame counter ────────────────────────────────────────

/// Number of frames presented successfully so far. Never resets.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[facet(transparent)]
pub struct FrameCounter(u64);

impl FrameCounter {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Ring slot selected by this frame.
    pub fn slot(self, ring_slots: usize) -> usize {
        (self.0 % ring_slots as u64) as usize
    }
}

impl fmt::Display for FrameCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Crash dump status ────────────────────────────────────

/// Progress of the external crash-dump writer, as reported by the tracker.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum CrashDumpStatus {
    NotStarted,
    Unknown,
    Collecting,
    CollectingFailed,
    InvokingCallback,
    Finished,
}

impl CrashDumpStatus {
    /// `Finished` and `CollectingFailed` end the wait for the dump writer.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::CollectingFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Unknown => "unknown",
            Self::Collecting => "collecting",
            Self::CollectingFailed => "collecting_failed",
            Self::InvokingCallback => "invoking_callback",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for CrashDumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the bounded wait for the dump writer ended.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum DumpOutcome {
    Finished,
    CollectingFailed,
    TimedOut,
}

impl DumpOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::CollectingFailed => "collecting_failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for DumpOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Marker emission mode ─────────────────────────────────

/// How marker data reaches the tracker.
///
/// With `AppManaged` the tracker only sees a [`MarkerId`] and asks for the
/// text back through the resolver when it writes a dump; with `Inline` the
/// tracker copies the marker bytes itself.
#[derive(Facet, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum MarkerMode {
    #[default]
    AppManaged,
    Inline,
}

impl MarkerMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "app-managed" | "app_managed" | "appmanaged" => Some(Self::AppManaged),
            "inline" => Some(Self::Inline),
            _ => None,
        }
    }
}

// ── Tracker configuration ────────────────────────────────

/// Features requested from the crash tracker when device tracking is
/// initialized. Passed to the tracker unchanged.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingFeatures {
    /// Event marker tracking.
    pub markers: bool,
    /// Tracking of resource lifetimes and residency.
    pub resource_tracking: bool,
    /// Call stacks for draws, dispatches and copies.
    pub call_stack_capturing: bool,
    /// Debug information for shaders.
    pub shader_debug_info: bool,
    /// Shader error reporting.
    pub shader_error_reporting: bool,
}

impl TrackingFeatures {
    pub const MARKERS_BIT: u32 = 0x0000_0001;
    pub const RESOURCE_TRACKING_BIT: u32 = 0x0000_0002;
    pub const CALL_STACK_CAPTURING_BIT: u32 = 0x0000_0004;
    pub const SHADER_DEBUG_INFO_BIT: u32 = 0x0000_0008;
    pub const SHADER_ERROR_REPORTING_BIT: u32 = 0x0000_0040;

    pub const fn none() -> Self {
        Self {
            markers: false,
            resource_tracking: false,
            call_stack_capturing: false,
            shader_debug_info: false,
            shader_error_reporting: false,
        }
    }

    pub const fn all() -> Self {
        Self {
            markers: true,
            resource_tracking: true,
            call_stack_capturing: true,
            shader_debug_info: true,
            shader_error_reporting: true,
        }
    }

    /// Vendor flag word for bindings that take a bit field.
    pub fn to_bits(self) -> u32 {
        let mut bits = 0;
        if self.markers {
            bits |= Self::MARKERS_BIT;
        }
        if self.resource_tracking {
            bits |= Self::RESOURCE_TRACKING_BIT;
        }
        if self.call_stack_capturing {
            bits |= Self::CALL_STACK_CAPTURING_BIT;
        }
        if self.shader_debug_info {
            bits |= Self::SHADER_DEBUG_INFO_BIT;
        }
        if self.shader_error_reporting {
            bits |= Self::SHADER_ERROR_REPORTING_BIT;
        }
        bits
    }
}

impl Default for TrackingFeatures {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct DescriptionEntry {
    pub key: String,
    pub value: String,
}

/// Application description attached to every crash dump.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct DumpDescription {
    pub application_name: String,
    pub application_version: String,
    pub user_defined: Vec<DescriptionEntry>,
}

impl DumpDescription {
    pub fn new(application_name: impl Into<String>, application_version: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            application_version: application_version.into(),
            user_defined: Vec::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_defined.push(DescriptionEntry {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

// ── Present / submit results ─────────────────────────────

/// Result code returned by a present or submit call. Negative codes are
/// failures.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[facet(transparent)]
pub struct PresentResult(i32);

impl PresentResult {
    pub const OK: Self = Self(0);
    pub const DEVICE_HUNG: Self = Self(0x887A_0006_u32 as i32);
    pub const DEVICE_REMOVED: Self = Self(0x887A_0005_u32 as i32);
    pub const DEVICE_RESET: Self = Self(0x887A_0007_u32 as i32);
    pub const DRIVER_INTERNAL_ERROR: Self = Self(0x887A_0020_u32 as i32);

    pub const fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Symbolic name for the well-known device-loss codes.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::OK => Some("S_OK"),
            Self::DEVICE_HUNG => Some("DXGI_ERROR_DEVICE_HUNG"),
            Self::DEVICE_REMOVED => Some("DXGI_ERROR_DEVICE_REMOVED"),
            Self::DEVICE_RESET => Some("DXGI_ERROR_DEVICE_RESET"),
            Self::DRIVER_INTERNAL_ERROR => Some("DXGI_ERROR_DRIVER_INTERNAL_ERROR"),
            _ => None,
        }
    }
}

impl fmt::Display for PresentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0 as u32)?;
        if let Some(name) = self.name() {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}

// ── Marker snapshots ─────────────────────────────────────

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct MarkerEntry {
    pub id: MarkerId,
    pub text: String,
}

/// Contents of one ring slot at the time of the snapshot.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct MarkerSlotSnapshot {
    pub slot: u32,
    /// Frame that currently owns the slot.
    pub frame: u64,
    pub markers: Vec<MarkerEntry>,
}

// ── Crash report ─────────────────────────────────────────

/// Diagnostic produced right before the process terminates after a device
/// failure.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Frame that was being presented when the failure was observed.
    pub frame: u64,
    pub present_result: i32,
    pub present_result_name: Option<String>,
    pub final_status: CrashDumpStatus,
    pub outcome: DumpOutcome,
    pub waited_ms: u64,
    pub polls: u32,
}

impl CrashReport {
    /// One-line human summary, e.g. for a message box or stderr.
    pub fn summary(&self) -> String {
        match self.outcome {
            DumpOutcome::Finished => format!(
                "GPU device failure at frame {} ({}); crash dump finished after {} ms",
                self.frame,
                PresentResult::from_code(self.present_result),
                self.waited_ms
            ),
            _ => format!(
                "GPU device failure at frame {} ({}); unexpected crash dump status: {} after {} ms",
                self.frame,
                PresentResult::from_code(self.present_result),
                self.final_status,
                self.waited_ms
            ),
        }
    }
}
