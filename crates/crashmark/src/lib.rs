//! crashmark - GPU crash markers that survive the crash
//!
//! Annotates command lists with cheap event markers so that a crash dump
//! written after a GPU device failure can be traced back to the frame and
//! the draw that were in flight.
//!
//! - [`CrashMonitor`] drives the per-frame lifecycle: `begin_frame()`,
//!   `emit_marker()`, `on_submit_result()`. A failed present waits a
//!   bounded time for the crash dump and then terminates the process.
//! - [`MarkerStore`] keeps the marker text of the last few frames in a ring
//!   and answers the dump writer's [`MarkerResolver`] queries.
//! - [`MarkerContext`] owns the tracking handle of one command list.
//! - [`CrashTracker`] is the boundary to the vendor crash tracker.
//!
//! ```rust,ignore
//! let monitor = CrashMonitor::initialize(
//!     tracker,
//!     &device,
//!     TrackingFeatures::all(),
//!     &DumpDescription::new("viewer", env!("CARGO_PKG_VERSION")),
//!     MonitorConfig::from_env()?,
//! )?;
//! let ctx = monitor.acquire_context(&command_list)?;
//! loop {
//!     monitor.begin_frame();
//!     monitor.emit_marker(&ctx, "Shadow pass")?;
//!     // ... record and submit ...
//!     monitor.on_submit_result(swapchain.present());
//! }
//! ```
//!
//! # Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `CRASHMARK_RING_SLOTS` | `4` |
//! | `CRASHMARK_SLOT_CAPACITY` | `10000` |
//! | `CRASHMARK_MARKER_MODE` | `app-managed` |
//! | `CRASHMARK_POLL_INTERVAL_MS` | `50` |
//! | `CRASHMARK_DUMP_TIMEOUT_MS` | `3000` |

mod clock;
mod config;
mod context;
mod error;
mod exit;
mod monitor;
mod resolver;
mod store;
mod tracker;
mod wait;

#[cfg(test)]
mod test_tracker;

pub use crashmark_types as types;
pub use crashmark_types::{
    CrashDumpStatus, CrashReport, DumpDescription, DumpOutcome, FrameCounter, MarkerId,
    MarkerMode, PresentResult, TrackingFeatures,
};

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_DUMP_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_RING_SLOTS, DEFAULT_SLOT_CAPACITY,
    DUMP_TIMEOUT_ENV, MARKER_MODE_ENV, MonitorConfig, POLL_INTERVAL_ENV, RING_SLOTS_ENV,
    SLOT_CAPACITY_ENV,
};
pub use context::MarkerContext;
pub use error::{ConfigError, InitError, MarkerError, TrackerError};
pub use exit::{
    CRASH_EXIT_CODE, CrashReporter, ExitRequested, PanicExit, ProcessExit, ProcessTerminate,
    StderrReporter,
};
pub use monitor::{CrashMonitor, MonitorState};
pub use resolver::MarkerResolver;
pub use store::MarkerStore;
pub use tracker::{CrashTracker, MarkerPayload};
pub use wait::{DumpWait, DumpWaitReport, WaitState, WaitStep};
