//! In-memory stand-in for a vendor GPU crash tracker.
//!
//! [`SimTracker`] implements [`crashmark::CrashTracker`]: it hands out context
//! handles, remembers the last marker set on each context, and reports a
//! crash-dump status that is either scripted or driven by a [`DumpAgent`].
//! The agent plays the part of the vendor's dump thread: after a simulated
//! device loss it resolves app-managed markers through the registered
//! resolver, writes a JSON dump, and flips the status to `Finished`.

mod agent;
mod dump;
mod tracker;

pub use agent::{AgentBehavior, AgentConfig, DumpAgent};
pub use dump::{Breadcrumb, SimDump};
pub use tracker::{RecordedMarker, SimCommandList, SimContextHandle, SimDevice, SimTracker};
