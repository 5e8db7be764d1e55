pub mod device_removed;
pub mod healthy;
pub mod inline_markers;
pub mod stalled_dump;

use std::path::PathBuf;
use std::sync::Arc;

use crashmark::{
    CrashMonitor, DumpDescription, MarkerContext, MonitorConfig, PresentResult, TrackingFeatures,
};
use crashmark_sim::{AgentConfig, DumpAgent, SimCommandList, SimDevice, SimTracker};
use tracing::info;

use crate::AnyResult;

pub struct DemoOptions {
    pub frames: u64,
    pub draws: u32,
    pub dump_out: Option<PathBuf>,
}

/// A tiny render loop: one graphics and one copy command list.
pub(crate) struct Renderer {
    tracker: SimTracker,
    monitor: CrashMonitor<SimTracker>,
    gfx: MarkerContext<SimTracker>,
    copy: MarkerContext<SimTracker>,
}

impl Renderer {
    pub(crate) fn start(config: MonitorConfig) -> AnyResult<Self> {
        let tracker = SimTracker::new();
        let monitor = CrashMonitor::initialize(
            Arc::new(tracker.clone()),
            &SimDevice::new("sim-gpu-0"),
            TrackingFeatures::all(),
            &DumpDescription::new("crashmark-demo", env!("CARGO_PKG_VERSION"))
                .with_entry("renderer", "sim"),
            config,
        )
        .map_err(|e| format!("failed to initialize crash tracking: {e}"))?;

        let gfx = monitor
            .acquire_context(&SimCommandList::new("gfx"))
            .map_err(|e| format!("failed to create gfx marker context: {e}"))?;
        let copy = monitor
            .acquire_context(&SimCommandList::new("copy"))
            .map_err(|e| format!("failed to create copy marker context: {e}"))?;

        Ok(Self {
            tracker,
            monitor,
            gfx,
            copy,
        })
    }

    pub(crate) fn from_env() -> AnyResult<Self> {
        Self::start(MonitorConfig::from_env().map_err(|e| e.to_string())?)
    }

    pub(crate) fn monitor(&self) -> &CrashMonitor<SimTracker> {
        &self.monitor
    }

    /// Record one frame's command lists without presenting.
    pub(crate) fn record_frame(&self, draws: u32) -> AnyResult<()> {
        self.monitor.begin_frame();
        self.monitor
            .emit_marker(&self.copy, "Upload constants")
            .map_err(|e| e.to_string())?;
        self.monitor
            .emit_marker(&self.gfx, "Shadow pass")
            .map_err(|e| e.to_string())?;
        for draw in 0..draws {
            self.monitor
                .emit_marker(&self.gfx, &format!("DrawCall#{draw}"))
                .map_err(|e| e.to_string())?;
        }
        self.monitor
            .emit_marker(&self.gfx, "Tonemap")
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub(crate) fn present(&mut self, result: PresentResult) {
        self.monitor.on_submit_result(result);
    }

    /// Render and present `frames` healthy frames.
    pub(crate) fn run_frames(&mut self, frames: u64, draws: u32) -> AnyResult<()> {
        for _ in 0..frames {
            self.record_frame(draws)?;
            self.present(PresentResult::OK);
        }
        info!(frame = self.monitor.frame().get(), "presented frames");
        Ok(())
    }

    pub(crate) fn lose_device(&self, agent: AgentConfig) -> DumpAgent {
        self.tracker.device_lost(agent)
    }

    pub(crate) fn shutdown(mut self) -> AnyResult<()> {
        self.gfx.release().map_err(|e| e.to_string())?;
        self.copy.release().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Render `frames - 1` healthy frames, record the last one, then fail its
/// present after the device is lost. Does not return on success.
pub(crate) fn crash_on_last_frame(
    mut renderer: Renderer,
    options: &DemoOptions,
    agent: AgentConfig,
    failure: PresentResult,
) -> AnyResult<()> {
    renderer.run_frames(options.frames - 1, options.draws)?;
    renderer.record_frame(options.draws)?;

    let _agent = renderer.lose_device(agent);
    println!(
        "frame {}: present failed with {failure}",
        renderer.monitor().frame()
    );
    renderer.present(failure);
    Err("present failure did not terminate the process".to_owned())
}
