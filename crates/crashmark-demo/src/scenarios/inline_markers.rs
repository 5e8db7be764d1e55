use std::time::Duration;

use crashmark::{MarkerMode, MonitorConfig, PresentResult};
use crashmark_sim::AgentConfig;

use super::{DemoOptions, Renderer, crash_on_last_frame};
use crate::AnyResult;

/// Same crash as `device-removed`, but the tracker copies marker text itself.
pub fn run(options: &DemoOptions) -> AnyResult<()> {
    let config = MonitorConfig {
        marker_mode: MarkerMode::Inline,
        ..MonitorConfig::from_env().map_err(|e| e.to_string())?
    };
    let renderer = Renderer::start(config)?;
    let mut agent = AgentConfig::finishing(Duration::from_millis(300));
    if let Some(path) = &options.dump_out {
        agent = agent.with_output(path);
    }
    crash_on_last_frame(renderer, options, agent, PresentResult::DRIVER_INTERNAL_ERROR)
}
