use crashmark::PresentResult;
use crashmark_sim::{AgentBehavior, AgentConfig};

use super::{DemoOptions, Renderer, crash_on_last_frame};
use crate::AnyResult;

/// The dump agent never finishes; the monitor gives up after its timeout.
pub fn run(options: &DemoOptions) -> AnyResult<()> {
    let renderer = Renderer::from_env()?;
    let collect_time = renderer.monitor().config().dump_timeout * 2;
    let agent = AgentConfig::finishing(collect_time).with_behavior(AgentBehavior::Stall);
    crash_on_last_frame(renderer, options, agent, PresentResult::DEVICE_HUNG)
}
