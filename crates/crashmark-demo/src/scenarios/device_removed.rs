use std::time::Duration;

use crashmark::PresentResult;
use crashmark_sim::AgentConfig;

use super::{DemoOptions, Renderer, crash_on_last_frame};
use crate::AnyResult;

pub fn run(options: &DemoOptions) -> AnyResult<()> {
    let renderer = Renderer::from_env()?;
    let mut agent = AgentConfig::finishing(Duration::from_millis(300));
    if let Some(path) = &options.dump_out {
        agent = agent.with_output(path);
    }
    crash_on_last_frame(renderer, options, agent, PresentResult::DEVICE_REMOVED)
}
