use super::{DemoOptions, Renderer};
use crate::AnyResult;

pub fn run(options: &DemoOptions) -> AnyResult<()> {
    let mut renderer = Renderer::from_env()?;
    renderer.run_frames(options.frames, options.draws)?;

    let store = renderer.monitor().store();
    println!(
        "rendered {} frames; {} markers held for the last {} frames",
        renderer.monitor().frame(),
        store.live_markers(),
        store.ring_slots()
    );
    for slot in store.snapshot() {
        let last = slot.markers.last().map(|m| m.text.as_str()).unwrap_or("-");
        println!(
            "  slot {} frame {:>5}: {:>4} markers, last {last}",
            slot.slot,
            slot.frame,
            slot.markers.len()
        );
    }

    renderer.shutdown()
}
