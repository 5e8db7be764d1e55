use std::sync::Arc;

use tracing::{trace, warn};

use crate::{CrashTracker, TrackerError};

/// Tracking handle bound to one command-recording context.
///
/// Acquired when the command list is created and released exactly once
/// before it is destroyed. Dropping an unreleased context releases it.
pub struct MarkerContext<T: CrashTracker> {
    tracker: Arc<T>,
    handle: Option<T::ContextHandle>,
}

impl<T: CrashTracker> MarkerContext<T> {
    pub fn acquire(tracker: Arc<T>, command_list: &T::CommandList) -> Result<Self, TrackerError> {
        let handle = tracker.create_context(command_list)?;
        trace!("acquired marker context");
        Ok(Self {
            tracker,
            handle: Some(handle),
        })
    }

    /// `None` once released.
    pub fn handle(&self) -> Option<&T::ContextHandle> {
        self.handle.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Release the tracking handle. Later calls do nothing.
    pub fn release(&mut self) -> Result<(), TrackerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        trace!("releasing marker context");
        self.tracker.release_context(handle)
    }
}

impl<T: CrashTracker> Drop for MarkerContext<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(%e, "failed to release marker context on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tracker::TestTracker;

    #[test]
    fn release_is_idempotent() {
        let tracker = Arc::new(TestTracker::default());
        let mut ctx = MarkerContext::acquire(Arc::clone(&tracker), &()).expect("acquire");
        let handle = *ctx.handle().expect("live handle");
        assert_eq!(tracker.live_handles(), vec![handle]);

        ctx.release().expect("first release");
        ctx.release().expect("second release is a no-op");
        assert!(ctx.is_released());
        assert_eq!(ctx.handle(), None);
        assert_eq!(tracker.released_handles(), vec![handle]);
        assert!(tracker.live_handles().is_empty());

        drop(ctx);
        assert_eq!(tracker.released_handles(), vec![handle]);
    }

    #[test]
    fn drop_releases_the_handle() {
        let tracker = Arc::new(TestTracker::default());
        {
            let _a = MarkerContext::acquire(Arc::clone(&tracker), &()).expect("acquire");
            let _b = MarkerContext::acquire(Arc::clone(&tracker), &()).expect("acquire");
            assert_eq!(tracker.live_handles().len(), 2);
        }
        assert!(tracker.live_handles().is_empty());
        assert_eq!(tracker.released_handles().len(), 2);
    }

    #[test]
    fn contexts_get_distinct_handles() {
        let tracker = Arc::new(TestTracker::default());
        let a = MarkerContext::acquire(Arc::clone(&tracker), &()).expect("acquire");
        let b = MarkerContext::acquire(Arc::clone(&tracker), &()).expect("acquire");
        assert_ne!(a.handle(), b.handle());
    }
}
