//! Frame-boundary state machine.
//!
//! ```text
//! Running --(present ok)--> Running
//! Running --(present failed)--> AwaitingDump --> Terminated(outcome) --> exit
//! ```
//!
//! `Running` is the only state the render loop ever sees again; the failure
//! path ends in process termination.

use std::sync::Arc;

use compact_str::format_compact;
use crashmark_types::{
    CrashReport, DumpDescription, DumpOutcome, FrameCounter, MarkerId, MarkerMode, PresentResult,
    TrackingFeatures,
};
use tracing::{error, info, trace};

use crate::{
    CRASH_EXIT_CODE, Clock, CrashReporter, CrashTracker, DumpWait, DumpWaitReport, InitError,
    MarkerContext, MarkerError, MarkerPayload, MarkerResolver, MarkerStore, MonitorConfig,
    ProcessExit, ProcessTerminate, StderrReporter, SystemClock, TrackerError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    AwaitingDump,
    Terminated(DumpOutcome),
}

pub struct CrashMonitor<T: CrashTracker> {
    tracker: Arc<T>,
    store: Arc<MarkerStore>,
    config: MonitorConfig,
    frame: FrameCounter,
    state: MonitorState,
    clock: Arc<dyn Clock>,
    exit: Box<dyn ProcessExit>,
    reporter: Box<dyn CrashReporter>,
}

impl<T: CrashTracker> CrashMonitor<T> {
    /// Enable crash dumps, register the marker resolver, and start tracking
    /// `device`. Any failure is fatal for crash tracking.
    pub fn initialize(
        tracker: Arc<T>,
        device: &T::Device,
        features: TrackingFeatures,
        description: &DumpDescription,
        config: MonitorConfig,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let store = Arc::new(
            MarkerStore::from_config(&config).map_err(|e| InitError::Config(e.into()))?,
        );

        let resolver: Arc<dyn MarkerResolver> = store.clone();
        tracker
            .enable_crash_dumps(description, resolver)
            .map_err(InitError::EnableCrashDumps)?;
        tracker
            .initialize_device(device, &features)
            .map_err(InitError::InitializeDevice)?;

        info!(
            application = %description.application_name,
            features = format_args!("0x{:02X}", features.to_bits()),
            marker_mode = ?config.marker_mode,
            ring_slots = config.ring_slots,
            "GPU crash tracking initialized"
        );

        Ok(Self {
            tracker,
            store,
            config,
            frame: FrameCounter::default(),
            state: MonitorState::Running,
            clock: Arc::new(SystemClock::new()),
            exit: Box::new(ProcessTerminate),
            reporter: Box::new(StderrReporter),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_exit(mut self, exit: impl ProcessExit + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    pub fn with_reporter(mut self, reporter: impl CrashReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn frame(&self) -> FrameCounter {
        self.frame
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MarkerStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<T> {
        &self.tracker
    }

    /// Tracking context for a newly created command list.
    pub fn acquire_context(
        &self,
        command_list: &T::CommandList,
    ) -> Result<MarkerContext<T>, TrackerError> {
        MarkerContext::acquire(Arc::clone(&self.tracker), command_list)
    }

    /// Clear the ring slot of the current frame. Call once per frame before
    /// any marker is emitted.
    pub fn begin_frame(&self) {
        self.store.reset_current_slot(self.frame);
    }

    /// Set an event marker `"Frame <n>: <label>"` on `context`.
    ///
    /// Returns the marker id in app-managed mode and `None` in inline mode,
    /// where the tracker keeps its own copy of the text.
    pub fn emit_marker(
        &self,
        context: &MarkerContext<T>,
        label: &str,
    ) -> Result<Option<MarkerId>, MarkerError> {
        if self.state != MonitorState::Running {
            return Err(MarkerError::NotRunning);
        }
        let handle = context.handle().ok_or(MarkerError::ContextReleased)?;
        let text = format_compact!("Frame {}: {}", self.frame, label);

        match self.config.marker_mode {
            MarkerMode::AppManaged => {
                let id = self.store.record_marker(self.frame, text)?;
                self.tracker
                    .set_event_marker(handle, MarkerPayload::Token(id))?;
                Ok(Some(id))
            }
            MarkerMode::Inline => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);
                trace!(frame = self.frame.get(), text = %text, "inline marker");
                self.tracker
                    .set_event_marker(handle, MarkerPayload::Inline(&bytes))?;
                Ok(None)
            }
        }
    }

    /// React to the result of a present/submit call.
    ///
    /// Success advances the frame counter. Failure waits a bounded time for
    /// the crash dump, reports the final dump status and terminates the
    /// process; it does not return.
    pub fn on_submit_result(&mut self, result: PresentResult) {
        if result.is_failure() {
            self.terminate_after_failure(result);
        }
        self.frame.advance();
    }

    /// Poll the tracker until the dump is written, collection fails, or the
    /// configured timeout elapses.
    pub fn await_dump(&mut self) -> DumpWaitReport {
        self.state = MonitorState::AwaitingDump;
        let tracker = Arc::clone(&self.tracker);
        let report = DumpWait::from_config(&self.config)
            .run(self.clock.as_ref(), || tracker.crash_dump_status());
        self.state = MonitorState::Terminated(report.outcome);
        report
    }

    fn terminate_after_failure(&mut self, result: PresentResult) -> ! {
        error!(
            frame = self.frame.get(),
            result = %result,
            "GPU device failure reported at present; waiting for crash dump"
        );

        let wait = self.await_dump();
        let report = CrashReport {
            frame: self.frame.get(),
            present_result: result.code(),
            present_result_name: result.name().map(str::to_owned),
            final_status: wait.final_status,
            outcome: wait.outcome,
            waited_ms: wait.elapsed.as_millis().min(u64::MAX as u128) as u64,
            polls: wait.polls,
        };

        match wait.outcome {
            DumpOutcome::Finished => info!(
                waited_ms = report.waited_ms,
                polls = report.polls,
                "crash dump finished"
            ),
            _ => error!(
                status = %wait.final_status,
                outcome = %wait.outcome,
                waited_ms = report.waited_ms,
                "unexpected crash dump status"
            ),
        }

        self.reporter.report(&report);
        self.exit.exit(CRASH_EXIT_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tracker::{Recorded, TestTracker};
    use crate::{ExitRequested, ManualClock, PanicExit};
    use crashmark_types::CrashDumpStatus;
    use parking_lot::Mutex;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::time::Duration;

    fn monitor_with(tracker: Arc<TestTracker>, config: MonitorConfig) -> CrashMonitor<TestTracker> {
        CrashMonitor::initialize(
            tracker,
            &(),
            TrackingFeatures::all(),
            &DumpDescription::new("crashmark-tests", "0.1.0"),
            config,
        )
        .expect("test tracker initializes")
        .with_clock(Arc::new(ManualClock::new()))
        .with_exit(PanicExit)
    }

    fn monitor(tracker: Arc<TestTracker>) -> CrashMonitor<TestTracker> {
        monitor_with(tracker, MonitorConfig::default())
    }

    fn present_ok(monitor: &mut CrashMonitor<TestTracker>, frames: u64) {
        for _ in 0..frames {
            monitor.begin_frame();
            monitor.on_submit_result(PresentResult::OK);
        }
    }

    #[test]
    fn initialize_passes_features_through_and_registers_resolver() {
        let tracker = Arc::new(TestTracker::default());
        let features = TrackingFeatures {
            call_stack_capturing: false,
            ..TrackingFeatures::all()
        };
        let monitor = CrashMonitor::initialize(
            Arc::clone(&tracker),
            &(),
            features,
            &DumpDescription::new("app", "1.2.3"),
            MonitorConfig::default(),
        )
        .expect("initializes");

        assert_eq!(tracker.features(), Some(features));
        assert_eq!(tracker.description().map(|d| d.application_version), Some("1.2.3".to_string()));

        let ctx = monitor.acquire_context(&()).expect("context");
        monitor.begin_frame();
        let id = monitor
            .emit_marker(&ctx, "Shadow pass")
            .expect("marker")
            .expect("app-managed id");
        assert_eq!(
            tracker.resolve_through_registered(id.get()).as_deref(),
            Some("Frame 0: Shadow pass")
        );
    }

    #[test]
    fn initialization_failures_are_fatal_errors() {
        let tracker = Arc::new(TestTracker::default());
        tracker.fail_device_init.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = CrashMonitor::initialize(
            tracker,
            &(),
            TrackingFeatures::all(),
            &DumpDescription::new("app", "1"),
            MonitorConfig::default(),
        )
        .err()
        .expect("device init must fail");
        assert!(matches!(err, InitError::InitializeDevice(_)));

        let err = CrashMonitor::initialize(
            Arc::new(TestTracker::default()),
            &(),
            TrackingFeatures::all(),
            &DumpDescription::new("app", "1"),
            MonitorConfig {
                ring_slots: 0,
                ..MonitorConfig::default()
            },
        )
        .err()
        .expect("bad config must fail");
        assert!(matches!(err, InitError::Config(_)));
    }

    #[test]
    fn markers_carry_frame_prefix_and_literal_ids() {
        let tracker = Arc::new(TestTracker::default());
        let mut monitor = monitor(Arc::clone(&tracker));
        let ctx = monitor.acquire_context(&()).expect("context");

        present_ok(&mut monitor, 625);
        monitor.begin_frame();
        let mut ids = Vec::new();
        for draw in 0..15 {
            ids.push(
                monitor
                    .emit_marker(&ctx, &format!("DrawCall#{draw}"))
                    .expect("marker")
                    .expect("app-managed id"),
            );
        }
        assert_eq!(ids[0].get(), 10_001);
        assert_eq!(ids[14].get(), 10_015);
        assert_eq!(
            monitor.store().resolve(ids[12]).as_deref(),
            Some("Frame 625: DrawCall#12")
        );
        assert_eq!(tracker.last_marker(), Some(Recorded::Token(10_015)));

        monitor.on_submit_result(PresentResult::OK);
        monitor.begin_frame();
        let next = monitor
            .emit_marker(&ctx, "DrawCall#0")
            .expect("marker")
            .expect("app-managed id");
        assert_eq!(next.get(), 20_001);
    }

    #[test]
    fn inline_markers_send_nul_terminated_text() {
        let tracker = Arc::new(TestTracker::default());
        let monitor = monitor_with(
            Arc::clone(&tracker),
            MonitorConfig {
                marker_mode: MarkerMode::Inline,
                ..MonitorConfig::default()
            },
        );
        let ctx = monitor.acquire_context(&()).expect("context");
        monitor.begin_frame();
        assert_eq!(monitor.emit_marker(&ctx, "Blit").expect("marker"), None);
        assert_eq!(
            tracker.last_marker(),
            Some(Recorded::Inline(b"Frame 0: Blit\0".to_vec()))
        );
        assert_eq!(monitor.store().live_markers(), 0);
    }

    #[test]
    fn released_context_rejects_markers() {
        let tracker = Arc::new(TestTracker::default());
        let monitor = monitor(Arc::clone(&tracker));
        let mut ctx = monitor.acquire_context(&()).expect("context");
        ctx.release().expect("release");
        monitor.begin_frame();
        assert_eq!(
            monitor.emit_marker(&ctx, "late"),
            Err(MarkerError::ContextReleased)
        );
    }

    #[test]
    fn frame_counter_only_advances_on_success() {
        let tracker = Arc::new(TestTracker::default());
        tracker.set_status(CrashDumpStatus::Finished);
        let mut monitor = monitor(Arc::clone(&tracker));

        present_ok(&mut monitor, 3);
        assert_eq!(monitor.frame().get(), 3);
        monitor.on_submit_result(PresentResult::from_code(1));
        assert_eq!(monitor.frame().get(), 4);

        let exit = catch_unwind(AssertUnwindSafe(|| {
            monitor.on_submit_result(PresentResult::DEVICE_REMOVED)
        }))
        .expect_err("failure path must not return");
        assert_eq!(
            exit.downcast_ref::<ExitRequested>(),
            Some(&ExitRequested {
                code: CRASH_EXIT_CODE
            })
        );
        assert_eq!(monitor.frame().get(), 4);
        assert_eq!(
            monitor.state(),
            MonitorState::Terminated(DumpOutcome::Finished)
        );
    }

    #[test]
    fn failure_reports_final_status_before_exit() {
        let tracker = Arc::new(TestTracker::default());
        tracker.set_status(CrashDumpStatus::Collecting);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(ManualClock::new());
        let mut monitor = monitor(Arc::clone(&tracker))
            .with_clock(clock.clone())
            .with_reporter({
                let reports = Arc::clone(&reports);
                move |report: &CrashReport| reports.lock().push(report.clone())
            });

        present_ok(&mut monitor, 7);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            monitor.on_submit_result(PresentResult::DEVICE_HUNG)
        }));

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.frame, 7);
        assert_eq!(report.outcome, DumpOutcome::TimedOut);
        assert_eq!(report.final_status, CrashDumpStatus::Collecting);
        assert_eq!(
            report.present_result_name.as_deref(),
            Some("DXGI_ERROR_DEVICE_HUNG")
        );
        assert!(clock.now() <= Duration::from_secs(3) + Duration::from_millis(50));
        assert_eq!(report.waited_ms, 3000);
    }

    #[test]
    fn markers_are_refused_after_failure() {
        let tracker = Arc::new(TestTracker::default());
        tracker.set_status(CrashDumpStatus::CollectingFailed);
        let mut monitor = monitor(Arc::clone(&tracker)).with_reporter(|_: &CrashReport| {});
        let ctx = monitor.acquire_context(&()).expect("context");

        let _ = catch_unwind(AssertUnwindSafe(|| {
            monitor.on_submit_result(PresentResult::DEVICE_REMOVED)
        }));
        assert_eq!(
            monitor.state(),
            MonitorState::Terminated(DumpOutcome::CollectingFailed)
        );
        assert_eq!(
            monitor.emit_marker(&ctx, "after crash"),
            Err(MarkerError::NotRunning)
        );
    }
}
