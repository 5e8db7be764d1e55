use std::io::Write;

use crashmark_types::CrashReport;

/// Exit code used when the process terminates after a device failure.
pub const CRASH_EXIT_CODE: i32 = -1;

/// Ends the process once the dump wait is over.
pub trait ProcessExit: Send {
    fn exit(&self, code: i32) -> !;
}

/// Real process termination via `std::process::exit`.
pub struct ProcessTerminate;

impl ProcessExit for ProcessTerminate {
    fn exit(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Panic payload raised by [`PanicExit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequested {
    pub code: i32,
}

/// Unwinds with an [`ExitRequested`] payload instead of exiting, so the
/// failure path can be exercised in-process under `catch_unwind`.
pub struct PanicExit;

impl ProcessExit for PanicExit {
    fn exit(&self, code: i32) -> ! {
        std::panic::panic_any(ExitRequested { code })
    }
}

/// Receives the diagnostic produced right before termination.
pub trait CrashReporter: Send {
    fn report(&self, report: &CrashReport);
}

impl<F> CrashReporter for F
where
    F: Fn(&CrashReport) + Send,
{
    fn report(&self, report: &CrashReport) {
        self(report)
    }
}

/// Writes the summary line followed by the report as one JSON line.
pub struct StderrReporter;

impl CrashReporter for StderrReporter {
    fn report(&self, report: &CrashReport) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", report.summary());
        match facet_json::to_vec(report) {
            Ok(json) => {
                let _ = stderr.write_all(&json);
                let _ = stderr.write_all(b"\n");
            }
            Err(e) => {
                let _ = writeln!(stderr, "(failed to serialize crash report: {e})");
            }
        }
        let _ = stderr.flush();
    }
}
