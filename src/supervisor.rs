//! Bounded execution of external commands and in-process work
//!
//! A native `timeout` binary is looked up once per process and cached. When it
//! is missing, the bound is enforced in software: the command runs in its own
//! process group on a waiter thread while the caller acts as the watchdog,
//! sending `SIGTERM` to the group when the bound elapses and `SIGKILL` after a
//! grace period.
//!
//! In-process work cannot be killed, so [`TimeoutSupervisor::run_bounded`]
//! hands it a [`CancelToken`] instead. The work checks the token between
//! entries and the supervisor waits for it to stop before reporting the
//! timeout.

use crate::error::TIMEOUT_EXIT_CODE;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Default time between `SIGTERM` and `SIGKILL`
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

static NATIVE_TIMEOUT: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Result of a supervised call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutOutcome {
    Completed(i32),
    TimedOut,
    SupervisorError(String),
}

impl TimeoutOutcome {
    /// Shell-style exit status, with [`TIMEOUT_EXIT_CODE`] for a timeout
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed(code) => *code,
            Self::TimedOut => TIMEOUT_EXIT_CODE,
            Self::SupervisorError(_) => 1,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Completed(0))
    }
}

/// Result of in-process work run under a bound
#[derive(Debug)]
pub enum Bounded<T> {
    Finished(T),
    TimedOut,
    SupervisorError(String),
}

/// Cooperative stop signal shared between the supervisor and bounded work
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    Native(PathBuf),
    Fallback,
}

#[derive(Debug, Clone)]
pub struct TimeoutSupervisor {
    strategy: Strategy,
    kill_grace: Duration,
}

impl TimeoutSupervisor {
    /// Use the native facility when the cached lookup found one
    pub fn detect() -> Self {
        let strategy = match native_timeout() {
            Some(path) => Strategy::Native(path.to_path_buf()),
            None => Strategy::Fallback,
        };
        Self {
            strategy,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Always enforce the bound in software
    pub fn fallback() -> Self {
        Self {
            strategy: Strategy::Fallback,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Delegate to a specific native `timeout` binary
    pub fn native(binary: impl Into<PathBuf>) -> Self {
        Self {
            strategy: Strategy::Native(binary.into()),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn is_native(&self) -> bool {
        matches!(self.strategy, Strategy::Native(_))
    }

    /// Run `program args...` and return within roughly `timeout` (plus the
    /// kill grace for commands that ignore `SIGTERM`).
    pub fn run_with_timeout<S: AsRef<OsStr>>(
        &self,
        timeout: Duration,
        program: impl AsRef<OsStr>,
        args: &[S],
    ) -> TimeoutOutcome {
        let program = program.as_ref();
        if resolve_program(program).is_none() {
            return TimeoutOutcome::SupervisorError(format!(
                "cannot run {}: not found or not executable",
                program.to_string_lossy()
            ));
        }
        let args: Vec<&OsStr> = args.iter().map(AsRef::as_ref).collect();
        let outcome = match &self.strategy {
            Strategy::Native(binary) => self.run_native(binary, timeout, program, &args),
            Strategy::Fallback => self.run_fallback(timeout, program, &args),
        };
        if outcome == TimeoutOutcome::TimedOut {
            warn!(
                command = %program.to_string_lossy(),
                timeout_secs = timeout.as_secs_f64(),
                "command timed out"
            );
        }
        outcome
    }

    fn run_native(
        &self,
        binary: &Path,
        timeout: Duration,
        program: &OsStr,
        args: &[&OsStr],
    ) -> TimeoutOutcome {
        let mut cmd = Command::new(binary);
        cmd.arg("-k")
            .arg(format_secs(self.kill_grace))
            .arg(format_secs(timeout))
            .arg(program)
            .args(args)
            .stdin(Stdio::null());

        let status = match cmd.status() {
            Ok(status) => status,
            Err(e) => return TimeoutOutcome::SupervisorError(format!("cannot spawn timeout: {e}")),
        };

        // the program was resolved before spawning, so 125-127 are its own codes
        match status.code() {
            Some(TIMEOUT_EXIT_CODE) => TimeoutOutcome::TimedOut,
            Some(code) => TimeoutOutcome::Completed(code),
            // -k fired: the command was killed after ignoring SIGTERM
            None if status.signal() == Some(libc::SIGKILL) => TimeoutOutcome::TimedOut,
            None => TimeoutOutcome::Completed(signal_status(status)),
        }
    }

    fn run_fallback(&self, timeout: Duration, program: &OsStr, args: &[&OsStr]) -> TimeoutOutcome {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return TimeoutOutcome::SupervisorError(format!(
                    "cannot spawn {}: {e}",
                    program.to_string_lossy()
                ))
            }
        };
        let pgid = child.id() as libc::pid_t;

        let (tx, rx) = mpsc::channel();
        let waiter = thread::Builder::new()
            .name("supervised-wait".into())
            .spawn(move || {
                let _ = tx.send(child.wait());
            });
        if let Err(e) = waiter {
            // the child was moved into the failed closure; reap it by group
            signal_group(pgid, libc::SIGKILL);
            return TimeoutOutcome::SupervisorError(format!("cannot spawn watchdog: {e}"));
        }

        let status = match rx.recv_timeout(timeout) {
            Ok(status) => status,
            Err(RecvTimeoutError::Disconnected) => {
                return TimeoutOutcome::SupervisorError("waiter exited without status".into())
            }
            Err(RecvTimeoutError::Timeout) => {
                signal_group(pgid, libc::SIGTERM);
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(self.kill_grace) {
                    debug!(pgid, "command ignored SIGTERM, sending SIGKILL");
                    signal_group(pgid, libc::SIGKILL);
                    let _ = rx.recv();
                }
                return TimeoutOutcome::TimedOut;
            }
        };

        match status {
            Ok(status) => TimeoutOutcome::Completed(
                status.code().unwrap_or_else(|| signal_status(status)),
            ),
            Err(e) => TimeoutOutcome::SupervisorError(format!("wait failed: {e}")),
        }
    }

    /// Run `work` on a worker thread under `timeout`.
    ///
    /// When the bound elapses the token is cancelled and the worker gets the
    /// kill grace to reach its next checkpoint; its partial result is
    /// discarded. A worker stuck inside a single system call past the grace
    /// is abandoned.
    pub fn run_bounded<T, F>(&self, timeout: Duration, work: F) -> Bounded<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancelToken) -> T + Send + 'static,
    {
        let token = CancelToken::default();
        let worker_token = token.clone();
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("bounded-work".into())
            .spawn(move || {
                let _ = tx.send(work(&worker_token));
            });
        if let Err(e) = spawned {
            return Bounded::SupervisorError(format!("cannot spawn worker: {e}"));
        }

        match rx.recv_timeout(timeout) {
            Ok(value) => Bounded::Finished(value),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                match rx.recv_timeout(self.kill_grace) {
                    Err(RecvTimeoutError::Timeout) => warn!(
                        grace_secs = self.kill_grace.as_secs_f64(),
                        "bounded work ignored cancellation, abandoning it"
                    ),
                    _ => debug!("bounded work stopped after cancellation"),
                }
                Bounded::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                Bounded::SupervisorError("worker panicked".into())
            }
        }
    }
}

impl Default for TimeoutSupervisor {
    fn default() -> Self {
        Self::detect()
    }
}

/// Cached lookup for `timeout` / `gtimeout` on `PATH`
pub fn native_timeout() -> Option<&'static Path> {
    NATIVE_TIMEOUT
        .get_or_init(|| {
            let found = ["timeout", "gtimeout"]
                .iter()
                .find_map(|name| find_in_path(OsStr::new(name)));
            debug!(native = ?found, "detected native timeout facility");
            found
        })
        .as_deref()
}

fn find_in_path(name: &OsStr) -> Option<PathBuf> {
    let path_var: OsString = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Where `program` would be executed from, if it can be at all
fn resolve_program(program: &OsStr) -> Option<PathBuf> {
    if program.as_bytes().contains(&b'/') {
        let path = Path::new(program);
        is_executable(path).then(|| path.to_path_buf())
    } else {
        find_in_path(program)
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    // SAFETY: killpg only sends a signal; a stale group id yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc != 0 {
        debug!(pgid, signal, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

fn signal_status(status: ExitStatus) -> i32 {
    128 + status.signal().unwrap_or(0)
}

/// Whole milliseconds, rounded up and never zero: `timeout` reads a zero
/// duration as "no limit".
fn format_secs(d: Duration) -> String {
    let ms = d.as_micros().div_ceil(1000).max(1);
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const NO_ARGS: &[&str] = &[];

    fn supervisors() -> Vec<TimeoutSupervisor> {
        let mut all = vec![TimeoutSupervisor::fallback()];
        if let Some(native) = native_timeout() {
            all.push(TimeoutSupervisor::native(native));
        }
        all
    }

    #[test]
    fn test_fast_command_completes_with_real_exit_code() {
        for sup in supervisors() {
            let outcome = sup.run_with_timeout(Duration::from_secs(1), "sleep", &["0.1"]);
            assert_eq!(outcome, TimeoutOutcome::Completed(0), "native={}", sup.is_native());
        }
    }

    #[test]
    fn test_nonzero_exit_code_propagates() {
        for sup in supervisors() {
            let outcome = sup.run_with_timeout(Duration::from_secs(5), "sh", &["-c", "exit 3"]);
            assert_eq!(outcome, TimeoutOutcome::Completed(3));
            assert_eq!(outcome.exit_code(), 3);
        }
    }

    #[test]
    fn test_slow_command_times_out_promptly() {
        for sup in supervisors() {
            let start = Instant::now();
            let outcome = sup.run_with_timeout(Duration::from_secs(1), "sleep", &["5"]);
            let elapsed = start.elapsed();
            assert_eq!(outcome, TimeoutOutcome::TimedOut, "native={}", sup.is_native());
            assert_eq!(outcome.exit_code(), 124);
            assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
        }
    }

    #[test]
    fn test_term_ignoring_command_is_killed() {
        let sup = TimeoutSupervisor::fallback().with_kill_grace(Duration::from_millis(300));
        let start = Instant::now();
        let outcome = sup.run_with_timeout(
            Duration::from_millis(300),
            "sh",
            &["-c", "trap '' TERM; while :; do sleep 0.05; done"],
        );
        assert_eq!(outcome, TimeoutOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_native_zero_grace_still_kills() {
        let Some(native) = native_timeout() else {
            return;
        };
        let sup = TimeoutSupervisor::native(native).with_kill_grace(Duration::ZERO);
        let start = Instant::now();
        let outcome = sup.run_with_timeout(
            Duration::from_millis(300),
            "sh",
            &["-c", "trap '' TERM; sleep 4"],
        );
        assert_eq!(outcome, TimeoutOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[test]
    fn test_sub_millisecond_bound_is_enforced() {
        for sup in supervisors() {
            let start = Instant::now();
            let outcome = sup.run_with_timeout(Duration::from_micros(400), "sleep", &["2"]);
            assert_eq!(outcome, TimeoutOutcome::TimedOut, "native={}", sup.is_native());
            assert!(start.elapsed() < Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_format_secs_never_zero() {
        assert_eq!(format_secs(Duration::ZERO), "0.001");
        assert_eq!(format_secs(Duration::from_micros(400)), "0.001");
        assert_eq!(format_secs(Duration::from_micros(1500)), "0.002");
        assert_eq!(format_secs(Duration::from_millis(1500)), "1.500");
        assert_eq!(format_secs(Duration::from_secs(120)), "120.000");
    }

    #[test]
    fn test_reserved_looking_exit_codes_are_the_commands_own() {
        for sup in supervisors() {
            for code in [125, 126, 127] {
                let script = format!("exit {code}");
                let outcome = sup.run_with_timeout(Duration::from_secs(5), "sh", &["-c", &script]);
                assert_eq!(
                    outcome,
                    TimeoutOutcome::Completed(code),
                    "native={}",
                    sup.is_native()
                );
            }
        }
    }

    #[test]
    fn test_non_executable_file_is_supervisor_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        for sup in supervisors() {
            let outcome = sup.run_with_timeout(Duration::from_secs(1), tmp.path(), NO_ARGS);
            assert!(
                matches!(outcome, TimeoutOutcome::SupervisorError(_)),
                "got {outcome:?}"
            );
        }
    }

    #[test]
    fn test_missing_command_is_supervisor_error() {
        for sup in supervisors() {
            let outcome = sup.run_with_timeout(
                Duration::from_secs(1),
                "/nonexistent/safe-clean-no-such-binary",
                NO_ARGS,
            );
            assert!(
                matches!(outcome, TimeoutOutcome::SupervisorError(_)),
                "got {outcome:?}"
            );
        }
    }

    #[test]
    fn test_native_lookup_is_cached() {
        let first = native_timeout();
        let second = native_timeout();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bounded_work_finishes() {
        let sup = TimeoutSupervisor::fallback();
        match sup.run_bounded(Duration::from_secs(1), |_| 40 + 2) {
            Bounded::Finished(v) => assert_eq!(v, 42),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bounded_work_times_out() {
        let sup = TimeoutSupervisor::fallback().with_kill_grace(Duration::from_millis(100));
        let start = Instant::now();
        let outcome = sup.run_bounded(Duration::from_millis(100), |_| {
            thread::sleep(Duration::from_secs(2));
        });
        assert!(matches!(outcome, Bounded::TimedOut));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancelled_work_stops_before_timeout_is_reported() {
        use std::sync::atomic::AtomicUsize;

        let steps = Arc::new(AtomicUsize::new(0));
        let worker_steps = Arc::clone(&steps);
        let sup = TimeoutSupervisor::fallback();
        let outcome = sup.run_bounded(Duration::from_millis(100), move |token| {
            while !token.is_cancelled() {
                worker_steps.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        });
        assert!(matches!(outcome, Bounded::TimedOut));

        let at_return = steps.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(steps.load(Ordering::SeqCst), at_return);
    }

    #[test]
    fn test_bounded_panicking_work_is_supervisor_error() {
        let sup = TimeoutSupervisor::fallback();
        let outcome: Bounded<()> = sup.run_bounded(Duration::from_secs(1), |_| panic!("boom"));
        assert!(matches!(outcome, Bounded::SupervisorError(_)));
    }
}
