//! Process supervision for external toolkit programs.
//!
//! Every interaction the harness has with the outside world is one of three
//! spawn shapes: fire-and-forget background processes that get signalled
//! later ([`start`]), short synchronous invocations ([`run_to_completion`]),
//! and bounded probe attempts that are force-killed if they outlive their
//! budget ([`run_with_timeout`]). All three capture stdout/stderr so failures
//! can be surfaced verbatim.

use std::io;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

use tracing::debug;

/// Result alias for supervisor operations.
pub type ProcResult<T> = Result<T, ProcessError>;

/// Errors raised while spawning or reaping external processes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be launched at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// An I/O error while waiting on or signalling a process.
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

// ── Captured output ─────────────────────────────────────────────────────

/// Exit code plus captured output of a finished process.
///
/// `exit_code` is `-1` when the process was terminated by a signal and
/// therefore has no code.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    fn from_output(output: Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// True when the process exited on its own with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ── Managed processes ───────────────────────────────────────────────────

/// A supervised external process.
///
/// Owned exclusively by whoever started it; the consuming [`kill`],
/// [`terminate`] and [`wait`] operations reap the process and hand back its
/// buffered output, so a `ManagedProcess` can never outlive the harness's
/// knowledge of it.
///
/// [`kill`]: ManagedProcess::kill
/// [`terminate`]: ManagedProcess::terminate
/// [`wait`]: ManagedProcess::wait
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    cmdline: String,
}

impl ManagedProcess {
    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The rendered command line, for diagnostics.
    #[must_use]
    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    /// Non-blocking exit check.
    ///
    /// Returns `Some(exit_code)` once the process has exited, `None` while it
    /// is still running.
    ///
    /// # Errors
    ///
    /// Propagates `try_wait` failures.
    pub fn poll_exited(&mut self) -> io::Result<Option<i32>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| status.code().unwrap_or(-1)))
    }

    /// Send SIGKILL and reap.
    ///
    /// This is the non-graceful path used for fault injection; the process
    /// gets no chance to flush anything.
    ///
    /// # Errors
    ///
    /// Propagates reap failures. A kill delivered to an already-exited
    /// process is not an error.
    pub fn kill(mut self) -> io::Result<RunOutput> {
        debug!(pid = self.pid(), cmd = %self.cmdline, "killing process (SIGKILL)");
        // Ignore delivery failure: the process may have exited on its own.
        let _ = self.child.kill();
        self.reap()
    }

    /// Send SIGTERM, then block until the process exits and reap it.
    ///
    /// # Errors
    ///
    /// Propagates reap failures.
    pub fn terminate(self) -> io::Result<RunOutput> {
        debug!(pid = self.pid(), cmd = %self.cmdline, "terminating process (SIGTERM)");
        // std only exposes SIGKILL; graceful shutdown needs the raw signal.
        // Delivery failure (ESRCH) means the process already exited.
        unsafe {
            #[allow(clippy::cast_possible_wrap)]
            libc::kill(self.pid() as i32, libc::SIGTERM);
        }
        self.reap()
    }

    /// Block until the process exits on its own and reap it.
    ///
    /// # Errors
    ///
    /// Propagates reap failures.
    pub fn wait(self) -> io::Result<RunOutput> {
        self.reap()
    }

    fn reap(self) -> io::Result<RunOutput> {
        let output = self.child.wait_with_output()?;
        Ok(RunOutput::from_output(output))
    }
}

// ── Spawn shapes ────────────────────────────────────────────────────────

/// Launch a process in the background with stdout/stderr piped.
///
/// Never blocks on completion; pair with the consuming operations on
/// [`ManagedProcess`] to reap it.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] when the program cannot be launched.
pub fn start(program: &Path, args: &[String]) -> ProcResult<ManagedProcess> {
    let cmdline = render_cmdline(program, args);
    debug!(cmd = %cmdline, "starting process");
    let child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: cmdline.clone(),
            source,
        })?;
    Ok(ManagedProcess { child, cmdline })
}

/// Launch a process and block until it exits naturally.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] when the program cannot be launched. A
/// non-zero exit is not an error here; callers inspect [`RunOutput`].
pub fn run_to_completion(program: &Path, args: &[String]) -> ProcResult<RunOutput> {
    let cmdline = render_cmdline(program, args);
    debug!(cmd = %cmdline, "running process to completion");
    let output = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ProcessError::Spawn {
            command: cmdline,
            source,
        })?;
    Ok(RunOutput::from_output(output))
}

/// Launch a process, sleep for `timeout`, and force-kill it if still running.
///
/// The full `timeout` is always slept, which bounds each attempt from above
/// and below; the caller sizes it to the expected runtime of the command.
/// Output is captured either way.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] when the program cannot be launched, or
/// an I/O error from reaping.
pub fn run_with_timeout(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> ProcResult<RunOutput> {
    let mut process = start(program, args)?;
    std::thread::sleep(timeout);
    if process.poll_exited()?.is_none() {
        debug!(cmd = %process.cmdline(), timeout_ms = timeout.as_millis() as u64, "probe still running after timeout");
        return Ok(process.kill()?);
    }
    Ok(process.wait()?)
}

// ── Host-wide process lookup ────────────────────────────────────────────

/// True when any process on the host has the given command name.
///
/// Scans `/proc/<pid>/comm`. The kernel truncates comm to 15 bytes, so the
/// needle is truncated the same way before comparison.
///
/// # Errors
///
/// Fails only when `/proc` itself cannot be read; unreadable or vanished
/// per-process entries are skipped.
pub fn any_running(name: &str) -> io::Result<bool> {
    let needle = if name.len() > 15 { &name[..15] } else { name };
    for entry in std::fs::read_dir("/proc")? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let comm_path = entry.path().join("comm");
        if let Ok(comm) = std::fs::read_to_string(&comm_path) {
            if comm.trim_end() == needle {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn render_cmdline(program: &Path, args: &[String]) -> String {
    let mut cmdline = program.display().to_string();
    for arg in args {
        cmdline.push(' ');
        cmdline.push_str(arg);
    }
    cmdline
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    fn args(script: &str) -> Vec<String> {
        vec!["-c".to_owned(), script.to_owned()]
    }

    #[test]
    fn run_to_completion_captures_code_and_streams() {
        let out = run_to_completion(&sh(), &args("echo out; echo err >&2; exit 3")).unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    #[test]
    fn run_with_timeout_kills_a_long_runner() {
        let out = run_with_timeout(&sh(), &args("exec sleep 30"), Duration::from_millis(100)).unwrap();
        // Killed by signal, so no exit code.
        assert_eq!(out.exit_code, -1);
    }

    #[test]
    fn run_with_timeout_returns_output_of_a_fast_command() {
        let out = run_with_timeout(&sh(), &args("echo ready"), Duration::from_millis(100)).unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "ready\n");
    }

    #[test]
    fn poll_exited_sees_a_finished_process() {
        let mut p = start(&sh(), &args("exit 7")).unwrap();
        let code = loop {
            if let Some(code) = p.poll_exited().unwrap() {
                break code;
            }
            std::thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(code, 7);
    }

    #[test]
    fn kill_reaps_and_returns_buffered_output() {
        // `exec` keeps it a single process; a forked grandchild would hold
        // the output pipe open past the kill.
        let p = start(&sh(), &args("echo before-sleep; exec sleep 30")).unwrap();
        // Give the shell a moment to emit the line before the kill lands.
        std::thread::sleep(Duration::from_millis(200));
        let out = p.kill().unwrap();
        assert_eq!(out.exit_code, -1);
        assert_eq!(out.stdout, "before-sleep\n");
    }

    #[test]
    fn terminate_stops_a_sleeping_process() {
        let p = start(&sh(), &args("exec sleep 30")).unwrap();
        let out = p.terminate().unwrap();
        assert_eq!(out.exit_code, -1);
    }

    #[test]
    fn any_running_finds_our_own_process() {
        let own = std::fs::read_to_string("/proc/self/comm").unwrap();
        assert!(any_running(own.trim_end()).unwrap());
    }

    #[test]
    fn any_running_rejects_a_nonsense_name() {
        assert!(!any_running("no-such-process-zzz").unwrap());
    }
}
