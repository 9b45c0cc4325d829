//! Bounded polling until a freshly started process answers on its control
//! endpoint.

use std::time::Duration;

use tracing::{debug, info};

use crashlv_proc::ManagedProcess;
use crashlv_rpc::RpcClient;

use crate::{HarnessError, HarnessResult};

/// Block until `process`'s control endpoint answers the readiness probe.
///
/// Each attempt is bounded by `probe_timeout`; between attempts there is no
/// extra delay and no retry cap — service startup time is unbounded in
/// general (device enumeration, hardware init), so the only exit conditions
/// are a successful probe or the supervised process dying. The dead-process
/// check runs before every probe so the loop can never spin against a
/// corpse.
///
/// Returns the process back to the caller on success, keeping ownership
/// linear.
///
/// # Errors
///
/// [`HarnessError::StartupFailed`] when the process exits before becoming
/// ready, carrying its captured stdout/stderr.
pub fn await_ready(
    mut process: ManagedProcess,
    client: &RpcClient,
    probe_timeout: Duration,
) -> HarnessResult<ManagedProcess> {
    let mut attempts: u32 = 0;
    loop {
        if process.poll_exited()?.is_some() {
            let program = process.cmdline().to_owned();
            let out = process.wait()?;
            return Err(HarnessError::StartupFailed {
                program,
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }

        let probe = client.probe(probe_timeout)?;
        attempts += 1;
        if probe.success() {
            info!(pid = process.pid(), attempts, "control endpoint ready");
            return Ok(process);
        }
        debug!(attempts, exit_code = probe.exit_code, "probe not answered yet");
    }
}
