//! Crash-consistency reproduction harness for an SPDK-style storage toolkit.
//!
//! The harness provisions a volume store and a logical volume on a physical
//! NVMe device, snapshots the block-device subsystem configuration, then
//! repeatedly crashes an I/O generator mid-write and restarts the target
//! service from its persisted on-disk metadata. The scenario passes when the
//! logical volume is rediscovered after every restart.
//!
//! Module map:
//! - [`toolkit`] — paths of the three external programs under test
//! - [`config`] — the immutable configuration snapshot
//! - [`readiness`] — bounded polling until a control endpoint answers
//! - [`setup`] — one-time device/volume provisioning
//! - [`orchestrator`] — the per-offset crash/recovery state machine

pub mod config;
pub mod orchestrator;
pub mod readiness;
pub mod setup;
pub mod toolkit;

use std::time::Duration;

use crashlv_proc::ProcessError;
use crashlv_rpc::RpcError;

use orchestrator::Orchestrator;
use toolkit::Toolkit;

/// CPU core mask passed to every spawn of the target service and the I/O
/// generator; both are pinned off core 0.
pub const CORE_MASK: &str = "0x2";

/// Result alias used throughout the harness.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that end a reproduction run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A stale toolkit process is already running on the host.
    #[error("environment not clean: {0}")]
    EnvironmentNotClean(String),

    /// A required toolkit program is missing from the installation.
    #[error("toolkit program not found: {0}")]
    MissingProgram(std::path::PathBuf),

    /// A supervised process died before its control endpoint answered.
    #[error("`{program}` exited during startup (exit {exit_code})")]
    StartupFailed {
        program: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// Volume store creation left something other than exactly one store.
    #[error("expected exactly one volume store after creation, found {found}")]
    StoreCountMismatch { found: usize },

    /// The reproduction failure: no logical volume came back after recovery.
    ///
    /// The restarted target is deliberately left running so its state can be
    /// inspected; `target_pid` names it.
    #[error("no logical volume visible after recovery; target (pid {target_pid}) left running for inspection")]
    VolumeMissing { target_pid: u32 },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Tunables that are environment-dependent rather than part of the scenario.
///
/// The defaults match a fast local setup; a host with slow device
/// enumeration can widen `probe_timeout` without touching the state machine.
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Upper bound on a single readiness probe attempt.
    pub probe_timeout: Duration,
    /// How long the I/O generator is allowed to write before the kill.
    pub io_interval: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            io_interval: Duration::from_secs(5),
        }
    }
}

/// Full reproduction run: provision once, then one crash/recovery cycle per
/// configured write offset.
///
/// # Errors
///
/// Stops at the first failure; see [`HarnessError`] for the taxonomy. On
/// [`HarnessError::VolumeMissing`] the target service is still running by
/// design.
pub fn run_reproduction(
    toolkit: &Toolkit,
    device_bdf: &str,
    options: HarnessOptions,
) -> HarnessResult<()> {
    toolkit.validate()?;
    let snapshot = setup::provision(toolkit, device_bdf, &options)?;
    Orchestrator::new(toolkit, options).run(&snapshot)
}
