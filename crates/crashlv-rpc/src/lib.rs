//! Synchronous control-plane client for the storage toolkit.
//!
//! Commands go through the toolkit's RPC command client (`scripts/rpc.py`),
//! one short-lived process per command, and replies come back as JSON on
//! stdout. Callers choose between two modes:
//!
//! - **checked** ([`RpcClient::invoke_checked`] and the typed wrappers built
//!   on it): a non-zero exit code means the environment or configuration is
//!   wrong and the run must stop.
//! - **unchecked** ([`RpcClient::invoke`], the `try_*` wrappers and the
//!   readiness probe): the caller inspects or discards the outcome itself.

mod records;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crashlv_proc::{run_to_completion, run_with_timeout, ProcessError, RunOutput};

pub use records::{Bdev, LvolStore};

/// Result alias for control-plane operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors raised by control-plane commands.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// A checked command exited non-zero.
    #[error("rpc command `{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A reply did not decode into the expected record shape.
    #[error("failed to decode `{command}` reply: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// The command client itself could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Client for a running target's control endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    program: PathBuf,
}

impl RpcClient {
    /// Create a client that invokes the given RPC command client binary.
    #[must_use]
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Path of the underlying command client.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Issue a command and return the raw outcome, tolerating failure.
    ///
    /// # Errors
    ///
    /// Fails only when the command client cannot be spawned; a non-zero exit
    /// is reported through [`RunOutput`], not as an error.
    pub fn invoke(&self, args: &[&str]) -> RpcResult<RunOutput> {
        let owned: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
        let out = run_to_completion(&self.program, &owned)?;
        debug!(command = %args.join(" "), exit_code = out.exit_code, "rpc command finished");
        Ok(out)
    }

    /// Issue a command that must succeed.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::CommandFailed`] on any non-zero exit; these are
    /// precondition violations, not reproducible scenario failures.
    pub fn invoke_checked(&self, args: &[&str]) -> RpcResult<RunOutput> {
        let out = self.invoke(args)?;
        if !out.success() {
            return Err(RpcError::CommandFailed {
                command: args.join(" "),
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(out)
    }

    /// One bounded readiness probe: `rpc_get_methods` under `timeout`.
    ///
    /// Success (exit 0) means the control endpoint answered; anything else —
    /// connection refused, probe killed at the timeout — counts as
    /// not-ready-yet and is reported through the [`RunOutput`].
    ///
    /// # Errors
    ///
    /// Fails only when the command client cannot be spawned.
    pub fn probe(&self, timeout: Duration) -> RpcResult<RunOutput> {
        let args = vec!["rpc_get_methods".to_owned()];
        Ok(run_with_timeout(&self.program, &args, timeout)?)
    }

    // ── Typed command surface ───────────────────────────────────────────

    /// Attach a physical NVMe controller as a raw block backend.
    ///
    /// # Errors
    ///
    /// Checked; any failure is fatal.
    pub fn attach_nvme_controller(&self, name: &str, traddr: &str) -> RpcResult<()> {
        self.invoke_checked(&[
            "bdev_nvme_attach_controller",
            "--name",
            name,
            "--trtype",
            "PCIe",
            "--traddr",
            traddr,
        ])?;
        Ok(())
    }

    /// Best-effort delete of a logical volume; failure is expected when the
    /// volume does not exist and is ignored.
    ///
    /// # Errors
    ///
    /// Fails only when the command client cannot be spawned.
    pub fn try_delete_lvol(&self, alias: &str) -> RpcResult<()> {
        let out = self.invoke(&["bdev_lvol_delete", alias])?;
        if !out.success() {
            debug!(alias, exit_code = out.exit_code, "lvol cleanup delete ignored");
        }
        Ok(())
    }

    /// Best-effort delete of a volume store; failure ignored as above.
    ///
    /// # Errors
    ///
    /// Fails only when the command client cannot be spawned.
    pub fn try_delete_lvstore(&self, name: &str) -> RpcResult<()> {
        let out = self.invoke(&["bdev_lvol_delete_lvstore", "-l", name])?;
        if !out.success() {
            debug!(name, exit_code = out.exit_code, "lvstore cleanup delete ignored");
        }
        Ok(())
    }

    /// Create a volume store on `bdev` with the given cluster size in bytes
    /// and clear method.
    ///
    /// # Errors
    ///
    /// Checked; any failure is fatal.
    pub fn create_lvstore(
        &self,
        bdev: &str,
        name: &str,
        cluster_size: u64,
        clear_method: &str,
    ) -> RpcResult<()> {
        let size = cluster_size.to_string();
        self.invoke_checked(&[
            "bdev_lvol_create_lvstore",
            "-c",
            &size,
            "--clear-method",
            clear_method,
            bdev,
            name,
        ])?;
        Ok(())
    }

    /// List all volume stores.
    ///
    /// # Errors
    ///
    /// Checked; also fails when the reply does not decode.
    pub fn get_lvstores(&self) -> RpcResult<Vec<LvolStore>> {
        let out = self.invoke_checked(&["bdev_lvol_get_lvstores"])?;
        decode("bdev_lvol_get_lvstores", &out.stdout)
    }

    /// Create a thin-provisioned logical volume of `size_mib` MiB inside
    /// `store`.
    ///
    /// # Errors
    ///
    /// Checked; any failure is fatal.
    pub fn create_lvol(&self, store: &str, name: &str, size_mib: u64) -> RpcResult<()> {
        let size = size_mib.to_string();
        self.invoke_checked(&["bdev_lvol_create", "-l", store, "-t", name, &size])?;
        Ok(())
    }

    /// List all attached block devices.
    ///
    /// # Errors
    ///
    /// Checked; also fails when the reply does not decode.
    pub fn get_bdevs(&self) -> RpcResult<Vec<Bdev>> {
        let out = self.invoke_checked(&["bdev_get_bdevs"])?;
        decode("bdev_get_bdevs", &out.stdout)
    }

    /// Ask the target to serialize one subsystem's configuration and return
    /// the raw subsystem document.
    ///
    /// # Errors
    ///
    /// Checked; also fails when the reply does not decode.
    pub fn save_subsystem_config(&self, subsystem: &str) -> RpcResult<serde_json::Value> {
        let out = self.invoke_checked(&["save_subsystem_config", "-n", subsystem])?;
        decode("save_subsystem_config", &out.stdout)
    }
}

fn decode<T: DeserializeOwned>(command: &str, stdout: &str) -> RpcResult<T> {
    serde_json::from_str(stdout).map_err(|source| RpcError::Decode {
        command: command.to_owned(),
        source,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────
