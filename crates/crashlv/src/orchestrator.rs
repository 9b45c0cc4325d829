//! The crash/recovery state machine.
//!
//! One iteration per configured write offset:
//!
//! 1. **Crash phase** — start the I/O generator against the configuration
//!    snapshot, wait for its control endpoint, let it write for a fixed
//!    interval, then SIGKILL it mid-write.
//! 2. **Recovery phase** — start the target service from the same snapshot
//!    and wait for readiness; the target rebuilds its state purely from the
//!    device's persisted metadata.
//! 3. **Verification** — list block devices and require at least one logical
//!    volume. An empty set is the reproduction failure: the target is left
//!    running for inspection and the run aborts.

use std::path::Path;

use tracing::{debug, info, warn};

use crashlv_rpc::{Bdev, RpcClient};

use crate::config::ConfigSnapshot;
use crate::readiness::await_ready;
use crate::setup::LVOL_ALIAS;
use crate::toolkit::Toolkit;
use crate::{HarnessError, HarnessOptions, HarnessResult, CORE_MASK};

/// I/O block size the generator writes in.
pub const DD_BLOCK_SIZE: u64 = 4096;

/// Number of blocks the generator would write if left alone; large enough
/// that it is always still writing when the kill lands.
pub const DD_BLOCK_COUNT: u64 = 1_958_912;

/// Write offsets (in I/O blocks) for the reference scenario: near the start
/// of the volume, and roughly mid-way through it.
pub const DD_OFFSETS: [u64; 2] = [0, 924_672];

const DD_INPUT: &str = "/dev/urandom";

/// Runs crash/recovery cycles against one toolkit installation.
pub struct Orchestrator<'a> {
    toolkit: &'a Toolkit,
    client: RpcClient,
    options: HarnessOptions,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(toolkit: &'a Toolkit, options: HarnessOptions) -> Self {
        let client = toolkit.rpc_client();
        Self {
            toolkit,
            client,
            options,
        }
    }

    /// Run the full cycle once per reference offset, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Propagates the first iteration failure.
    pub fn run(&self, snapshot: &ConfigSnapshot) -> HarnessResult<()> {
        for seek_blocks in DD_OFFSETS {
            self.run_iteration(snapshot, seek_blocks)?;
        }
        Ok(())
    }

    /// One crash/recovery cycle at the given write offset.
    ///
    /// # Errors
    ///
    /// [`HarnessError::VolumeMissing`] when verification finds no logical
    /// volume — in that case the restarted target is intentionally not torn
    /// down. Other errors follow the usual taxonomy.
    pub fn run_iteration(&self, snapshot: &ConfigSnapshot, seek_blocks: u64) -> HarnessResult<()> {
        info!(seek_blocks, "crash phase: starting I/O generator");
        let dd = crashlv_proc::start(&self.toolkit.dd_bin(), &dd_args(snapshot.path(), seek_blocks))?;
        let dd = await_ready(dd, &self.client, self.options.probe_timeout)?;

        // Let writes progress into the volume before pulling the plug.
        std::thread::sleep(self.options.io_interval);
        let out = dd.kill()?;
        debug!(exit_code = out.exit_code, "I/O generator killed mid-write");

        info!("recovery phase: restarting target from snapshot");
        let target = crashlv_proc::start(&self.toolkit.target_bin(), &target_args(snapshot.path()))?;
        let target = await_ready(target, &self.client, self.options.probe_timeout)?;

        let volumes: Vec<Bdev> = self
            .client
            .get_bdevs()?
            .into_iter()
            .filter(Bdev::is_logical_volume)
            .collect();
        if volumes.is_empty() {
            let target_pid = target.pid();
            warn!(target_pid, "no logical volume after recovery; leaving target running");
            // Not reaped: the post-crash state stays live for inspection.
            drop(target);
            return Err(HarnessError::VolumeMissing { target_pid });
        }

        let names: Vec<&str> = volumes.iter().map(|v| v.name.as_str()).collect();
        info!(seek_blocks, volumes = ?names, "volume recovered after crash");
        let out = target.terminate()?;
        debug!(exit_code = out.exit_code, "target stopped after verification");
        Ok(())
    }
}

fn target_args(config: &Path) -> Vec<String> {
    vec![
        "-m".to_owned(),
        CORE_MASK.to_owned(),
        "-c".to_owned(),
        config.display().to_string(),
    ]
}

fn dd_args(config: &Path, seek_blocks: u64) -> Vec<String> {
    vec![
        "-m".to_owned(),
        CORE_MASK.to_owned(),
        "-c".to_owned(),
        config.display().to_string(),
        "--if".to_owned(),
        DD_INPUT.to_owned(),
        "--ob".to_owned(),
        LVOL_ALIAS.to_owned(),
        "--bs".to_owned(),
        DD_BLOCK_SIZE.to_string(),
        "--count".to_owned(),
        DD_BLOCK_COUNT.to_string(),
        "--seek".to_owned(),
        seek_blocks.to_string(),
    ]
}
