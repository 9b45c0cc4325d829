//! One-time device and volume provisioning.
//!
//! Runs against a target started with no configuration, builds the volume
//! store and volume on the physical device, and snapshots the resulting
//! block-device subsystem so later iterations can reconstruct it without
//! the control plane.

use tracing::info;

use crashlv_proc::any_running;

use crate::config::ConfigSnapshot;
use crate::readiness::await_ready;
use crate::toolkit::{Toolkit, DD_PROGRAM, TARGET_PROGRAM};
use crate::{HarnessError, HarnessOptions, HarnessResult, CORE_MASK};

/// Allocation unit of the volume store: 1 GiB clusters.
pub const CLUSTER_SIZE_BYTES: u64 = 1 << 30;

/// Cluster clearing is skipped at store creation; recovery correctness does
/// not depend on it and clearing a whole device costs minutes.
pub const CLEAR_METHOD: &str = "none";

/// Controller name the physical device is attached under.
pub const NVME_CONTROLLER: &str = "nvme0";

/// Namespace block device the volume store is carved out of.
pub const NVME_NAMESPACE_BDEV: &str = "nvme0n1";

/// Volume store name.
pub const LVSTORE: &str = "lvs0";

/// Logical volume name.
pub const LVOL: &str = "lvol0";

/// Fully qualified volume alias (`store/volume`).
pub const LVOL_ALIAS: &str = "lvs0/lvol0";

const MIB: u64 = 1024 * 1024;

/// Volume size in MiB that consumes the store's entire data capacity.
#[must_use]
pub fn volume_size_mib(total_data_clusters: u64) -> u64 {
    total_data_clusters * CLUSTER_SIZE_BYTES / MIB
}

/// Provision the device and produce the configuration snapshot.
///
/// Every control-plane step is checked except the two cleanup deletes, which
/// are expected to fail when no residue from a previous run exists. The
/// target service is started fresh and gracefully terminated at the end; the
/// snapshot is the only thing that survives.
///
/// # Errors
///
/// Any checked command failure, startup failure, or unclean environment
/// aborts provisioning.
pub fn provision(
    toolkit: &Toolkit,
    device_bdf: &str,
    options: &HarnessOptions,
) -> HarnessResult<ConfigSnapshot> {
    ensure_no_stale_instances()?;

    let client = toolkit.rpc_client();

    info!("starting target service with no configuration");
    let target = crashlv_proc::start(
        &toolkit.target_bin(),
        &["-m".to_owned(), CORE_MASK.to_owned()],
    )?;
    let target = await_ready(target, &client, options.probe_timeout)?;

    info!(device = device_bdf, "attaching physical device");
    client.attach_nvme_controller(NVME_CONTROLLER, device_bdf)?;

    // Residue from a previous failed run; both deletes are idempotent.
    client.try_delete_lvol(LVOL_ALIAS)?;
    client.try_delete_lvstore(LVSTORE)?;

    info!(store = LVSTORE, cluster_size = CLUSTER_SIZE_BYTES, "creating volume store");
    client.create_lvstore(NVME_NAMESPACE_BDEV, LVSTORE, CLUSTER_SIZE_BYTES, CLEAR_METHOD)?;

    let stores = client.get_lvstores()?;
    if stores.len() != 1 {
        return Err(HarnessError::StoreCountMismatch {
            found: stores.len(),
        });
    }
    let clusters = stores[0].total_data_clusters;
    let size_mib = volume_size_mib(clusters);
    info!(clusters, size_mib, volume = LVOL, "creating volume over full store capacity");
    client.create_lvol(LVSTORE, LVOL, size_mib)?;

    let subsystem = client.save_subsystem_config("bdev")?;
    let snapshot = ConfigSnapshot::from_subsystem(subsystem)?;

    let out = target.terminate()?;
    info!(exit_code = out.exit_code, "target stopped after provisioning");
    Ok(snapshot)
}

/// The harness assumes exclusive use of the toolkit's process names; stale
/// instances are never auto-cleaned, only reported.
fn ensure_no_stale_instances() -> HarnessResult<()> {
    for name in [TARGET_PROGRAM, DD_PROGRAM] {
        if any_running(name)? {
            return Err(HarnessError::EnvironmentNotClean(format!(
                "{name} is already running; stop it before starting a run"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_size_converts_clusters_to_mib() {
        // 1 GiB clusters are exactly 1024 MiB each.
        assert_eq!(volume_size_mib(1), 1024);
        assert_eq!(volume_size_mib(349), 357_376);
    }

    #[test]
    fn stale_instance_check_passes_on_a_clean_host() {
        // No real toolkit processes run during tests.
        ensure_no_stale_instances().unwrap();
    }
}
