//! End-to-end run against a stub toolkit.
//!
//! Fabricates an executable toolkit layout — target service and I/O
//! generator stand-ins that just stay alive, plus an RPC client stub
//! answering the command surface with canned JSON in the toolkit's real
//! shapes — then drives provisioning and the full crash/recovery cycle
//! through it.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crashlv::orchestrator::Orchestrator;
use crashlv::setup::provision;
use crashlv::toolkit::Toolkit;
use crashlv::{HarnessError, HarnessOptions};

// Tests spawn host-visible processes and one test's live stub must never
// trip another's stale-instance precondition, so they run serialized.
static TOOLKIT_LOCK: Mutex<()> = Mutex::new(());

const BDEVS_WITH_LVOL: &str = r#"[
  {
    "name": "nvme0n1",
    "product_name": "NVMe disk",
    "block_size": 512,
    "num_blocks": 732585168,
    "driver_specific": {"nvme": [{"trid": {"trtype": "PCIe"}}]}
  },
  {
    "name": "5f2a-lvol",
    "aliases": ["lvs0/lvol0"],
    "product_name": "Logical Volume",
    "block_size": 512,
    "num_blocks": 749731840,
    "driver_specific": {"lvol": {"base_bdev": "nvme0n1"}}
  }
]"#;

const BDEVS_WITHOUT_LVOL: &str = r#"[
  {
    "name": "nvme0n1",
    "product_name": "NVMe disk",
    "driver_specific": {"nvme": [{"trid": {"trtype": "PCIe"}}]}
  }
]"#;

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn write_rpc_stub(root: &Path, bdevs_reply: &str) {
    let script = format!(
        r#"#!/bin/sh
case "$1" in
    bdev_get_bdevs)
        cat <<'EOF'
{bdevs_reply}
EOF
        ;;
    bdev_lvol_get_lvstores)
        cat <<'EOF'
[
  {{
    "uuid": "f1d9e1e3",
    "name": "lvs0",
    "base_bdev": "nvme0n1",
    "total_data_clusters": 349,
    "free_clusters": 349,
    "block_size": 512,
    "cluster_size": 1073741824
  }}
]
EOF
        ;;
    save_subsystem_config)
        echo '{{"subsystem": "bdev", "config": [{{"method": "bdev_nvme_attach_controller"}}]}}'
        ;;
    *)
        exit 0
        ;;
esac
"#
    );
    write_executable(&root.join("scripts/rpc.py"), &script);
}

fn make_toolkit(root: &Path, bdevs_reply: &str) -> Toolkit {
    fs::create_dir_all(root.join("build/bin")).unwrap();
    fs::create_dir_all(root.join("scripts")).unwrap();
    write_executable(&root.join("build/bin/spdk_tgt"), "#!/bin/sh\nexec sleep 60\n");
    write_executable(&root.join("build/bin/spdk_dd"), "#!/bin/sh\nexec sleep 60\n");
    write_rpc_stub(root, bdevs_reply);
    Toolkit::new(root)
}

fn fast_options() -> HarnessOptions {
    HarnessOptions {
        probe_timeout: Duration::from_millis(50),
        io_interval: Duration::from_millis(50),
    }
}

#[test]
fn full_run_passes_when_the_volume_survives() {
    let _guard = TOOLKIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let toolkit = make_toolkit(dir.path(), BDEVS_WITH_LVOL);
    toolkit.validate().unwrap();

    let snapshot = provision(&toolkit, "0000:5e:00.0", &fast_options()).unwrap();
    let subsystems = snapshot.document()["subsystems"].as_array().unwrap();
    assert_eq!(subsystems.len(), 1);
    assert_eq!(subsystems[0]["subsystem"], "bdev");
    assert!(snapshot.path().is_file());

    Orchestrator::new(&toolkit, fast_options())
        .run(&snapshot)
        .expect("both crash/recovery cycles should verify");
}

#[test]
fn missing_volume_aborts_and_leaves_the_target_running() {
    let _guard = TOOLKIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let toolkit = make_toolkit(dir.path(), BDEVS_WITH_LVOL);

    let snapshot = provision(&toolkit, "0000:5e:00.0", &fast_options()).unwrap();

    // From here on, recovery finds no logical volume.
    write_rpc_stub(dir.path(), BDEVS_WITHOUT_LVOL);

    let orchestrator = Orchestrator::new(&toolkit, fast_options());
    let err = orchestrator
        .run_iteration(&snapshot, 0)
        .expect_err("verification should fail without an lvol");
    let target_pid = match err {
        HarnessError::VolumeMissing { target_pid } => target_pid,
        other => panic!("expected VolumeMissing, got {other:?}"),
    };

    // The failed target must still be alive for inspection (signal 0 is an
    // existence check).
    #[allow(clippy::cast_possible_wrap)]
    let alive = unsafe { libc::kill(target_pid as i32, 0) } == 0;
    assert!(alive, "target {target_pid} should have been left running");

    // Reap the leftover so the test host stays clean.
    #[allow(clippy::cast_possible_wrap)]
    unsafe {
        libc::kill(target_pid as i32, libc::SIGKILL);
    }
}
