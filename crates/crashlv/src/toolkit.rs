//! Locations of the external programs inside a toolkit installation.

use std::path::{Path, PathBuf};

use crashlv_rpc::RpcClient;

use crate::{HarnessError, HarnessResult};

/// Command name of the target service, as it appears in the process table.
pub const TARGET_PROGRAM: &str = "spdk_tgt";

/// Command name of the I/O generator.
pub const DD_PROGRAM: &str = "spdk_dd";

/// A storage toolkit installation rooted at a directory.
#[derive(Debug, Clone)]
pub struct Toolkit {
    root: PathBuf,
}

impl Toolkit {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the long-running target service binary.
    #[must_use]
    pub fn target_bin(&self) -> PathBuf {
        self.root.join("build/bin").join(TARGET_PROGRAM)
    }

    /// Path of the I/O generator binary.
    #[must_use]
    pub fn dd_bin(&self) -> PathBuf {
        self.root.join("build/bin").join(DD_PROGRAM)
    }

    /// Path of the RPC command client.
    #[must_use]
    pub fn rpc_script(&self) -> PathBuf {
        self.root.join("scripts/rpc.py")
    }

    /// A control-plane client bound to this installation.
    #[must_use]
    pub fn rpc_client(&self) -> RpcClient {
        RpcClient::new(self.rpc_script())
    }

    /// Check that all three programs exist before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MissingProgram`] naming the first absentee.
    pub fn validate(&self) -> HarnessResult<()> {
        for path in [self.target_bin(), self.dd_bin(), self.rpc_script()] {
            if !path.is_file() {
                return Err(HarnessError::MissingProgram(path));
            }
        }
        Ok(())
    }

    /// Installation root, for diagnostics.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}
