//! Typed shapes for the control-plane's JSON record replies.
//!
//! Only the fields the harness reads are modeled; everything else a toolkit
//! version might add rides along in `driver_specific` or is ignored.

use serde::Deserialize;

/// One attached block device, as reported by `bdev_get_bdevs`.
#[derive(Debug, Clone, Deserialize)]
pub struct Bdev {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub block_size: Option<u64>,
    #[serde(default)]
    pub num_blocks: Option<u64>,
    /// Driver-private metadata, keyed by driver name.
    #[serde(default)]
    pub driver_specific: serde_json::Map<String, serde_json::Value>,
}

impl Bdev {
    /// True when this device is a logical volume (its driver metadata
    /// carries an `lvol` record).
    #[must_use]
    pub fn is_logical_volume(&self) -> bool {
        self.driver_specific.contains_key("lvol")
    }
}

/// One volume store, as reported by `bdev_lvol_get_lvstores`.
#[derive(Debug, Clone, Deserialize)]
pub struct LvolStore {
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub base_bdev: Option<String>,
    /// Usable capacity in clusters; the creation-time metadata overhead is
    /// already subtracted.
    pub total_data_clusters: u64,
    #[serde(default)]
    pub free_clusters: Option<u64>,
    /// Allocation unit size in bytes.
    pub cluster_size: u64,
}
