//! The configuration snapshot carried from setup into every iteration.

use std::path::Path;

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::HarnessResult;

/// Immutable description of the block-device subsystem, sufficient for a
/// fresh service instance to reconstruct the volume store and volume without
/// replaying control-plane commands.
///
/// Created once after provisioning and read-only thereafter. The document is
/// also persisted to a named temp file because both external programs load
/// their configuration from a `-c <path>` argument; the file lives exactly
/// as long as this value.
#[derive(Debug)]
pub struct ConfigSnapshot {
    document: Value,
    file: NamedTempFile,
}

impl ConfigSnapshot {
    /// Wrap a serialized subsystem description into a full configuration
    /// document (`{"subsystems": [..]}`) and persist it.
    ///
    /// # Errors
    ///
    /// Fails on temp-file creation or serialization problems.
    pub fn from_subsystem(subsystem: Value) -> HarnessResult<Self> {
        let document = serde_json::json!({ "subsystems": [subsystem] });
        let file = tempfile::Builder::new()
            .prefix("crashlv-config-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(file.as_file(), &document)?;
        file.as_file().sync_all()?;
        debug!(path = %file.path().display(), "configuration snapshot written");
        Ok(Self { document, file })
    }

    /// On-disk location, for `-c` arguments.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The snapshot document itself.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_the_subsystem_into_a_subsystems_array() {
        let subsystem = serde_json::json!({"subsystem": "bdev", "config": []});
        let snapshot = ConfigSnapshot::from_subsystem(subsystem).unwrap();
        assert_eq!(snapshot.document()["subsystems"][0]["subsystem"], "bdev");
    }

    #[test]
    fn persisted_file_round_trips_the_document() {
        let subsystem = serde_json::json!({"subsystem": "bdev", "config": [{"method": "x"}]});
        let snapshot = ConfigSnapshot::from_subsystem(subsystem).unwrap();
        let text = std::fs::read_to_string(snapshot.path()).unwrap();
        let reread: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(&reread, snapshot.document());
    }
}
