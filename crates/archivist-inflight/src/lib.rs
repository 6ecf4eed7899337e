//! Process-wide in-flight registry: which worker message is currently
//! processing a given bag (spec §4.E).

use std::collections::HashMap;
use std::path::Path;

use archivist_error::{Error, Result};
use parking_lot::Mutex;

#[derive(Default)]
pub struct InFlightRegistry {
    owners: Mutex<HashMap<String, String>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        InFlightRegistry::default()
    }

    /// Fails if `key` is already mapped to a *different* message id.
    pub fn register(&self, key: &str, msg_id: &str) -> Result<()> {
        let mut owners = self.owners.lock();
        match owners.get(key) {
            Some(existing) if existing != msg_id => Err(Error::validation(format!(
                "bag '{key}' is already in progress under message '{existing}'"
            ))),
            _ => {
                owners.insert(key.to_string(), msg_id.to_string());
                Ok(())
            }
        }
    }

    /// Idempotent: unregistering a key that isn't registered is not an error.
    pub fn unregister(&self, key: &str) {
        self.owners.lock().remove(key);
    }

    pub fn message_id_for(&self, key: &str) -> Option<String> {
        self.owners.lock().get(key).cloned()
    }

    /// A bag is "already in progress" when the key is registered, or when
    /// its downloaded tar file still exists on the working volume — the
    /// second clause catches pipeline crashes that left a registry entry
    /// behind but never cleaned up disk state (spec §4.E).
    pub fn is_in_progress(&self, key: &str, local_tar_path: &Path) -> bool {
        self.message_id_for(key).is_some() || local_tar_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_conflicting_owner() {
        let registry = InFlightRegistry::new();
        registry.register("ncsu.edu/bag1", "msg-1").unwrap();
        let err = registry.register("ncsu.edu/bag1", "msg-2").unwrap_err();
        assert!(err.message.contains("already in progress"));
    }

    #[test]
    fn register_is_idempotent_for_the_same_owner() {
        let registry = InFlightRegistry::new();
        registry.register("ncsu.edu/bag1", "msg-1").unwrap();
        registry.register("ncsu.edu/bag1", "msg-1").unwrap();
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = InFlightRegistry::new();
        registry.unregister("never-registered");
        registry.register("ncsu.edu/bag1", "msg-1").unwrap();
        registry.unregister("ncsu.edu/bag1");
        registry.unregister("ncsu.edu/bag1");
        assert_eq!(registry.message_id_for("ncsu.edu/bag1"), None);
    }

    #[test]
    fn crashed_download_is_detected_via_local_tar_file() {
        let dir = tempfile::tempdir().unwrap();
        let tar_path = dir.path().join("bag1.tar");
        std::fs::write(&tar_path, b"partial").unwrap();

        let registry = InFlightRegistry::new();
        assert!(registry.is_in_progress("ncsu.edu/bag1", &tar_path));
    }
}
