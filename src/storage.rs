use std::path::PathBuf;

use crate::prelude::*;

/// Last fetched vehicle data, one record per VIN.
pub trait SnapshotStore {
    /// Read the persisted raw snapshot, `None` when it is missing or unreadable.
    fn load(&self, vin: &str) -> Option<serde_json::Value>;

    fn save(&self, vin: &str, raw: &serde_json::Value) -> Result;
}

/// Stores the snapshots as `{root}/{vin}.json`.
#[must_use]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, vin: &str) -> PathBuf {
        self.root.join(format!("{vin}.json"))
    }

    fn load_fallibly(&self, vin: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path(vin);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let value = serde_json::from_slice(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        Ok(Some(value))
    }
}

impl SnapshotStore for FileStore {
    #[instrument(skip_all, fields(vin = vin))]
    fn load(&self, vin: &str) -> Option<serde_json::Value> {
        self.load_fallibly(vin).unwrap_or_else(|error| {
            warn!("failed to load the snapshot: {error:#}");
            None
        })
    }

    #[instrument(skip_all, fields(vin = vin))]
    fn save(&self, vin: &str, raw: &serde_json::Value) -> Result {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create `{}`", self.root.display()))?;
        let path = self.path(vin);
        std::fs::write(&path, serde_json::to_vec_pretty(raw)?)
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        debug!(path = %path.display(), "saved");
        Ok(())
    }
}

/// Keeps every saved snapshot, the latest one wins on load.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    pub saved: std::sync::Mutex<Vec<(String, serde_json::Value)>>,
}

#[cfg(test)]
impl SnapshotStore for MemoryStore {
    fn load(&self, vin: &str) -> Option<serde_json::Value> {
        let saved = self.saved.lock().unwrap();
        saved.iter().rev().find(|(key, _)| key == vin).map(|(_, raw)| raw.clone())
    }

    fn save(&self, vin: &str, raw: &serde_json::Value) -> Result {
        self.saved.lock().unwrap().push((vin.to_string(), raw.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temporary_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cheapest-charge-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_save_and_load() -> Result {
        let store = FileStore::new(temporary_root("save"));
        let raw = json!({ "response": { "vin": "5YJ3E7EB2NF000001" } });
        store.save("5YJ3E7EB2NF000001", &raw)?;
        assert_eq!(store.load("5YJ3E7EB2NF000001"), Some(raw));
        Ok(())
    }

    #[test]
    fn test_missing_is_none() {
        let store = FileStore::new(temporary_root("missing"));
        assert_eq!(store.load("NOPE"), None);
    }

    #[test]
    fn test_corrupt_is_none() -> Result {
        let root = temporary_root("corrupt");
        std::fs::create_dir_all(&root)?;
        std::fs::write(root.join("BROKEN.json"), "{ not json")?;
        assert_eq!(FileStore::new(root).load("BROKEN"), None);
        Ok(())
    }
}
