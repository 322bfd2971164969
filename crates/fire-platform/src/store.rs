//! File-backed snapshot store
//!
//! Each snapshot lives in `<root>/<namespace>/<key>.json` and is replaced
//! atomically: written to a sibling temp file, synced, then renamed over
//! the old one.

use crate::error::{PlatformError, Result};
use fire_core::store::KeyValueStore;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

const EXTENSION: &str = "json";

/// Snapshot store rooted at a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store under `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| store_error(&root, &e))?;
        Ok(Self { root })
    }

    /// Data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding `namespace/key`
    pub fn path_of(&self, namespace: &str, key: &str) -> Result<PathBuf> {
        check_component(namespace)?;
        check_component(key)?;
        Ok(self
            .root
            .join(namespace)
            .join(format!("{key}.{EXTENSION}")))
    }

    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(namespace, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(store_error(&path, &e)),
        }
    }

    fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_of(namespace, key)?;
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).map_err(|e| store_error(&dir, &e))?;

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(value)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(store_error(&path, &e));
        }

        trace!(path = %path.display(), len = value.len(), "Snapshot written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> fire_core::Result<Option<Vec<u8>>> {
        self.read(namespace, key).map_err(|e| core_error(namespace, key, e))
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> fire_core::Result<()> {
        self.write(namespace, key, value)
            .map_err(|e| core_error(namespace, key, e))
    }
}

fn check_component(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PlatformError::InvalidKey(name.to_string()))
    }
}

fn store_error(path: &Path, err: &io::Error) -> PlatformError {
    PlatformError::Store {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn core_error(namespace: &str, key: &str, err: PlatformError) -> fire_core::Error {
    fire_core::Error::persistence(namespace, key, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get("fire_rules", "app_rules").unwrap().is_none());
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("fire_rules", "ip_rules", b"[]").unwrap();
        store.put("fire_rules", "ip_rules", b"[1]").unwrap();

        assert_eq!(store.get("fire_rules", "ip_rules").unwrap().unwrap(), b"[1]");
        assert!(dir.path().join("fire_rules/ip_rules.json").is_file());
        assert!(!dir.path().join("fire_rules/ip_rules.json.tmp").exists());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.path_of("..", "x"),
            Err(PlatformError::InvalidKey(_))
        ));
        assert!(store.put("a/b", "x", b"{}").is_err());
        assert!(store.get("ns", "").is_err());
    }

    #[test]
    fn test_open_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/data");
        let store = FileStore::open(&root).unwrap();
        assert!(store.root().is_dir());
    }
}
