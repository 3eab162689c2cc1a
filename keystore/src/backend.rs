//! Persistence for encrypted keys.

use parking_lot::Mutex;
use sortes_crypto::PublicKey;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{EncryptedKey, KeystoreError};

/// Storage for encrypted keys. Archived keys are kept but no longer listed
/// or unlocked.
pub trait KeyBackend: Send + Sync {
    fn put(&self, key: &EncryptedKey) -> Result<(), KeystoreError>;
    fn get(&self, public_key: &PublicKey) -> Result<Option<EncryptedKey>, KeystoreError>;
    /// All live (non-archived) keys.
    fn list(&self) -> Result<Vec<EncryptedKey>, KeystoreError>;
    fn archive(&self, public_key: &PublicKey) -> Result<(), KeystoreError>;
    /// Remove a key, live or archived, permanently.
    fn delete(&self, public_key: &PublicKey) -> Result<(), KeystoreError>;
}

#[derive(Clone)]
struct Entry {
    key: EncryptedKey,
    archived: bool,
}

/// Keys held in process memory only.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<PublicKey, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyBackend for MemoryBackend {
    fn put(&self, key: &EncryptedKey) -> Result<(), KeystoreError> {
        self.entries.lock().insert(
            key.public_key,
            Entry {
                key: key.clone(),
                archived: false,
            },
        );
        Ok(())
    }

    fn get(&self, public_key: &PublicKey) -> Result<Option<EncryptedKey>, KeystoreError> {
        Ok(self
            .entries
            .lock()
            .get(public_key)
            .filter(|e| !e.archived)
            .map(|e| e.key.clone()))
    }

    fn list(&self) -> Result<Vec<EncryptedKey>, KeystoreError> {
        let mut keys: Vec<EncryptedKey> = self
            .entries
            .lock()
            .values()
            .filter(|e| !e.archived)
            .map(|e| e.key.clone())
            .collect();
        keys.sort_by_key(|k| k.public_key);
        Ok(keys)
    }

    fn archive(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        match self.entries.lock().get_mut(public_key) {
            Some(entry) => {
                entry.archived = true;
                Ok(())
            }
            None => Err(KeystoreError::KeyNotFound(*public_key)),
        }
    }

    fn delete(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        self.entries
            .lock()
            .remove(public_key)
            .map(|_| ())
            .ok_or(KeystoreError::KeyNotFound(*public_key))
    }
}

/// One JSON file per key in a directory; archived keys move to `archived/`.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("archived"))
            .map_err(|e| KeystoreError::Backend(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn live_path(&self, public_key: &PublicKey) -> PathBuf {
        self.dir.join(file_name(public_key))
    }

    fn archived_path(&self, public_key: &PublicKey) -> PathBuf {
        self.dir.join("archived").join(file_name(public_key))
    }
}

fn file_name(public_key: &PublicKey) -> String {
    format!("{}.json", hex::encode(public_key.as_bytes()))
}

fn read_key(path: &Path) -> Result<EncryptedKey, KeystoreError> {
    let bytes = fs::read(path)
        .map_err(|e| KeystoreError::Backend(format!("read {}: {e}", path.display())))?;
    EncryptedKey::from_json(&bytes)
}

impl KeyBackend for FileBackend {
    fn put(&self, key: &EncryptedKey) -> Result<(), KeystoreError> {
        let path = self.live_path(&key.public_key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, key.to_json()?)
            .map_err(|e| KeystoreError::Backend(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| KeystoreError::Backend(format!("rename {}: {e}", path.display())))
    }

    fn get(&self, public_key: &PublicKey) -> Result<Option<EncryptedKey>, KeystoreError> {
        let path = self.live_path(public_key);
        if !path.exists() {
            return Ok(None);
        }
        read_key(&path).map(Some)
    }

    fn list(&self) -> Result<Vec<EncryptedKey>, KeystoreError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| KeystoreError::Backend(format!("read {}: {e}", self.dir.display())))?;
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| KeystoreError::Backend(e.to_string()))?
                .path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                keys.push(read_key(&path)?);
            }
        }
        keys.sort_by_key(|k| k.public_key);
        Ok(keys)
    }

    fn archive(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        let from = self.live_path(public_key);
        if !from.exists() {
            return Err(KeystoreError::KeyNotFound(*public_key));
        }
        fs::rename(&from, self.archived_path(public_key))
            .map_err(|e| KeystoreError::Backend(format!("archive {}: {e}", from.display())))
    }

    fn delete(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        let mut found = false;
        for path in [self.live_path(public_key), self.archived_path(public_key)] {
            if path.exists() {
                fs::remove_file(&path)
                    .map_err(|e| KeystoreError::Backend(format!("remove {}: {e}", path.display())))?;
                found = true;
            }
        }
        if !found {
            return Err(KeystoreError::KeyNotFound(*public_key));
        }
        Ok(())
    }
}
