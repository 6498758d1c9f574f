//! The storage collaborator: durable key/value put/get of opaque byte blobs.
//!
//! The CA persists its public key, its signing bundle, the serial
//! reservation ceiling and the role definitions through this interface and
//! nothing else.

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, SshCaError};

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Builds an entry whose value is the JSON encoding of `value`.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self::new(key, serde_json::to_vec(value)?))
    }

    /// Decodes the entry's value as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}

/// Key/value storage backend.
///
/// `put` must be durable before it returns `Ok`. Implementations report
/// their own failures as [`SshCaError::StorageFailure`].
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>>;

    fn put(&self, entry: StorageEntry) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Lists the keys directly under `prefix`, with the prefix stripped.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory storage, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every stored value, for inspection in tests.
    pub fn values(&self) -> Vec<Vec<u8>> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        Ok(self
            .entries
            .get(key)
            .map(|value| StorageEntry::new(key, value.clone())))
    }

    fn put(&self, entry: StorageEntry) -> Result<()> {
        if entry.key.is_empty() {
            return Err(SshCaError::StorageFailure(
                "storage key must not be empty".to_string(),
            ));
        }
        self.entries.insert(entry.key, entry.value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter_map(|e| e.key().strip_prefix(prefix).map(str::to_string))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        name: String,
        count: u32,
    }

    #[test]
    fn test_put_get_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.get("public_key").unwrap().is_none());

        storage
            .put(StorageEntry::new("public_key", b"ssh-ed25519 AAAA".to_vec()))
            .unwrap();
        let entry = storage.get("public_key").unwrap().unwrap();
        assert_eq!(entry.value, b"ssh-ed25519 AAAA");

        storage.delete("public_key").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_json_entries() {
        let storage = MemoryStorage::new();
        let record = Record {
            name: "web".to_string(),
            count: 3,
        };
        storage
            .put(StorageEntry::json("roles/web", &record).unwrap())
            .unwrap();
        let decoded: Record = storage
            .get("roles/web")
            .unwrap()
            .unwrap()
            .decode_json()
            .unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_list_is_one_level_and_sorted() {
        let storage = MemoryStorage::new();
        for key in ["roles/web", "roles/db", "roles/nested/x", "config/ca_bundle"] {
            storage.put(StorageEntry::new(key, vec![1])).unwrap();
        }
        assert_eq!(storage.list("roles/").unwrap(), vec!["db", "web"]);
    }

    #[test]
    fn test_corrupt_json_is_a_storage_failure() {
        let entry = StorageEntry::new("roles/web", b"{not json".to_vec());
        let err = entry.decode_json::<Record>().unwrap_err();
        assert!(matches!(err, SshCaError::StorageFailure(_)));
    }
}
