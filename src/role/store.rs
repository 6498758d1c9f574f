use std::sync::Arc;

use tracing::{debug, info};

use super::RolePolicy;
use crate::error::{Result, SshCaError};
use crate::storage::{Storage, StorageEntry};

/// Storage prefix of role definitions.
pub const ROLE_PREFIX: &str = "roles/";

/// Storage-backed CRUD for role policies.
///
/// Roles are stored as JSON. A role read back is an owned value, so a caller
/// holding it sees one consistent version no matter what is written after.
#[derive(Clone)]
pub struct RoleStore {
    storage: Arc<dyn Storage>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(name: &str) -> String {
        format!("{ROLE_PREFIX}{name}")
    }

    /// Reads a role.
    pub fn get(&self, name: &str) -> Result<RolePolicy> {
        let entry = self
            .storage
            .get(&Self::key(name))?
            .ok_or_else(|| SshCaError::RoleNotFound(name.to_string()))?;
        entry.decode_json()
    }

    /// Validates and writes a role, returning the stored version.
    ///
    /// The version is one past the version currently stored, regardless of
    /// what the caller put in `role.version`.
    pub fn put(&self, mut role: RolePolicy) -> Result<RolePolicy> {
        role.validate()?;

        role.version = match self.storage.get(&Self::key(&role.name))? {
            Some(existing) => existing.decode_json::<RolePolicy>()?.version + 1,
            None => 1,
        };

        self.storage
            .put(StorageEntry::json(Self::key(&role.name), &role)?)?;
        info!(role = %role.name, version = role.version, "role written");
        Ok(role)
    }

    /// Deletes a role. Deleting a missing role is not an error.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(&Self::key(name))?;
        debug!(role = %name, "role deleted");
        Ok(())
    }

    /// Names of all stored roles, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        self.storage.list(ROLE_PREFIX)
    }
}
