#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sshca::authority::SshCertificateAuthority;
use sshca::cert::params::CertificateRequest;
use sshca::config::AuthorityConfig;
use sshca::key::KeyFamily;
use sshca::role::{AllowList, KeyBits, RolePolicy, TtlBounds};
use sshca::error::SshCaError;
use sshca::storage::{MemoryStorage, Storage, StorageEntry};
use time::Duration;

pub const CA_ED25519: &str = include_str!("fixtures/ca_ed25519");
pub const CA_ED25519_PUB: &str = include_str!("fixtures/ca_ed25519.pub");
pub const CA_ED25519_ENCRYPTED: &str = include_str!("fixtures/ca_ed25519_encrypted");
pub const CA_ED25519_ENCRYPTED_PUB: &str = include_str!("fixtures/ca_ed25519_encrypted.pub");
pub const CA_RSA: &str = include_str!("fixtures/ca_rsa");
pub const CA_RSA_PUB: &str = include_str!("fixtures/ca_rsa.pub");
pub const CA_ECDSA_P256: &str = include_str!("fixtures/ca_ecdsa_p256");
pub const CA_ECDSA_P256_PUB: &str = include_str!("fixtures/ca_ecdsa_p256.pub");

pub const USER_ED25519: &str = include_str!("fixtures/user_ed25519.pub");
pub const USER_RSA_2048: &str = include_str!("fixtures/user_rsa_2048.pub");
pub const USER_RSA_1024: &str = include_str!("fixtures/user_rsa_1024.pub");
pub const USER_ECDSA_P256: &str = include_str!("fixtures/user_ecdsa_p256.pub");
pub const HOST_ECDSA_P384: &str = include_str!("fixtures/host_ecdsa_p384.pub");

/// Role `r1`: Ed25519 user keys, principals alice and bob, TTL 1h..24h
/// defaulting to 12h, no options or extensions.
pub fn role_r1() -> RolePolicy {
    RolePolicy::builder()
        .name("r1")
        .allowed_key_types(BTreeMap::from([(KeyFamily::Ed25519, KeyBits::any())]))
        .allowed_principals(AllowList::new(["alice", "bob"]))
        .ttl(TtlBounds::new(Duration::hours(1), Duration::hours(12), Duration::hours(24)).unwrap())
        .build()
}

/// An authority over `storage` with the Ed25519 CA installed and role `r1` written.
pub fn configured_authority(storage: Arc<MemoryStorage>) -> SshCertificateAuthority {
    let ca = SshCertificateAuthority::open(storage, AuthorityConfig::default()).unwrap();
    ca.configure_ca(CA_ED25519.as_bytes(), CA_ED25519_PUB.as_bytes())
        .unwrap();
    ca.write_role(role_r1()).unwrap();
    ca
}

pub fn request(role: &str, public_key: &str) -> CertificateRequest {
    CertificateRequest::builder()
        .role(role)
        .public_key(public_key)
        .build()
}

pub fn principals(names: &[&str]) -> Option<Vec<String>> {
    Some(names.iter().map(|n| n.to_string()).collect())
}

/// Memory storage whose writes to one key fail while switched on.
pub struct FailingStorage {
    inner: MemoryStorage,
    key: &'static str,
    failing: AtomicBool,
}

impl FailingStorage {
    pub fn new(key: &'static str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            key,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Storage for FailingStorage {
    fn get(&self, key: &str) -> sshca::error::Result<Option<StorageEntry>> {
        self.inner.get(key)
    }

    fn put(&self, entry: StorageEntry) -> sshca::error::Result<()> {
        if entry.key == self.key && self.failing.load(Ordering::SeqCst) {
            return Err(SshCaError::StorageFailure("disk full".to_string()));
        }
        self.inner.put(entry)
    }

    fn delete(&self, key: &str) -> sshca::error::Result<()> {
        self.inner.delete(key)
    }

    fn list(&self, prefix: &str) -> sshca::error::Result<Vec<String>> {
        self.inner.list(prefix)
    }
}
