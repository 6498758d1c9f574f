use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::cert::SignedCertificate;
use crate::cert::params::CertificateRequest;
use crate::config::AuthorityConfig;
use crate::engine::SigningEngine;
use crate::error::Result;
use crate::issuer::CaKeyStore;
use crate::key::ParsedPublicKey;
use crate::role::RolePolicy;
use crate::role::store::RoleStore;
use crate::storage::{MemoryStorage, Storage};

/// An SSH certificate authority.
///
/// The entry point of the crate. Administrative writes (configuring the CA,
/// writing or deleting roles) are serialised against each other and against
/// issuance, so a single issuance never observes a CA bundle and a role from
/// two different administrative epochs. Issuance calls run concurrently.
///
/// # Example
/// ```no_run
/// use sshca::authority::SshCertificateAuthority;
/// use sshca::cert::params::CertificateRequest;
///
/// # fn main() -> Result<(), sshca::error::SshCaError> {
/// let ca = SshCertificateAuthority::in_memory();
/// ca.configure_ca(
///     std::fs::read("ca_ed25519").unwrap().as_slice(),
///     std::fs::read("ca_ed25519.pub").unwrap().as_slice(),
/// )?;
/// let certificate = ca.issue_certificate(
///     &CertificateRequest::builder()
///         .role("r1")
///         .public_key(std::fs::read("id_ed25519.pub").unwrap())
///         .build(),
/// )?;
/// println!("{certificate}");
/// # Ok(())
/// # }
/// ```
pub struct SshCertificateAuthority {
    gate: RwLock<()>,
    ca: Arc<CaKeyStore>,
    roles: RoleStore,
    engine: SigningEngine,
    config: AuthorityConfig,
}

impl SshCertificateAuthority {
    /// Opens an authority over `storage`, loading any CA bundle persisted
    /// there. Serial numbers continue past those reserved before the restart.
    pub fn open(storage: Arc<dyn Storage>, config: AuthorityConfig) -> Result<Self> {
        config.validate()?;
        let ca = CaKeyStore::open(storage.clone(), config.serial_reservation_block)?;
        let authority = Self::assemble(ca, storage, config);
        info!(
            configured = authority.ca.is_configured(),
            roles = authority.roles.list()?.len(),
            "opened SSH certificate authority"
        );
        Ok(authority)
    }

    /// An authority over fresh in-memory storage with the default configuration.
    pub fn in_memory() -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let config = AuthorityConfig::default();
        let ca = CaKeyStore::new(storage.clone(), config.serial_reservation_block);
        Self::assemble(ca, storage, config)
    }

    fn assemble(ca: CaKeyStore, storage: Arc<dyn Storage>, config: AuthorityConfig) -> Self {
        let ca = Arc::new(ca);
        let roles = RoleStore::new(storage);
        Self {
            gate: RwLock::new(()),
            engine: SigningEngine::new(roles.clone(), ca.clone(), config.clone()),
            ca,
            roles,
            config,
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Installs a new CA keypair, replacing any previous one.
    ///
    /// Both halves are validated before anything is stored. Certificates
    /// issued afterwards are signed by the new key, with serials starting
    /// again at 1.
    pub fn configure_ca(&self, private_key: &[u8], public_key: &[u8]) -> Result<()> {
        let _admin = self.gate.write();
        self.ca.set_bundle(private_key, public_key)
    }

    /// The CA public key as an OpenSSH line, for `TrustedUserCAKeys` or
    /// `@cert-authority` entries.
    pub fn ca_public_key(&self) -> Result<String> {
        let _reader = self.gate.read();
        self.ca.public_key()?.to_openssh()
    }

    /// The CA public key, parsed.
    pub fn ca_key(&self) -> Result<ParsedPublicKey> {
        let _reader = self.gate.read();
        self.ca.public_key()
    }

    /// Issues a certificate and returns it as an OpenSSH `*-cert.pub` line.
    pub fn issue_certificate(&self, request: &CertificateRequest) -> Result<String> {
        self.issue(request)?.to_openssh()
    }

    /// Issues a certificate.
    pub fn issue(&self, request: &CertificateRequest) -> Result<SignedCertificate> {
        let _reader = self.gate.read();
        self.engine.issue(request)
    }

    /// Creates or replaces a role; returns it with its new version.
    pub fn write_role(&self, role: RolePolicy) -> Result<RolePolicy> {
        let _admin = self.gate.write();
        self.roles.put(role)
    }

    pub fn read_role(&self, name: &str) -> Result<RolePolicy> {
        let _reader = self.gate.read();
        self.roles.get(name)
    }

    pub fn delete_role(&self, name: &str) -> Result<()> {
        let _admin = self.gate.write();
        self.roles.delete(name)
    }

    pub fn list_roles(&self) -> Result<Vec<String>> {
        let _reader = self.gate.read();
        self.roles.list()
    }
}
