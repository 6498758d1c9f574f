use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cert::SignedCertificate;
use crate::error::{Result, SshCaError};
use crate::key::{ParsedPrivateKey, ParsedPublicKey, validate_private_key, validate_public_key};
use crate::serial::{SerialAllocator, SerialNumber};
use crate::storage::{Storage, StorageEntry};
use crate::tbs_certificate::TbsCertificate;

/// Storage key of the CA public key (OpenSSH text).
pub const PUBLIC_KEY_PATH: &str = "public_key";
/// Storage key of the signing bundle (JSON).
pub const CA_BUNDLE_PATH: &str = "config/ca_bundle";
/// Storage key of the highest reserved serial (JSON number).
pub const SERIAL_CEILING_PATH: &str = "config/serial_ceiling";

/// Represents an entity capable of issuing certificates.
///
/// Crate-internal: signing arbitrary to-be-signed certificates bypasses role
/// policy, so only the signing engine gets to call it.
pub(crate) trait Issuer {
    /// Returns the public key relying parties verify against.
    fn ca_public_key(&self) -> &ParsedPublicKey;

    /// Allocates the serial number of the next certificate.
    fn next_serial(&self) -> Result<SerialNumber>;

    /// Signs a fully resolved certificate.
    fn sign(&self, tbs: &TbsCertificate) -> Result<SignedCertificate>;
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SigningBundleRecord {
    private_key: String,
}

/// One active CA keypair with its own serial sequence.
pub struct CaBundle {
    signing_key: ParsedPrivateKey,
    public_key: ParsedPublicKey,
    serials: SerialAllocator,
    ceiling: AtomicU64,
    reservation: Mutex<()>,
    reservation_block: u64,
    storage: Arc<dyn Storage>,
}

impl CaBundle {
    fn new(
        signing_key: ParsedPrivateKey,
        public_key: ParsedPublicKey,
        ceiling: SerialNumber,
        reservation_block: u64,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            signing_key,
            public_key,
            serials: SerialAllocator::starting_at(ceiling.saturating_add(1)),
            ceiling: AtomicU64::new(ceiling),
            reservation: Mutex::new(()),
            reservation_block,
            storage,
        }
    }

    /// Makes sure `serial` is covered by a reservation persisted in storage,
    /// so a restart can never hand it out again.
    fn reserve(&self, serial: SerialNumber) -> Result<()> {
        if serial <= self.ceiling.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.reservation.lock();
        if serial <= self.ceiling.load(Ordering::Acquire) {
            return Ok(());
        }
        let ceiling = serial.saturating_add(self.reservation_block - 1);
        self.storage
            .put(StorageEntry::json(SERIAL_CEILING_PATH, &ceiling)?)?;
        self.ceiling.store(ceiling, Ordering::Release);
        debug!(ceiling, "reserved serial block");
        Ok(())
    }
}

impl Issuer for CaBundle {
    fn ca_public_key(&self) -> &ParsedPublicKey {
        &self.public_key
    }

    fn next_serial(&self) -> Result<SerialNumber> {
        let serial = self
            .serials
            .next()
            .ok_or_else(|| SshCaError::SigningFailure("serial numbers exhausted".to_string()))?;
        self.reserve(serial)?;
        Ok(serial)
    }

    fn sign(&self, tbs: &TbsCertificate) -> Result<SignedCertificate> {
        let builder = tbs.to_builder(&mut OsRng)?;
        let certificate = builder
            .sign(self.signing_key.signing_key())
            .map_err(|e| SshCaError::SigningFailure(e.to_string()))?;
        Ok(SignedCertificate::from(certificate))
    }
}

impl fmt::Debug for CaBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaBundle")
            .field("public_key", &self.public_key.fingerprint().to_string())
            .field("next_serial", &self.serials.peek())
            .finish_non_exhaustive()
    }
}

/// Holds the single active CA bundle.
///
/// The private key is accepted on write and used for signing; no method
/// returns it. Readers load the bundle as one `Arc`, so they observe either
/// the old pair or the new pair, never a mix.
pub struct CaKeyStore {
    storage: Arc<dyn Storage>,
    bundle: ArcSwapOption<CaBundle>,
    write_lock: Mutex<()>,
    reservation_block: u64,
}

impl CaKeyStore {
    /// Creates an empty store.
    pub fn new(storage: Arc<dyn Storage>, reservation_block: u64) -> Self {
        Self {
            storage,
            bundle: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
            reservation_block: reservation_block.max(1),
        }
    }

    /// Creates a store and loads a previously persisted bundle, if any.
    pub fn open(storage: Arc<dyn Storage>, reservation_block: u64) -> Result<Self> {
        let store = Self::new(storage, reservation_block);
        store.load()?;
        Ok(store)
    }

    fn load(&self) -> Result<()> {
        let public = self.storage.get(PUBLIC_KEY_PATH)?;
        let bundle = self.storage.get(CA_BUNDLE_PATH)?;

        let (public, bundle) = match (public, bundle) {
            (Some(public), Some(bundle)) => (public, bundle),
            (Some(_), None) => {
                warn!("CA public key is stored without a signing bundle; CA stays unconfigured");
                return Ok(());
            }
            (None, Some(_)) => {
                warn!("CA signing bundle is stored without a public key; CA stays unconfigured");
                return Ok(());
            }
            (None, None) => return Ok(()),
        };

        let record: SigningBundleRecord = bundle.decode_json()?;
        let signing_key = validate_private_key(record.private_key.as_bytes())?;
        let public_key = validate_public_key(&public.value)?;
        if signing_key.public_key().key_data() != public_key.key_data() {
            warn!(
                stored = %public_key.fingerprint(),
                bundle = %signing_key.public_key().fingerprint(),
                "CA public key does not match the signing bundle; CA stays unconfigured"
            );
            return Ok(());
        }
        let ceiling = match self.storage.get(SERIAL_CEILING_PATH)? {
            Some(entry) => entry.decode_json::<u64>()?,
            None => 0,
        };

        info!(
            fingerprint = %public_key.fingerprint(),
            resume_serial = ceiling.saturating_add(1),
            "loaded CA bundle from storage"
        );
        self.bundle.store(Some(Arc::new(CaBundle::new(
            signing_key,
            public_key,
            ceiling,
            self.reservation_block,
            self.storage.clone(),
        ))));
        Ok(())
    }

    /// Validates and installs a new CA keypair.
    ///
    /// The public half is persisted before the signing bundle. If the bundle
    /// write fails, the previous public half is put back so storage never
    /// pairs a new public key with an old bundle. Replacing the bundle
    /// restarts the serial sequence at 1: a new keypair is a new trust root.
    pub fn set_bundle(&self, private_key: &[u8], public_key: &[u8]) -> Result<()> {
        let signing_key = validate_private_key(private_key)?;
        let public_key = validate_public_key(public_key)?;
        if signing_key.public_key().key_data() != public_key.key_data() {
            return Err(SshCaError::InvalidKeyFormat(
                "public key does not match the private key".to_string(),
            ));
        }

        let record = SigningBundleRecord {
            private_key: String::from_utf8(private_key.to_vec()).map_err(|_| {
                SshCaError::InvalidKeyFormat("private key is not valid UTF-8".to_string())
            })?,
        };
        let record = Zeroizing::new(serde_json::to_vec(&record)?);

        let _guard = self.write_lock.lock();
        let previous = self.storage.get(PUBLIC_KEY_PATH)?;
        self.storage
            .put(StorageEntry::new(PUBLIC_KEY_PATH, public_key.to_openssh()?))?;
        if let Err(e) = self
            .storage
            .put(StorageEntry::new(CA_BUNDLE_PATH, record.to_vec()))
        {
            self.restore_public_key(previous);
            return Err(e);
        }
        self.storage
            .put(StorageEntry::json(SERIAL_CEILING_PATH, &0u64)?)?;

        info!(
            algorithm = %public_key.as_ssh_key().algorithm(),
            fingerprint = %public_key.fingerprint(),
            "CA bundle configured; serial sequence restarts"
        );
        self.bundle.store(Some(Arc::new(CaBundle::new(
            signing_key,
            public_key,
            0,
            self.reservation_block,
            self.storage.clone(),
        ))));
        Ok(())
    }

    fn restore_public_key(&self, previous: Option<StorageEntry>) {
        let restored = match previous {
            Some(entry) => self.storage.put(entry),
            None => self.storage.delete(PUBLIC_KEY_PATH),
        };
        match restored {
            Ok(()) => warn!("CA bundle write failed; previous public key restored"),
            Err(e) => warn!(error = %e, "CA bundle write failed and the public key could not be restored"),
        }
    }

    /// Public half of the active CA keypair.
    pub fn public_key(&self) -> Result<ParsedPublicKey> {
        self.bundle
            .load()
            .as_ref()
            .map(|bundle| bundle.public_key.clone())
            .ok_or(SshCaError::NotConfigured)
    }

    pub fn is_configured(&self) -> bool {
        self.bundle.load().is_some()
    }

    /// The active bundle, held by the caller for the whole of one issuance.
    pub(crate) fn snapshot(&self) -> Result<Arc<CaBundle>> {
        self.bundle.load_full().ok_or(SshCaError::NotConfigured)
    }
}

impl fmt::Debug for CaKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaKeyStore")
            .field("bundle", &self.bundle.load_full())
            .finish_non_exhaustive()
    }
}
