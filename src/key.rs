//! Structural validation of SSH key material.
//!
//! Validation here is purely structural and cryptographic: the key must
//! decode, the curve point must be on its curve, the RSA modulus must be a
//! sane size. Whether a key is *allowed* is a policy question answered by the
//! signing engine, never here.

use std::fmt;
use std::str::FromStr;

use rsa::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ssh_key::public::KeyData;
use ssh_key::{EcdsaCurve, Fingerprint, HashAlg, PrivateKey, PublicKey};

use crate::error::{Result, SshCaError};

/// Smallest RSA modulus accepted as structurally valid.
pub const RSA_MIN_BITS: usize = 1024;
/// Largest RSA modulus accepted as structurally valid.
pub const RSA_MAX_BITS: usize = 16384;

/// Supported key families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFamily {
    Rsa,
    Ed25519,
    Ecdsa,
}

impl KeyFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFamily::Rsa => "rsa",
            KeyFamily::Ed25519 => "ed25519",
            KeyFamily::Ecdsa => "ecdsa",
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFamily {
    type Err = SshCaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" | "ssh-rsa" => Ok(KeyFamily::Rsa),
            "ed25519" | "ssh-ed25519" => Ok(KeyFamily::Ed25519),
            "ecdsa" => Ok(KeyFamily::Ecdsa),
            other => Err(SshCaError::InvalidKeyFormat(format!(
                "unknown key family \"{other}\""
            ))),
        }
    }
}

/// A public key that passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPublicKey {
    key: PublicKey,
    family: KeyFamily,
    bits: u32,
}

impl ParsedPublicKey {
    /// Key family.
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Key size in bits: RSA modulus size, ECDSA curve size, 256 for Ed25519.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn key_data(&self) -> &KeyData {
        self.key.key_data()
    }

    pub fn as_ssh_key(&self) -> &PublicKey {
        &self.key
    }

    pub fn comment(&self) -> &str {
        self.key.comment()
    }

    /// SHA-256 fingerprint, as printed by `ssh-keygen -l`.
    pub fn fingerprint(&self) -> Fingerprint {
        self.key.fingerprint(HashAlg::Sha256)
    }

    /// Lowercase hex SHA-256 of the key's wire encoding.
    pub fn sha256_hex(&self) -> Result<String> {
        let digest = Sha256::digest(self.to_bytes()?);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Encodes the key as an OpenSSH `authorized_keys` line.
    pub fn to_openssh(&self) -> Result<String> {
        self.key
            .to_openssh()
            .map_err(|e| SshCaError::InvalidKeyFormat(e.to_string()))
    }

    /// Encodes the key in SSH wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.key
            .to_bytes()
            .map_err(|e| SshCaError::InvalidKeyFormat(e.to_string()))
    }
}

/// A private key that passed structural validation.
///
/// Deliberately has no accessor that hands the key material out of the crate
/// and a `Debug` impl that prints only the public half.
#[derive(Clone)]
pub struct ParsedPrivateKey {
    key: PrivateKey,
    public: ParsedPublicKey,
}

impl ParsedPrivateKey {
    pub fn family(&self) -> KeyFamily {
        self.public.family
    }

    pub fn bits(&self) -> u32 {
        self.public.bits
    }

    /// The public half embedded in the private key file.
    pub fn public_key(&self) -> &ParsedPublicKey {
        &self.public
    }

    pub(crate) fn signing_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl fmt::Debug for ParsedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedPrivateKey")
            .field("family", &self.public.family)
            .field("bits", &self.public.bits)
            .field("fingerprint", &self.public.fingerprint().to_string())
            .finish_non_exhaustive()
    }
}

/// Parses and structurally validates an SSH public key.
///
/// Accepts either an OpenSSH `authorized_keys` line (`<algorithm> <base64> [comment]`)
/// or the raw SSH wire encoding of the key.
pub fn validate_public_key(raw: &[u8]) -> Result<ParsedPublicKey> {
    if raw.is_empty() {
        return Err(SshCaError::InvalidKeyFormat("empty public key".to_string()));
    }

    let key = match std::str::from_utf8(raw) {
        Ok(text) if !text.starts_with('\0') => PublicKey::from_openssh(text.trim()),
        _ => PublicKey::from_bytes(raw),
    }
    .map_err(|e| SshCaError::InvalidKeyFormat(format!("unable to parse public key: {e}")))?;

    let (family, bits) = inspect_key_data(key.key_data())?;
    Ok(ParsedPublicKey { key, family, bits })
}

/// Parses and structurally validates an OpenSSH private key.
///
/// Passphrase-protected keys are rejected: the CA has to be able to sign
/// without interaction.
pub fn validate_private_key(raw: &[u8]) -> Result<ParsedPrivateKey> {
    let key = PrivateKey::from_openssh(raw).map_err(|e| {
        SshCaError::InvalidKeyFormat(format!("unable to parse private key: {e}"))
    })?;

    if key.is_encrypted() {
        return Err(SshCaError::InvalidKeyFormat(
            "private key is encrypted".to_string(),
        ));
    }

    let (family, bits) = inspect_key_data(key.public_key().key_data())?;
    let public = ParsedPublicKey {
        key: key.public_key().clone(),
        family,
        bits,
    };
    Ok(ParsedPrivateKey { key, public })
}

fn inspect_key_data(data: &KeyData) -> Result<(KeyFamily, u32)> {
    match data {
        KeyData::Ed25519(key) => {
            let point = ed25519_dalek::VerifyingKey::from_bytes(&key.0).map_err(|_| {
                SshCaError::InvalidKeyFormat("Ed25519 point does not decompress".to_string())
            })?;
            if point.is_weak() {
                return Err(SshCaError::InvalidKeyFormat(
                    "Ed25519 key has small order".to_string(),
                ));
            }
            Ok((KeyFamily::Ed25519, 256))
        }
        KeyData::Ecdsa(key) => {
            let sec1 = key.as_sec1_bytes();
            let bits = match key.curve() {
                EcdsaCurve::NistP256 => p256::PublicKey::from_sec1_bytes(sec1).map(|_| 256),
                EcdsaCurve::NistP384 => p384::PublicKey::from_sec1_bytes(sec1).map(|_| 384),
                EcdsaCurve::NistP521 => p521::PublicKey::from_sec1_bytes(sec1).map(|_| 521),
            }
            .map_err(|_| {
                SshCaError::InvalidKeyFormat(format!("{} point is not on the curve", key.curve()))
            })?;
            Ok((KeyFamily::Ecdsa, bits))
        }
        KeyData::Rsa(key) => {
            let n = key.n.as_positive_bytes().ok_or_else(|| {
                SshCaError::InvalidKeyFormat("RSA modulus is not positive".to_string())
            })?;
            let e = key.e.as_positive_bytes().ok_or_else(|| {
                SshCaError::InvalidKeyFormat("RSA exponent is not positive".to_string())
            })?;
            if n.last().is_none_or(|b| b & 1 == 0) {
                return Err(SshCaError::InvalidKeyFormat(
                    "RSA modulus is even".to_string(),
                ));
            }

            let n = BigUint::from_bytes_be(n);
            let e = BigUint::from_bytes_be(e);
            let bits = n.bits();
            if bits < RSA_MIN_BITS {
                return Err(SshCaError::InvalidKeyFormat(format!(
                    "RSA modulus of {bits} bits is below {RSA_MIN_BITS}"
                )));
            }
            rsa::RsaPublicKey::new_with_max_size(n, e, RSA_MAX_BITS)
                .map_err(|e| SshCaError::InvalidKeyFormat(format!("RSA: {e}")))?;
            Ok((KeyFamily::Rsa, bits as u32))
        }
        other => Err(SshCaError::InvalidKeyFormat(format!(
            "unsupported key algorithm {}",
            other.algorithm()
        ))),
    }
}
