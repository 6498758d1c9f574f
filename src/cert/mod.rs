pub mod extensions;
pub mod params;

use std::collections::BTreeMap;

use ssh_key::Certificate;
use ssh_key::public::KeyData;
use time::{Duration, OffsetDateTime};

use crate::error::{Result, SshCaError};
use crate::key::ParsedPublicKey;
use crate::role::CertificateType;
use crate::serial::SerialNumber;

/// A signed OpenSSH certificate.
///
/// Wraps [`ssh_key::Certificate`] with accessors in this crate's types and
/// a verification helper that checks the signature against a given CA key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    inner: Certificate,
}

impl From<Certificate> for SignedCertificate {
    fn from(inner: Certificate) -> Self {
        Self { inner }
    }
}

impl SignedCertificate {
    /// Parses a certificate in OpenSSH format (`<algorithm>-cert-v01@openssh.com <base64> [comment]`).
    pub fn from_openssh(text: &str) -> Result<Self> {
        Certificate::from_openssh(text.trim())
            .map(Self::from)
            .map_err(|e| SshCaError::InvalidKeyFormat(format!("unable to parse certificate: {e}")))
    }

    /// Parses a certificate in SSH wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Certificate::from_bytes(bytes)
            .map(Self::from)
            .map_err(|e| SshCaError::InvalidKeyFormat(format!("unable to parse certificate: {e}")))
    }

    /// Encodes the certificate as a single OpenSSH line, suitable for a
    /// `*-cert.pub` file.
    pub fn to_openssh(&self) -> Result<String> {
        self.inner
            .to_openssh()
            .map_err(|e| SshCaError::SigningFailure(format!("unable to encode certificate: {e}")))
    }

    /// Encodes the certificate in SSH wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.inner
            .to_bytes()
            .map_err(|e| SshCaError::SigningFailure(format!("unable to encode certificate: {e}")))
    }

    pub fn serial(&self) -> SerialNumber {
        self.inner.serial()
    }

    pub fn cert_type(&self) -> CertificateType {
        self.inner.cert_type().into()
    }

    pub fn key_id(&self) -> &str {
        self.inner.key_id()
    }

    pub fn principals(&self) -> &[String] {
        self.inner.valid_principals()
    }

    pub fn valid_after(&self) -> Result<OffsetDateTime> {
        from_unix(self.inner.valid_after())
    }

    pub fn valid_before(&self) -> Result<OffsetDateTime> {
        from_unix(self.inner.valid_before())
    }

    /// Length of the validity window.
    pub fn validity(&self) -> Duration {
        Duration::seconds(
            self.inner
                .valid_before()
                .saturating_sub(self.inner.valid_after()) as i64,
        )
    }

    pub fn critical_options(&self) -> &BTreeMap<String, String> {
        self.inner.critical_options()
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        self.inner.extensions()
    }

    /// The certified key.
    pub fn public_key(&self) -> &KeyData {
        self.inner.public_key()
    }

    /// The CA key that signed the certificate.
    pub fn signature_key(&self) -> &KeyData {
        self.inner.signature_key()
    }

    pub fn comment(&self) -> &str {
        self.inner.comment()
    }

    pub fn as_ssh_certificate(&self) -> &Certificate {
        &self.inner
    }

    /// Verifies the signature against `ca` and checks that the current time
    /// falls inside the validity window.
    pub fn verify(&self, ca: &ParsedPublicKey) -> Result<()> {
        self.verify_at(ca, OffsetDateTime::now_utc())
    }

    /// Verifies the signature against `ca` and checks that `at` falls inside
    /// the validity window.
    pub fn verify_at(&self, ca: &ParsedPublicKey, at: OffsetDateTime) -> Result<()> {
        let at = u64::try_from(at.unix_timestamp())
            .map_err(|_| SshCaError::VerificationFailed(format!("{at} is before the Unix epoch")))?;
        self.inner
            .validate_at(at, [&ca.fingerprint()])
            .map_err(|e| SshCaError::VerificationFailed(e.to_string()))
    }
}

fn from_unix(seconds: u64) -> Result<OffsetDateTime> {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
        .ok_or_else(|| SshCaError::InvalidKeyFormat(format!("timestamp {seconds} is out of range")))
}
