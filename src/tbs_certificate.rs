use std::collections::BTreeMap;

use rand_core::CryptoRngCore;
use ssh_key::certificate::Builder;
use time::{Duration, OffsetDateTime};

use crate::error::{Result, SshCaError};
use crate::key::ParsedPublicKey;
use crate::role::CertificateType;
use crate::serial::SerialNumber;

/// Represents the "To Be Signed" (TBS) portion of an OpenSSH certificate.
/// Every field is already resolved against a role; signing adds only the
/// nonce, the CA key and the signature.
///
/// # Fields
/// * `serial_number` - Serial unique under the active CA bundle.
/// * `cert_type` - User or host certificate.
/// * `subject_public_key` - The key being certified.
/// * `key_id` - Free-form identifier, logged by `sshd` on use.
/// * `principals` - User names or host names the certificate is valid for.
/// * `valid_after` - Start of the validity window.
/// * `valid_before` - End of the validity window.
/// * `critical_options` - Options a verifier must understand.
/// * `extensions` - Options a verifier may ignore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbsCertificate {
    pub serial_number: SerialNumber,
    pub cert_type: CertificateType,
    pub subject_public_key: ParsedPublicKey,
    pub key_id: String,
    pub principals: Vec<String>,
    pub valid_after: OffsetDateTime,
    pub valid_before: OffsetDateTime,
    pub critical_options: BTreeMap<String, String>,
    pub extensions: BTreeMap<String, String>,
}

impl TbsCertificate {
    /// Length of the validity window.
    pub fn validity(&self) -> Duration {
        self.valid_before - self.valid_after
    }

    /// Converts the `TbsCertificate` into an `ssh_key` certificate builder
    /// with a fresh random nonce.
    ///
    /// The certificate comment carries the comment of the submitted key.
    pub fn to_builder(&self, rng: &mut impl CryptoRngCore) -> Result<Builder> {
        if self.principals.is_empty() {
            // An empty principal list is valid for any principal.
            return Err(SshCaError::SigningFailure(
                "refusing to sign a certificate without principals".to_string(),
            ));
        }

        let mut builder = Builder::new_with_random_nonce(
            rng,
            self.subject_public_key.key_data().clone(),
            unix_seconds(self.valid_after)?,
            unix_seconds(self.valid_before)?,
        )
        .map_err(builder_error)?;

        builder
            .serial(self.serial_number)
            .and_then(|b| b.cert_type(self.cert_type.into()))
            .and_then(|b| b.key_id(self.key_id.as_str()))
            .map_err(builder_error)?;
        for principal in &self.principals {
            builder
                .valid_principal(principal.as_str())
                .map_err(builder_error)?;
        }
        for (name, value) in &self.critical_options {
            builder
                .critical_option(name.as_str(), value.as_str())
                .map_err(builder_error)?;
        }
        for (name, value) in &self.extensions {
            builder
                .extension(name.as_str(), value.as_str())
                .map_err(builder_error)?;
        }
        if !self.subject_public_key.comment().is_empty() {
            builder
                .comment(self.subject_public_key.comment())
                .map_err(builder_error)?;
        }
        Ok(builder)
    }
}

fn unix_seconds(at: OffsetDateTime) -> Result<u64> {
    u64::try_from(at.unix_timestamp()).map_err(|_| {
        SshCaError::SigningFailure(format!("{at} is before the Unix epoch"))
    })
}

fn builder_error(err: ssh_key::Error) -> SshCaError {
    SshCaError::SigningFailure(format!("unable to build certificate: {err}"))
}
