//! The signing engine: policy enforcement and certificate construction.
//!
//! One call to [`SigningEngine::issue`] evaluates a request against a single
//! snapshot of the CA bundle and a single version of the role. Nothing is
//! signed unless every check passes.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use crate::cert::SignedCertificate;
use crate::cert::params::CertificateRequest;
use crate::config::AuthorityConfig;
use crate::error::{Result, SshCaError};
use crate::issuer::{CaKeyStore, Issuer};
use crate::key::{ParsedPublicKey, validate_public_key};
use crate::role::RolePolicy;
use crate::role::store::RoleStore;
use crate::serial::SerialNumber;
use crate::tbs_certificate::TbsCertificate;

/// Turns certificate requests into signed certificates.
pub struct SigningEngine {
    roles: RoleStore,
    ca: Arc<CaKeyStore>,
    config: AuthorityConfig,
}

impl SigningEngine {
    pub fn new(roles: RoleStore, ca: Arc<CaKeyStore>, config: AuthorityConfig) -> Self {
        Self { roles, ca, config }
    }

    /// Issues a certificate.
    ///
    /// Fails with [`SshCaError::NotConfigured`] before looking at the request
    /// when no CA bundle is installed.
    pub fn issue(&self, request: &CertificateRequest) -> Result<SignedCertificate> {
        let bundle = self.ca.snapshot().inspect_err(|_| {
            debug!(role = %request.role, "issuance refused: CA is not configured");
        })?;
        self.issue_with(bundle.as_ref(), request)
    }

    pub(crate) fn issue_with<I: Issuer>(
        &self,
        issuer: &I,
        request: &CertificateRequest,
    ) -> Result<SignedCertificate> {
        self.evaluate(issuer, request).inspect_err(|e| {
            debug!(role = %request.role, kind = ?e.kind(), error = %e, "issuance rejected");
        })
    }

    fn evaluate<I: Issuer>(
        &self,
        issuer: &I,
        request: &CertificateRequest,
    ) -> Result<SignedCertificate> {
        let role = self.roles.get(&request.role)?;
        let key = validate_public_key(&request.public_key)?;
        role.check_key(&key)?;

        let principals = role.resolve_principals(request.principals.as_deref())?;
        let ttl = role.resolve_ttl(request.ttl)?;
        let critical_options = role.resolve_critical_options(request.critical_options.as_ref())?;
        let extensions = role.resolve_extensions(request.extensions.as_ref())?;
        if request.key_id.is_some() && !role.allow_user_key_ids {
            return Err(SshCaError::ExtensionNotAllowed(format!(
                "role \"{}\" does not accept a requested key id",
                role.name
            )));
        }

        let (valid_after, valid_before) = self.validity_window(ttl)?;

        // Every check has passed; only now is a serial spent.
        let serial = issuer.next_serial()?;
        let key_id = match &request.key_id {
            Some(key_id) => key_id.clone(),
            None => render_key_id(self.key_id_format(&role), &role, &key, serial)?,
        };

        let tbs = TbsCertificate {
            serial_number: serial,
            cert_type: role.cert_type,
            subject_public_key: key,
            key_id,
            principals,
            valid_after,
            valid_before,
            critical_options,
            extensions,
        };
        let certificate = issuer.sign(&tbs)?;

        info!(
            role = %role.name,
            role_version = role.version,
            serial,
            cert_type = ?tbs.cert_type,
            key_id = %tbs.key_id,
            principals = ?tbs.principals,
            valid_after = %tbs.valid_after,
            ttl_secs = ttl.whole_seconds(),
            subject = %tbs.subject_public_key.fingerprint(),
            ca = %issuer.ca_public_key().fingerprint(),
            "issued certificate"
        );
        Ok(certificate)
    }

    fn key_id_format<'a>(&'a self, role: &'a RolePolicy) -> &'a str {
        role.key_id_format
            .as_deref()
            .unwrap_or(&self.config.key_id_format)
    }

    /// `valid_after` is backdated by the clock skew; the window is exactly
    /// `ttl` long.
    fn validity_window(&self, ttl: Duration) -> Result<(OffsetDateTime, OffsetDateTime)> {
        let now = OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp())
            .map_err(|e| SshCaError::SigningFailure(e.to_string()))?;
        let valid_after = i64::try_from(self.config.clock_skew_secs)
            .ok()
            .and_then(|secs| now.checked_sub(Duration::seconds(secs)))
            .filter(|at| *at >= OffsetDateTime::UNIX_EPOCH)
            .ok_or_else(|| {
                SshCaError::InvalidConfig(format!(
                    "clock_skew_secs {} reaches before the Unix epoch",
                    self.config.clock_skew_secs
                ))
            })?;
        let valid_before = valid_after
            .checked_add(ttl)
            .ok_or_else(|| SshCaError::TtlOutOfBounds("validity window overflows".to_string()))?;
        Ok((valid_after, valid_before))
    }
}

fn render_key_id(
    format: &str,
    role: &RolePolicy,
    key: &ParsedPublicKey,
    serial: SerialNumber,
) -> Result<String> {
    Ok(format
        .replace("{{role_name}}", &role.name)
        .replace("{{public_key_hash}}", &key.sha256_hex()?)
        .replace("{{serial}}", &serial.to_string())
        .replace("{{key_type}}", key.family().as_str()))
}
