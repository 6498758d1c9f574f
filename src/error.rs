//! use sshca::error::SshCaError;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SshCaError>;

/// Represents errors that can occur while configuring the CA or issuing certificates.
///
/// Every variant is a distinct kind so callers can tell "fix your request"
/// apart from "the system is broken". None of the messages carry private key
/// material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SshCaError {
    /// Key bytes that do not parse as a supported SSH key.
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// The named role does not exist.
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// The submitted key's family or size is not permitted by the role.
    #[error("Key type not allowed: {0}")]
    KeyTypeNotAllowed(String),

    /// A requested principal is outside the role's allowed set.
    #[error("Principal not allowed: {0}")]
    PrincipalNotAllowed(String),

    /// The requested TTL is outside the role's bounds.
    #[error("TTL out of bounds: {0}")]
    TtlOutOfBounds(String),

    /// A requested critical option or extension is outside the role's allowed set.
    #[error("Extension not allowed: {0}")]
    ExtensionNotAllowed(String),

    /// No CA bundle has been configured.
    #[error("CA is not configured")]
    NotConfigured,

    /// The cryptographic signing operation failed.
    #[error("Signing failure: {0}")]
    SigningFailure(String),

    /// The storage collaborator failed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// An administrative role write violates the policy invariants.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A certificate failed signature or validity verification.
    #[error("Certificate verification failed: {0}")]
    VerificationFailed(String),
}

/// Payload-free discriminant of [`SshCaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKeyFormat,
    RoleNotFound,
    KeyTypeNotAllowed,
    PrincipalNotAllowed,
    TtlOutOfBounds,
    ExtensionNotAllowed,
    NotConfigured,
    SigningFailure,
    StorageFailure,
    InvalidRole,
    InvalidConfig,
    VerificationFailed,
}

impl SshCaError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SshCaError::InvalidKeyFormat(_) => ErrorKind::InvalidKeyFormat,
            SshCaError::RoleNotFound(_) => ErrorKind::RoleNotFound,
            SshCaError::KeyTypeNotAllowed(_) => ErrorKind::KeyTypeNotAllowed,
            SshCaError::PrincipalNotAllowed(_) => ErrorKind::PrincipalNotAllowed,
            SshCaError::TtlOutOfBounds(_) => ErrorKind::TtlOutOfBounds,
            SshCaError::ExtensionNotAllowed(_) => ErrorKind::ExtensionNotAllowed,
            SshCaError::NotConfigured => ErrorKind::NotConfigured,
            SshCaError::SigningFailure(_) => ErrorKind::SigningFailure,
            SshCaError::StorageFailure(_) => ErrorKind::StorageFailure,
            SshCaError::InvalidRole(_) => ErrorKind::InvalidRole,
            SshCaError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            SshCaError::VerificationFailed(_) => ErrorKind::VerificationFailed,
        }
    }

    /// Whether retrying the same call unchanged may succeed.
    ///
    /// Policy violations and malformed input are permanent; only server-side
    /// faults are worth a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SshCaError::SigningFailure(_) | SshCaError::StorageFailure(_)
        )
    }

    /// Whether the error is a policy violation the caller can fix by changing the request.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::KeyTypeNotAllowed
                | ErrorKind::PrincipalNotAllowed
                | ErrorKind::TtlOutOfBounds
                | ErrorKind::ExtensionNotAllowed
        )
    }
}

impl From<serde_json::Error> for SshCaError {
    /// Stored records that fail to (de)serialize are a storage-side fault.
    fn from(err: serde_json::Error) -> Self {
        SshCaError::StorageFailure(err.to_string())
    }
}

impl From<toml::de::Error> for SshCaError {
    fn from(err: toml::de::Error) -> Self {
        SshCaError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_faults_are_retryable() {
        assert!(SshCaError::SigningFailure("boom".into()).is_retryable());
        assert!(SshCaError::StorageFailure("disk".into()).is_retryable());
        assert!(!SshCaError::NotConfigured.is_retryable());
        assert!(!SshCaError::PrincipalNotAllowed("carol".into()).is_retryable());
        assert!(!SshCaError::InvalidKeyFormat("short".into()).is_retryable());
    }

    #[test]
    fn test_policy_violation_kinds() {
        assert!(SshCaError::TtlOutOfBounds("48h".into()).is_policy_violation());
        assert!(SshCaError::ExtensionNotAllowed("x".into()).is_policy_violation());
        assert!(!SshCaError::RoleNotFound("r".into()).is_policy_violation());
        assert_eq!(SshCaError::NotConfigured.kind(), ErrorKind::NotConfigured);
    }
}
