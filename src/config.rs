use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SshCaError};

/// Default backdating of `valid_after`, tolerating verifier clock drift.
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 30;

/// Default key id template.
pub const DEFAULT_KEY_ID_FORMAT: &str = "{{role_name}}-{{public_key_hash}}";

/// Largest accepted clock skew.
pub const MAX_CLOCK_SKEW_SECS: u64 = 3600;

/// Default number of serials reserved in storage at a time.
pub const DEFAULT_SERIAL_RESERVATION_BLOCK: u64 = 1024;

/// Settings of the certificate authority.
///
/// Loadable from TOML; every field has a default:
///
/// ```toml
/// clock_skew_secs = 30
/// key_id_format = "{{role_name}}-{{public_key_hash}}"
/// serial_reservation_block = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorityConfig {
    /// Seconds subtracted from the issuance instant to form `valid_after`.
    #[builder(default = DEFAULT_CLOCK_SKEW_SECS)]
    pub clock_skew_secs: u64,

    /// Template for the certificate key id. Recognised placeholders are
    /// `{{role_name}}`, `{{public_key_hash}}`, `{{serial}}` and `{{key_type}}`.
    #[builder(default = DEFAULT_KEY_ID_FORMAT.to_string(), into)]
    pub key_id_format: String,

    /// Serials reserved in storage per write.
    #[builder(default = DEFAULT_SERIAL_RESERVATION_BLOCK)]
    pub serial_reservation_block: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuthorityConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: AuthorityConfig = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(SshCaError::InvalidConfig(format!(
                "clock_skew_secs must not exceed {MAX_CLOCK_SKEW_SECS}"
            )));
        }
        if self.serial_reservation_block == 0 {
            return Err(SshCaError::InvalidConfig(
                "serial_reservation_block must be at least 1".to_string(),
            ));
        }
        validate_key_id_format(&self.key_id_format)
            .map_err(|e| SshCaError::InvalidConfig(format!("key_id_format: {e}")))
    }
}

/// Placeholders a key id template may use.
pub const KEY_ID_PLACEHOLDERS: [&str; 4] = [
    "{{role_name}}",
    "{{public_key_hash}}",
    "{{serial}}",
    "{{key_type}}",
];

/// Checks a key id template, returning the reason it is unusable.
pub(crate) fn validate_key_id_format(format: &str) -> std::result::Result<(), String> {
    if format.trim().is_empty() {
        return Err("template is empty".to_string());
    }
    let mut rest = format.to_string();
    for placeholder in KEY_ID_PLACEHOLDERS {
        rest = rest.replace(placeholder, "");
    }
    if rest.contains("{{") || rest.contains("}}") {
        return Err(format!("unknown placeholder in \"{format}\""));
    }
    Ok(())
}
