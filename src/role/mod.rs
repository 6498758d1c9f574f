//! Role policies: named, versioned issuance constraints.
//!
//! A role is validated once, when it is written, so every reader can assume
//! a well-formed policy. The `resolve_*` and `check_*` methods are the
//! per-request enforcement the signing engine runs against a snapshot of the
//! role.

pub mod store;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use bon::Builder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use ssh_key::certificate::CertType;
use time::Duration;

use crate::cert::extensions::{OptionKind, check_option_value};
use crate::error::{Result, SshCaError};
use crate::key::{KeyFamily, ParsedPublicKey};

static ROLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static regex"));

/// Certificate type a role issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    #[default]
    User,
    Host,
}

impl From<CertificateType> for CertType {
    fn from(value: CertificateType) -> Self {
        match value {
            CertificateType::User => CertType::User,
            CertificateType::Host => CertType::Host,
        }
    }
}

impl From<CertType> for CertificateType {
    fn from(value: CertType) -> Self {
        match value {
            CertType::User => CertificateType::User,
            CertType::Host => CertificateType::Host,
        }
    }
}

/// Size constraint for one key family. `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl KeyBits {
    /// Any size the validator accepts.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn at_least(min: u32) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: u32) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn permits(&self, bits: u32) -> bool {
        self.min.is_none_or(|min| bits >= min) && self.max.is_none_or(|max| bits <= max)
    }
}

/// TTL bounds of a role, satisfying `0 < min <= default <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlBounds {
    #[serde(with = "duration_secs")]
    pub min: Duration,
    #[serde(with = "duration_secs")]
    pub default: Duration,
    #[serde(with = "duration_secs")]
    pub max: Duration,
}

impl TtlBounds {
    pub fn new(min: Duration, default: Duration, max: Duration) -> Result<Self> {
        let bounds = Self { min, default, max };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min <= Duration::ZERO || self.min > self.default || self.default > self.max {
            return Err(SshCaError::InvalidRole(format!(
                "TTL bounds must satisfy 0 < min <= default <= max (got {}s, {}s, {}s)",
                self.min.whole_seconds(),
                self.default.whole_seconds(),
                self.max.whole_seconds()
            )));
        }
        Ok(())
    }

    pub fn contains(&self, ttl: Duration) -> bool {
        self.min <= ttl && ttl <= self.max
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.whole_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::seconds)
    }
}

/// Names or `*` glob patterns a role permits.
///
/// An empty list permits nothing. `*` on its own permits any name. Patterns
/// are compiled once, when the list is built or deserialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AllowList {
    entries: Vec<String>,
    patterns: Vec<Regex>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from(entries.into_iter().map(Into::into).collect::<Vec<String>>())
    }

    pub fn any() -> Self {
        Self::new(["*"])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Whether any entry is a glob pattern rather than a literal name.
    pub fn has_patterns(&self) -> bool {
        self.entries.iter().any(|e| e.contains('*'))
    }

    pub fn permits(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| !entry.contains('*') && entry == name)
            || self.patterns.iter().any(|re| re.is_match(name))
    }

    fn validate(&self, field: &str) -> Result<()> {
        for entry in &self.entries {
            if entry.is_empty() || entry.contains(',') || entry.chars().any(char::is_whitespace) {
                return Err(SshCaError::InvalidRole(format!(
                    "{field}: \"{entry}\" is not a valid name or pattern"
                )));
            }
            if entry.contains('*') {
                glob_to_regex(entry).map_err(|e| {
                    SshCaError::InvalidRole(format!("{field}: pattern \"{entry}\": {e}"))
                })?;
            }
        }
        Ok(())
    }
}

impl From<Vec<String>> for AllowList {
    /// Patterns that fail to compile permit nothing; `validate` reports them.
    fn from(entries: Vec<String>) -> Self {
        let patterns = entries
            .iter()
            .filter(|entry| entry.contains('*'))
            .filter_map(|entry| glob_to_regex(entry).ok())
            .collect();
        Self { entries, patterns }
    }
}

impl From<AllowList> for Vec<String> {
    fn from(list: AllowList) -> Self {
        list.entries
    }
}

impl PartialEq for AllowList {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for AllowList {}

fn glob_to_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".+");
    Regex::new(&format!("^{body}$"))
}

/// A named issuance policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct RolePolicy {
    #[builder(into)]
    pub name: String,

    /// Bumped by the role store on every write.
    #[serde(default)]
    #[builder(default)]
    pub version: u64,

    #[serde(default)]
    #[builder(default)]
    pub cert_type: CertificateType,

    /// Key families the role accepts, with per-family size limits.
    pub allowed_key_types: BTreeMap<KeyFamily, KeyBits>,

    pub allowed_principals: AllowList,

    /// Principals used when a request names none. Falls back to the literal
    /// entries of `allowed_principals` when empty.
    #[serde(default)]
    #[builder(default)]
    pub default_principals: Vec<String>,

    pub ttl: TtlBounds,

    #[serde(default)]
    #[builder(default)]
    pub allowed_critical_options: AllowList,

    #[serde(default)]
    #[builder(default)]
    pub allowed_extensions: AllowList,

    #[serde(default)]
    #[builder(default)]
    pub default_critical_options: BTreeMap<String, String>,

    #[serde(default)]
    #[builder(default)]
    pub default_extensions: BTreeMap<String, String>,

    /// Overrides the authority-wide key id template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub key_id_format: Option<String>,

    /// Lets a request supply its own key id.
    #[serde(default)]
    #[builder(default)]
    pub allow_user_key_ids: bool,
}

impl RolePolicy {
    /// Checks the write-time invariants of a role.
    pub fn validate(&self) -> Result<()> {
        if !ROLE_NAME.is_match(&self.name) {
            return Err(SshCaError::InvalidRole(format!(
                "\"{}\" is not a valid role name",
                self.name
            )));
        }

        self.ttl.validate()?;

        if self.allowed_key_types.is_empty() {
            return Err(SshCaError::InvalidRole(
                "allowed_key_types must not be empty".to_string(),
            ));
        }
        for (family, bits) in &self.allowed_key_types {
            if let (Some(min), Some(max)) = (bits.min, bits.max) {
                if min > max {
                    return Err(SshCaError::InvalidRole(format!(
                        "{family}: min bits {min} exceed max bits {max}"
                    )));
                }
            }
        }

        self.allowed_principals.validate("allowed_principals")?;
        self.allowed_critical_options
            .validate("allowed_critical_options")?;
        self.allowed_extensions.validate("allowed_extensions")?;

        for principal in &self.default_principals {
            if principal.contains('*') || !self.allowed_principals.permits(principal) {
                return Err(SshCaError::InvalidRole(format!(
                    "default principal \"{principal}\" is not allowed by the role"
                )));
            }
        }

        for (kind, defaults, allowed) in [
            (
                OptionKind::CriticalOption,
                &self.default_critical_options,
                &self.allowed_critical_options,
            ),
            (
                OptionKind::Extension,
                &self.default_extensions,
                &self.allowed_extensions,
            ),
        ] {
            for (name, value) in defaults {
                if !allowed.permits(name) {
                    return Err(SshCaError::InvalidRole(format!(
                        "default {kind} \"{name}\" is not allowed by the role"
                    )));
                }
                check_option_value(kind, name, value)
                    .map_err(|e| SshCaError::InvalidRole(e.to_string()))?;
            }
        }

        if let Some(format) = &self.key_id_format {
            crate::config::validate_key_id_format(format)
                .map_err(|e| SshCaError::InvalidRole(format!("key_id_format: {e}")))?;
        }

        Ok(())
    }

    /// Rejects keys whose family or size the role does not allow.
    pub fn check_key(&self, key: &ParsedPublicKey) -> Result<()> {
        let bits = self.allowed_key_types.get(&key.family()).ok_or_else(|| {
            SshCaError::KeyTypeNotAllowed(format!(
                "role \"{}\" does not accept {} keys",
                self.name,
                key.family()
            ))
        })?;
        if !bits.permits(key.bits()) {
            return Err(SshCaError::KeyTypeNotAllowed(format!(
                "{}-bit {} keys are outside the role's size limits",
                key.bits(),
                key.family()
            )));
        }
        Ok(())
    }

    /// Resolves the principals a certificate is issued for.
    ///
    /// An omitted or empty request takes the role's default; a wildcard role
    /// without explicit defaults refuses to guess.
    pub fn resolve_principals(&self, requested: Option<&[String]>) -> Result<Vec<String>> {
        let requested = requested.filter(|p| !p.is_empty());
        let Some(requested) = requested else {
            if !self.default_principals.is_empty() {
                return Ok(self.default_principals.clone());
            }
            if self.allowed_principals.is_empty() || self.allowed_principals.has_patterns() {
                return Err(SshCaError::PrincipalNotAllowed(format!(
                    "role \"{}\" has no default principals; name them explicitly",
                    self.name
                )));
            }
            return Ok(self.allowed_principals.entries().to_vec());
        };

        let mut principals: Vec<String> = Vec::with_capacity(requested.len());
        for principal in requested {
            if principal.is_empty() || !self.allowed_principals.permits(principal) {
                return Err(SshCaError::PrincipalNotAllowed(principal.clone()));
            }
            if !principals.contains(principal) {
                principals.push(principal.clone());
            }
        }
        Ok(principals)
    }

    /// Resolves the certificate lifetime.
    pub fn resolve_ttl(&self, requested: Option<Duration>) -> Result<Duration> {
        match requested {
            None => Ok(self.ttl.default),
            Some(ttl) if self.ttl.contains(ttl) => Ok(ttl),
            Some(ttl) => Err(SshCaError::TtlOutOfBounds(format!(
                "{}s is outside [{}s, {}s]",
                ttl.whole_seconds(),
                self.ttl.min.whole_seconds(),
                self.ttl.max.whole_seconds()
            ))),
        }
    }

    pub fn resolve_critical_options(
        &self,
        requested: Option<&BTreeMap<String, String>>,
    ) -> Result<BTreeMap<String, String>> {
        resolve_options(
            OptionKind::CriticalOption,
            requested,
            &self.allowed_critical_options,
            &self.default_critical_options,
        )
    }

    pub fn resolve_extensions(
        &self,
        requested: Option<&BTreeMap<String, String>>,
    ) -> Result<BTreeMap<String, String>> {
        resolve_options(
            OptionKind::Extension,
            requested,
            &self.allowed_extensions,
            &self.default_extensions,
        )
    }
}

fn resolve_options(
    kind: OptionKind,
    requested: Option<&BTreeMap<String, String>>,
    allowed: &AllowList,
    defaults: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let Some(requested) = requested else {
        return Ok(defaults.clone());
    };
    for (name, value) in requested {
        if !allowed.permits(name) {
            return Err(SshCaError::ExtensionNotAllowed(format!("{kind} \"{name}\"")));
        }
        check_option_value(kind, name, value)?;
    }
    Ok(requested.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::validate_public_key;

    fn r1() -> RolePolicy {
        RolePolicy::builder()
            .name("r1")
            .allowed_key_types(BTreeMap::from([(KeyFamily::Ed25519, KeyBits::any())]))
            .allowed_principals(AllowList::new(["alice", "bob"]))
            .ttl(TtlBounds::new(Duration::hours(1), Duration::hours(12), Duration::hours(24)).unwrap())
            .build()
    }

    #[test]
    fn test_ttl_bounds_invariant() {
        let h = Duration::hours;
        assert!(TtlBounds::new(h(1), h(12), h(24)).is_ok());
        assert!(TtlBounds::new(h(1), h(1), h(1)).is_ok());
        assert!(TtlBounds::new(Duration::ZERO, h(1), h(2)).is_err());
        assert!(TtlBounds::new(h(2), h(1), h(3)).is_err());
        assert!(TtlBounds::new(h(1), h(4), h(3)).is_err());
    }

    #[test]
    fn test_role_validation() {
        r1().validate().unwrap();

        let mut role = r1();
        role.allowed_key_types.clear();
        assert!(matches!(role.validate(), Err(SshCaError::InvalidRole(_))));

        let mut role = r1();
        role.name = "../etc".to_string();
        assert!(role.validate().is_err());

        let mut role = r1();
        role.default_principals = vec!["carol".to_string()];
        assert!(role.validate().is_err());

        let mut role = r1();
        role.default_extensions = BTreeMap::from([("permit-pty".to_string(), String::new())]);
        assert!(role.validate().is_err());
        role.allowed_extensions = AllowList::new(["permit-pty"]);
        role.validate().unwrap();

        let mut role = r1();
        role.allowed_key_types
            .insert(KeyFamily::Rsa, KeyBits { min: Some(4096), max: Some(2048) });
        assert!(role.validate().is_err());
    }

    #[test]
    fn test_principal_resolution() {
        let role = r1();
        assert_eq!(role.resolve_principals(None).unwrap(), vec!["alice", "bob"]);
        assert_eq!(
            role.resolve_principals(Some(&["alice".to_string()])).unwrap(),
            vec!["alice"]
        );
        assert_eq!(
            role.resolve_principals(Some(&["carol".to_string()])),
            Err(SshCaError::PrincipalNotAllowed("carol".to_string()))
        );
    }

    #[test]
    fn test_wildcard_principals() {
        let mut role = r1();
        role.cert_type = CertificateType::Host;
        role.allowed_principals = AllowList::new(["*.example.com"]);
        role.validate().unwrap();

        assert!(role
            .resolve_principals(Some(&["web1.example.com".to_string()]))
            .is_ok());
        assert!(role
            .resolve_principals(Some(&["example.com".to_string()]))
            .is_err());
        assert!(role
            .resolve_principals(Some(&["web1.example.com.evil".to_string()]))
            .is_err());
        assert!(matches!(
            role.resolve_principals(None),
            Err(SshCaError::PrincipalNotAllowed(_))
        ));
    }

    #[test]
    fn test_allow_list_patterns_survive_json() {
        let list = AllowList::new(["deploy", "web-*"]);
        let decoded: AllowList =
            serde_json::from_str(&serde_json::to_string(&list).unwrap()).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(decoded.entries().to_vec(), vec!["deploy", "web-*"]);
        assert!(decoded.permits("deploy"));
        assert!(decoded.permits("web-01"));
        assert!(!decoded.permits("web-"));
        assert!(!decoded.permits("db-01"));
        assert!(AllowList::any().permits("anyone"));
        assert!(!AllowList::default().permits("anyone"));
    }

    #[test]
    fn test_ttl_resolution() {
        let role = r1();
        assert_eq!(role.resolve_ttl(None).unwrap(), Duration::hours(12));
        assert_eq!(role.resolve_ttl(Some(Duration::hours(1))).unwrap(), Duration::hours(1));
        assert!(matches!(
            role.resolve_ttl(Some(Duration::hours(48))),
            Err(SshCaError::TtlOutOfBounds(_))
        ));
        assert!(role.resolve_ttl(Some(Duration::minutes(59))).is_err());
    }

    #[test]
    fn test_option_resolution() {
        let mut role = r1();
        role.allowed_extensions = AllowList::new(["permit-pty", "permit-port-forwarding"]);
        role.default_extensions = BTreeMap::from([("permit-pty".to_string(), String::new())]);

        assert_eq!(role.resolve_extensions(None).unwrap().len(), 1);

        let requested =
            BTreeMap::from([("permit-X11-forwarding".to_string(), String::new())]);
        assert!(matches!(
            role.resolve_extensions(Some(&requested)),
            Err(SshCaError::ExtensionNotAllowed(_))
        ));

        let requested = BTreeMap::from([("force-command".to_string(), "/bin/true".to_string())]);
        assert!(role.resolve_critical_options(Some(&requested)).is_err());
        assert!(role.resolve_critical_options(None).unwrap().is_empty());
    }

    #[test]
    fn test_key_checks() {
        let role = r1();
        let ed = validate_public_key(include_bytes!("../../tests/fixtures/user_ed25519.pub")).unwrap();
        let rsa = validate_public_key(include_bytes!("../../tests/fixtures/user_rsa_2048.pub")).unwrap();
        role.check_key(&ed).unwrap();
        assert!(matches!(role.check_key(&rsa), Err(SshCaError::KeyTypeNotAllowed(_))));

        let mut role = r1();
        role.allowed_key_types.insert(KeyFamily::Rsa, KeyBits::at_least(3072));
        assert!(role.check_key(&rsa).is_err());
        role.allowed_key_types.insert(KeyFamily::Rsa, KeyBits::at_most(2048));
        role.check_key(&rsa).unwrap();
    }

    #[test]
    fn test_json_shape() {
        let role = r1();
        let json = serde_json::to_value(&role).unwrap();
        assert_eq!(json["ttl"]["default"], 43200);
        assert_eq!(json["cert_type"], "user");
        assert_eq!(json["allowed_principals"][0], "alice");
        assert!(json["allowed_key_types"]["ed25519"].is_object());

        let decoded: RolePolicy = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, role);
    }
}
