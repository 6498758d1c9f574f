use std::collections::BTreeMap;

use bon::Builder;
use time::Duration;

/// Parameters of one certificate issuance request.
///
/// Everything except the role and the key is optional; omitted fields take
/// the role's defaults.
///
/// # Fields
/// * `role` - Name of the role the request is evaluated against.
/// * `public_key` - The key to certify, as an OpenSSH line or SSH wire bytes.
/// * `principals` - Requested principals.
/// * `ttl` - Requested certificate lifetime.
/// * `critical_options` - Requested critical options.
/// * `extensions` - Requested extensions.
/// * `key_id` - Requested key id, honoured only when the role allows it.
///
/// # Example
/// ```
/// use sshca::cert::params::CertificateRequest;
/// let request = CertificateRequest::builder()
///     .role("r1")
///     .public_key("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIO0wIa2Yf3dzKiW8dBvvc1x60j2xCaQlnXbA0Ic1Hzd0")
///     .principals(vec!["alice".to_string()])
///     .ttl(time::Duration::hours(1))
///     .build();
/// assert_eq!(request.role, "r1");
/// assert!(request.extensions.is_none());
/// ```
#[derive(Clone, Debug, Builder)]
pub struct CertificateRequest {
    #[builder(into)]
    pub role: String,
    #[builder(into)]
    pub public_key: Vec<u8>,
    pub principals: Option<Vec<String>>,
    pub ttl: Option<Duration>,
    pub critical_options: Option<BTreeMap<String, String>>,
    pub extensions: Option<BTreeMap<String, String>>,
    #[builder(into)]
    pub key_id: Option<String>,
}
