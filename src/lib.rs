//! # sshca - An SSH Certificate Authority Signing Engine
//!
//! sshca issues OpenSSH user and host certificates under named role
//! policies. Clients submit a public key together with the principals,
//! lifetime and options they want; the authority checks the request against
//! the role and, if it is contained by the policy, returns a certificate
//! signed by the configured CA key. It is built on the rustcrypto `ssh-key`
//! crate and keeps all state in a pluggable key/value store.
//!
//! ## Supported Key Types
//!
//! For both the CA key and the keys being certified:
//! - **RSA**: 1024 to 16384-bit moduli (roles usually demand more)
//! - **ECDSA**: P-256, P-384 and P-521 curves
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! RSA CA keys sign with `rsa-sha2-512`.
//!
//! ## Key Features
//!
//! - **Fail closed**: without a CA bundle every issuance fails with
//!   [`error::SshCaError::NotConfigured`]
//! - **Policy containment**: principals, TTL, critical options and extensions
//!   of an issued certificate are always a subset of what the role allows
//! - **Unique serials**: strictly increasing under one CA bundle, reserved in
//!   storage in blocks so a restart never reuses one
//! - **Consistent snapshots**: a key rotation or role edit never mixes into
//!   an issuance already in flight
//! - **Private key confinement**: the CA private key is accepted on write and
//!   never returned, logged or included in an error
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//!
//! use sshca::{
//!     authority::SshCertificateAuthority,
//!     cert::params::CertificateRequest,
//!     key::KeyFamily,
//!     role::{AllowList, KeyBits, RolePolicy, TtlBounds},
//! };
//! use time::Duration;
//!
//! # fn main() -> Result<(), sshca::error::SshCaError> {
//! let ca = SshCertificateAuthority::in_memory();
//!
//! // Install the CA keypair, as written by `ssh-keygen -t ed25519 -f ca`
//! ca.configure_ca(
//!     &std::fs::read("ca").unwrap(),
//!     &std::fs::read("ca.pub").unwrap(),
//! )?;
//!
//! // Define what the "engineers" role may issue
//! ca.write_role(
//!     RolePolicy::builder()
//!         .name("engineers")
//!         .allowed_key_types(BTreeMap::from([
//!             (KeyFamily::Ed25519, KeyBits::any()),
//!             (KeyFamily::Rsa, KeyBits::at_least(3072)),
//!         ]))
//!         .allowed_principals(AllowList::new(["alice", "bob"]))
//!         .ttl(TtlBounds::new(Duration::minutes(5), Duration::hours(8), Duration::hours(24))?)
//!         .build(),
//! )?;
//!
//! // Sign alice's key for eight hours
//! let certificate = ca.issue_certificate(
//!     &CertificateRequest::builder()
//!         .role("engineers")
//!         .public_key(std::fs::read("id_ed25519.pub").unwrap())
//!         .principals(vec!["alice".to_string()])
//!         .build(),
//! )?;
//! std::fs::write("id_ed25519-cert.pub", certificate).unwrap();
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every failure is an [`error::SshCaError`] whose variant tells a request
//! the caller can fix apart from a fault on the authority's side:
//!
//! ```rust
//! use sshca::{authority::SshCertificateAuthority, cert::params::CertificateRequest, error::SshCaError};
//!
//! let ca = SshCertificateAuthority::in_memory();
//! let request = CertificateRequest::builder()
//!     .role("engineers")
//!     .public_key("ssh-ed25519 AAAA")
//!     .build();
//! match ca.issue_certificate(&request) {
//!     Ok(certificate) => println!("{certificate}"),
//!     Err(SshCaError::NotConfigured) => println!("install a CA key first"),
//!     Err(e) if e.is_policy_violation() => println!("request denied: {e}"),
//!     Err(e) if e.is_retryable() => println!("try again later: {e}"),
//!     Err(e) => println!("bad request: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`authority`]: The certificate authority facade
//! - [`key`]: Structural validation of public and private keys
//! - [`issuer`]: The CA key store and serial reservation
//! - [`role`]: Role policies and their storage
//! - [`engine`]: Policy enforcement and certificate construction
//! - [`cert`]: Signed certificates, request parameters and certificate options
//! - [`tbs_certificate`]: The to-be-signed certificate structure
//! - [`serial`]: Serial number allocation
//! - [`storage`]: The key/value storage interface
//! - [`config`]: Authority configuration
//! - [`error`]: Error types and classification

pub mod authority;
pub mod cert;
pub mod config;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod key;
pub mod role;
pub mod serial;
pub mod storage;
pub mod tbs_certificate;
