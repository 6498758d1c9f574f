use std::collections::BTreeMap;

use sshca::authority::SshCertificateAuthority;
use sshca::cert::params::CertificateRequest;
use sshca::error::SshCaError;
use sshca::key::KeyFamily;
use sshca::role::{AllowList, KeyBits, RolePolicy, TtlBounds};
use time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), SshCaError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sshca=debug")))
        .init();

    let ca = SshCertificateAuthority::in_memory();

    // Install the CA keypair (generated with `ssh-keygen -t ed25519`)
    ca.configure_ca(
        include_bytes!("../tests/fixtures/ca_ed25519"),
        include_bytes!("../tests/fixtures/ca_ed25519.pub"),
    )?;
    println!("TrustedUserCAKeys entry:\n{}\n", ca.ca_public_key()?);

    // A role for engineers: Ed25519 or large RSA keys, short-lived certificates
    ca.write_role(
        RolePolicy::builder()
            .name("engineers")
            .allowed_key_types(BTreeMap::from([
                (KeyFamily::Ed25519, KeyBits::any()),
                (KeyFamily::Rsa, KeyBits::at_least(3072)),
            ]))
            .allowed_principals(AllowList::new(["alice", "bob"]))
            .ttl(TtlBounds::new(Duration::minutes(5), Duration::hours(8), Duration::hours(24))?)
            .allowed_extensions(AllowList::new(["permit-pty", "permit-agent-forwarding"]))
            .default_extensions(BTreeMap::from([("permit-pty".to_string(), String::new())]))
            .build(),
    )?;

    // Sign alice's key
    let certificate = ca.issue_certificate(
        &CertificateRequest::builder()
            .role("engineers")
            .public_key(include_str!("../tests/fixtures/user_ed25519.pub"))
            .principals(vec!["alice".to_string()])
            .ttl(Duration::hours(1))
            .build(),
    )?;
    println!("id_ed25519-cert.pub:\n{certificate}\n");

    // A 2048-bit RSA key is below the role's minimum
    let denied = ca.issue_certificate(
        &CertificateRequest::builder()
            .role("engineers")
            .public_key(include_str!("../tests/fixtures/user_rsa_2048.pub"))
            .principals(vec!["bob".to_string()])
            .build(),
    );
    if let Err(e) = denied {
        println!("denied: {e}");
    }

    Ok(())
}
