use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::error::SshCaError;

/// Trait for converting to and from an OpenSSH certificate option.
///
/// OpenSSH certificates carry two name/value maps: critical options, which a
/// verifier must understand or reject the certificate, and extensions, which
/// it may ignore. This trait ties a typed option to its wire name.
///
/// # Example
/// ```
/// use sshca::cert::extensions::{CertificateOption, ForceCommand};
/// let option = ForceCommand("/usr/bin/rsync --server".to_string());
/// let value = option.to_option_value().unwrap();
/// let decoded = ForceCommand::from_option_value(&value).unwrap();
/// assert_eq!(option, decoded);
/// ```
pub trait CertificateOption {
    /// Name of the option as it appears in the certificate.
    const NAME: &'static str;

    /// Whether the option belongs in the critical options map.
    const CRITICAL: bool;

    /// Encodes the option's value.
    fn to_option_value(&self) -> Result<String, SshCaError>;

    /// Decodes the option's value.
    fn from_option_value(value: &str) -> Result<Self, SshCaError>
    where
        Self: Sized;
}

/// Which of the two certificate maps an option lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    CriticalOption,
    Extension,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionKind::CriticalOption => f.write_str("critical option"),
            OptionKind::Extension => f.write_str("extension"),
        }
    }
}

/// The `force-command` critical option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceCommand(pub String);

impl CertificateOption for ForceCommand {
    const NAME: &'static str = "force-command";
    const CRITICAL: bool = true;

    fn to_option_value(&self) -> Result<String, SshCaError> {
        if self.0.trim().is_empty() {
            return Err(SshCaError::ExtensionNotAllowed(
                "force-command requires a command".to_string(),
            ));
        }
        Ok(self.0.clone())
    }

    fn from_option_value(value: &str) -> Result<Self, SshCaError> {
        let command = ForceCommand(value.to_string());
        command.to_option_value()?;
        Ok(command)
    }
}

/// The `source-address` critical option: comma separated addresses or CIDR blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAddress {
    pub networks: Vec<(IpAddr, u8)>,
}

impl CertificateOption for SourceAddress {
    const NAME: &'static str = "source-address";
    const CRITICAL: bool = true;

    fn to_option_value(&self) -> Result<String, SshCaError> {
        if self.networks.is_empty() {
            return Err(SshCaError::ExtensionNotAllowed(
                "source-address requires at least one address".to_string(),
            ));
        }
        Ok(self
            .networks
            .iter()
            .map(|(addr, prefix)| format!("{addr}/{prefix}"))
            .collect::<Vec<_>>()
            .join(","))
    }

    fn from_option_value(value: &str) -> Result<Self, SshCaError> {
        let networks = value
            .split(',')
            .map(|cidr| parse_cidr(cidr.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        let option = Self { networks };
        option.to_option_value()?;
        Ok(option)
    }
}

fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8), SshCaError> {
    let malformed =
        || SshCaError::ExtensionNotAllowed(format!("source-address entry \"{cidr}\" is malformed"));

    let (addr, prefix) = match cidr.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (cidr, None),
    };
    let addr: IpAddr = addr.parse().map_err(|_| malformed())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().map_err(|_| malformed())?,
        None => max,
    };
    if prefix > max {
        return Err(malformed());
    }
    Ok((addr, prefix))
}

macro_rules! flag_options {
    ($($(#[$doc:meta])* $ty:ident => $name:literal, $critical:literal;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
            pub struct $ty;

            impl CertificateOption for $ty {
                const NAME: &'static str = $name;
                const CRITICAL: bool = $critical;

                fn to_option_value(&self) -> Result<String, SshCaError> {
                    Ok(String::new())
                }

                fn from_option_value(value: &str) -> Result<Self, SshCaError> {
                    if value.is_empty() {
                        Ok($ty)
                    } else {
                        Err(SshCaError::ExtensionNotAllowed(format!(
                            "{} takes no value",
                            $name
                        )))
                    }
                }
            }
        )*
    };
}

flag_options! {
    /// Require user verification (e.g. PIN) for FIDO keys.
    VerifyRequired => "verify-required", true;
    PermitX11Forwarding => "permit-X11-forwarding", false;
    PermitAgentForwarding => "permit-agent-forwarding", false;
    PermitPortForwarding => "permit-port-forwarding", false;
    PermitPty => "permit-pty", false;
    PermitUserRc => "permit-user-rc", false;
    /// Skip the touch requirement on FIDO keys.
    NoTouchRequired => "no-touch-required", false;
}

/// The extensions `ssh-keygen` grants a user certificate by default.
pub fn default_user_extensions() -> BTreeMap<String, String> {
    [
        PermitX11Forwarding::NAME,
        PermitAgentForwarding::NAME,
        PermitPortForwarding::NAME,
        PermitPty::NAME,
        PermitUserRc::NAME,
    ]
    .into_iter()
    .map(|name| (name.to_string(), String::new()))
    .collect()
}

/// Checks the value of a well-known option. Unknown names pass through
/// untouched: whether they are allowed at all is the role's decision.
pub fn check_option_value(kind: OptionKind, name: &str, value: &str) -> Result<(), SshCaError> {
    match (kind, name) {
        (OptionKind::CriticalOption, ForceCommand::NAME) => {
            ForceCommand::from_option_value(value).map(drop)
        }
        (OptionKind::CriticalOption, SourceAddress::NAME) => {
            SourceAddress::from_option_value(value).map(drop)
        }
        (OptionKind::CriticalOption, VerifyRequired::NAME) => {
            VerifyRequired::from_option_value(value).map(drop)
        }
        (OptionKind::Extension, PermitX11Forwarding::NAME) => {
            PermitX11Forwarding::from_option_value(value).map(drop)
        }
        (OptionKind::Extension, PermitAgentForwarding::NAME) => {
            PermitAgentForwarding::from_option_value(value).map(drop)
        }
        (OptionKind::Extension, PermitPortForwarding::NAME) => {
            PermitPortForwarding::from_option_value(value).map(drop)
        }
        (OptionKind::Extension, PermitPty::NAME) => PermitPty::from_option_value(value).map(drop),
        (OptionKind::Extension, PermitUserRc::NAME) => {
            PermitUserRc::from_option_value(value).map(drop)
        }
        (OptionKind::Extension, NoTouchRequired::NAME) => {
            NoTouchRequired::from_option_value(value).map(drop)
        }
        _ => Ok(()),
    }
}
