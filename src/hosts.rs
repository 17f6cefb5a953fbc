//! Target host lists.
//!
//! Hosts come from `--host` flags and/or a JSON5 host file:
//!
//! ```text
//! [
//!   { host: "web1.example.com" },
//!   { host: "db1.example.com", port: 2222, user: "ops", identity: "~/.ssh/ops" },
//! ]
//! ```
//!
//! Connection settings given on the command line fill in whatever an entry
//! leaves out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::parser;
use crate::transport::{ConnectOptions, DEFAULT_SSH_PORT};

/// One host as written in a host file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    pub host: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity: Option<PathBuf>,
}

impl HostSpec {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            identity: None,
        }
    }
}

/// Connection settings shared by all hosts unless an entry overrides them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDefaults {
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity: Option<PathBuf>,
}

/// Parse a host file.
pub fn load_host_file(path: &Path) -> Result<Vec<HostSpec>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read host file: {}", path.display()))?;
    parse_host_list(&text, path)
}

pub fn parse_host_list(text: &str, path: &Path) -> Result<Vec<HostSpec>> {
    let root = parser::parse(text, path)?;
    let specs: Vec<HostSpec> = serde_json::from_value(root.to_value())
        .with_context(|| format!("Host file {} must be an array of {{host, port?, user?, identity?}}", path.display()))?;
    Ok(specs)
}

/// Resolve specs into connection options, applying `defaults` and checking
/// ports.
pub fn resolve(specs: &[HostSpec], defaults: &HostDefaults) -> Result<Vec<ConnectOptions>> {
    let default_user = defaults.user.clone().or_else(local_user_name);

    specs
        .iter()
        .map(|spec| {
            if spec.host.trim().is_empty() {
                bail!("Host name must not be empty");
            }
            let port = match spec.port {
                Some(port) => match u16::try_from(port) {
                    Ok(port) if port > 0 => port,
                    _ => bail!("Port {} for host '{}' must be between 1 and 65535", port, spec.host),
                },
                None => defaults.port.unwrap_or(DEFAULT_SSH_PORT),
            };
            Ok(ConnectOptions {
                host: spec.host.clone(),
                port,
                user: spec.user.clone().or_else(|| default_user.clone()),
                identity: spec.identity.clone().or_else(|| defaults.identity.clone()),
            })
        })
        .collect()
}

/// Name of the user running this process.
pub fn local_user_name() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
        .or_else(|| std::env::var("USER").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_file() {
        let text = r#"
            // fleet
            [
              { host: 'web1' },
              { host: "db1", port: 2222, user: "ops", identity: "/keys/ops" },
            ]
        "#;
        let specs = parse_host_list(text, Path::new("hosts.json5")).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], HostSpec::new("web1"));
        assert_eq!(specs[1].port, Some(2222));
        assert_eq!(specs[1].identity.as_deref(), Some(Path::new("/keys/ops")));
    }

    #[test]
    fn test_host_file_rejects_other_shapes() {
        assert!(parse_host_list("{ host: 'web1' }", Path::new("h")).is_err());
        assert!(parse_host_list("[{ name: 'web1' }]", Path::new("h")).is_err());
        assert!(parse_host_list("[{ host: ", Path::new("h")).is_err());
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let defaults = HostDefaults {
            port: Some(2200),
            user: Some("deploy".into()),
            identity: None,
        };
        let mut custom = HostSpec::new("b");
        custom.user = Some("root".into());
        custom.port = Some(22);

        let hosts = resolve(&[HostSpec::new("a"), custom], &defaults).unwrap();
        assert_eq!(hosts[0].port, 2200);
        assert_eq!(hosts[0].user.as_deref(), Some("deploy"));
        assert_eq!(hosts[1].port, 22);
        assert_eq!(hosts[1].user.as_deref(), Some("root"));
    }

    #[test]
    fn test_resolve_default_port() {
        let hosts = resolve(&[HostSpec::new("a")], &HostDefaults::default()).unwrap();
        assert_eq!(hosts[0].port, 22);
    }

    #[test]
    fn test_resolve_rejects_bad_ports() {
        for port in [0, -1, 65536] {
            let mut spec = HostSpec::new("a");
            spec.port = Some(port);
            let err = resolve(&[spec], &HostDefaults::default()).unwrap_err();
            assert!(err.to_string().contains("between 1 and 65535"), "{}", err);
        }
        assert!(resolve(&[HostSpec::new(" ")], &HostDefaults::default()).is_err());
    }
}
