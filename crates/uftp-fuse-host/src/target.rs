// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount target addresses and credential specs

use std::fmt;
use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};

/// Where the mounted tree comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountTarget {
    /// A daemon address used with an already issued one-time password
    Direct { host: String, port: u16 },
    /// An auth endpoint that issues the session for `base_dir`
    Auth { auth_url: String, base_dir: String },
}

impl FromStr for MountTarget {
    type Err = anyhow::Error;

    /// Accepts `host:port` or `[scheme://]host:port/rest/auth/SITE[:/base/dir]`.
    fn from_str(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if let Some((server, endpoint)) = spec.split_once("/rest/") {
            let (scheme, server) = match server.split_once("://") {
                Some((scheme, rest)) => (scheme, rest),
                None => ("https", server),
            };
            if server.is_empty() {
                bail!("missing auth server in {:?}", spec);
            }
            let (endpoint, base_dir) = match endpoint.split_once(':') {
                Some((endpoint, dir)) if !dir.is_empty() => (endpoint, dir),
                Some((endpoint, _)) => (endpoint, "/"),
                None => (endpoint, "/"),
            };
            if endpoint.is_empty() {
                bail!("missing auth endpoint in {:?}", spec);
            }
            return Ok(MountTarget::Auth {
                auth_url: format!("{}://{}/rest/{}", scheme, server, endpoint),
                base_dir: base_dir.to_string(),
            });
        }

        let (host, port) = spec
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("expected host:port or an auth URL, got {:?}", spec))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            bail!("missing host in {:?}", spec);
        }
        let port = port
            .parse::<u16>()
            .with_context(|| format!("invalid port in {:?}", spec))?;
        Ok(MountTarget::Direct {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountTarget::Direct { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            MountTarget::Direct { host, port } => write!(f, "{}:{}", host, port),
            MountTarget::Auth { auth_url, base_dir } => write!(f, "{}:{}", auth_url, base_dir),
        }
    }
}

/// Resolve a token argument: `@@NAME` reads environment variable `NAME`,
/// `@path` reads a file, anything else is the token itself.
pub fn resolve_token(spec: &str) -> Result<String> {
    if let Some(name) = spec.strip_prefix("@@") {
        std::env::var(name).with_context(|| format!("environment variable {} is not set", name))
    } else if let Some(path) = spec.strip_prefix('@') {
        let token = fs::read_to_string(path).with_context(|| format!("reading token file {}", path))?;
        Ok(token.trim().to_string())
    } else {
        Ok(spec.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn auth_target_without_scheme_defaults_to_https() {
        let target: MountTarget = "localhost:9000/rest/auth/TEST:/data-dir".parse().unwrap();
        assert_eq!(
            target,
            MountTarget::Auth {
                auth_url: "https://localhost:9000/rest/auth/TEST".into(),
                base_dir: "/data-dir".into(),
            }
        );
    }

    #[test]
    fn auth_target_keeps_explicit_scheme_and_defaults_base_dir() {
        let target: MountTarget = "http://gw:8080/rest/core/storages/HOME".parse().unwrap();
        assert_eq!(
            target,
            MountTarget::Auth {
                auth_url: "http://gw:8080/rest/core/storages/HOME".into(),
                base_dir: "/".into(),
            }
        );
    }

    #[test]
    fn direct_target() {
        let target: MountTarget = "uftp.example.org:64434".parse().unwrap();
        assert_eq!(
            target,
            MountTarget::Direct {
                host: "uftp.example.org".into(),
                port: 64434,
            }
        );
        assert_eq!(target.to_string(), "uftp.example.org:64434");
    }

    #[test]
    fn bracketed_ipv6_direct_target() {
        let target: MountTarget = "[::1]:64434".parse().unwrap();
        assert_eq!(
            target,
            MountTarget::Direct {
                host: "::1".into(),
                port: 64434,
            }
        );
        assert_eq!(target.to_string(), "[::1]:64434");
        assert!("[]:64434".parse::<MountTarget>().is_err());
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!("no-port".parse::<MountTarget>().is_err());
        assert!("host:99999".parse::<MountTarget>().is_err());
        assert!(":21".parse::<MountTarget>().is_err());
        assert!("/rest/auth/X".parse::<MountTarget>().is_err());
        assert!("host:1/rest/".parse::<MountTarget>().is_err());
    }

    #[test]
    fn token_specs() {
        assert_eq!(resolve_token("plain").unwrap(), "plain");

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  from-file  ").unwrap();
        let spec = format!("@{}", file.path().display());
        assert_eq!(resolve_token(&spec).unwrap(), "from-file");

        assert!(resolve_token("@@UFTP_TEST_TOKEN_THAT_IS_NOT_SET").is_err());
    }
}
