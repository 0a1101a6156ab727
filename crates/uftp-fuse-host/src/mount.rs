// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session setup for a mount

use anyhow::{Context, Result, bail};
use tracing::info;
use uftp_client::{AuthClient, AuthConfig, ProtocolSession, SessionDescriptor};

use crate::target::{MountTarget, resolve_token};

/// Credentials gathered from the command line and environment
#[derive(Clone, Default)]
pub struct Credentials {
    /// One-time password for a direct daemon target
    pub password: Option<String>,
    pub user: Option<String>,
    pub auth_password: Option<String>,
    /// Bearer token or `@file` / `@@ENV` reference
    pub token: Option<String>,
}

impl Credentials {
    /// Credentials presented to the auth endpoint
    pub fn auth_config(&self) -> Result<AuthConfig> {
        if let Some(spec) = &self.token {
            return Ok(AuthConfig::Bearer(resolve_token(spec)?));
        }
        match (&self.user, &self.auth_password) {
            (Some(username), Some(password)) => Ok(AuthConfig::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            (Some(username), None) => {
                bail!("no password given for user {} (--auth-password or UFTP_AUTH_PASSWORD)", username)
            }
            (None, _) => Ok(AuthConfig::Anonymous),
        }
    }
}

/// Obtain the session descriptor for `target`, running the auth handshake
/// when the target names an auth endpoint.
pub fn establish_session(target: &MountTarget, credentials: &Credentials) -> Result<SessionDescriptor> {
    match target {
        MountTarget::Direct { host, port } => {
            let Some(secret) = credentials.password.clone() else {
                bail!("a one-time password is required for {}:{} (-P or UFTP_PASSWORD)", host, port);
            };
            Ok(SessionDescriptor::new(host.clone(), *port, secret))
        }
        MountTarget::Auth { auth_url, base_dir } => {
            let client = AuthClient::from_url(auth_url, credentials.auth_config()?)?;
            let descriptor = client
                .authenticate(base_dir)
                .with_context(|| format!("authenticating at {}", auth_url))?;
            Ok(descriptor)
        }
    }
}

/// Check the secret by opening and closing one session.
pub fn validate_session(descriptor: &SessionDescriptor) -> Result<()> {
    let mut session = ProtocolSession::open(descriptor)
        .with_context(|| format!("connecting to UFTP daemon at {}", descriptor.address()))?;
    session.close();
    info!(address = %descriptor.address(), "UFTP session validated");
    Ok(())
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub fn mount_options(config: &crate::config::MountConfig) -> Vec<fuser::MountOption> {
    let mut options = vec![
        fuser::MountOption::FSName(config.fs_name.clone()),
        fuser::MountOption::Subtype("uftp".to_string()),
        fuser::MountOption::CUSTOM(format!("max_read={}", config.max_read)),
    ];
    if config.allow_other {
        options.push(fuser::MountOption::AllowOther);
    }
    if config.auto_unmount {
        options.push(fuser::MountOption::AutoUnmount);
    }
    options
}
