// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Session handshake with a UFTP auth endpoint
//!
//! The auth service (an Authserver or a UNICORE/X storage endpoint) hands out
//! the daemon address together with a secret that serves as the login
//! password for the anonymous user.

use std::fmt;

use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use uftp_logging::redact;

use crate::error::{UftpError, UftpResult};

/// Marks the requested server path as a multi-file session
pub const SESSION_TAG: &str = "___UFTP___MULTI___FILE___SESSION___MODE___";

const MAX_ERROR_BODY: usize = 512;

/// Credentials presented to the auth service
#[derive(Clone, Default)]
pub enum AuthConfig {
    #[default]
    Anonymous,
    Basic {
        username: String,
        password: String,
    },
    Bearer(String),
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::Anonymous => write!(f, "Anonymous"),
            AuthConfig::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: {} }}", username, redact(""))
            }
            AuthConfig::Bearer(_) => write!(f, "Bearer({})", redact("")),
        }
    }
}

/// Daemon address and login secret for one session
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SessionDescriptor {
    #[serde(rename = "serverHost")]
    pub host: String,
    #[serde(rename = "serverPort")]
    pub port: u16,
    pub secret: String,
}

impl SessionDescriptor {
    pub fn new(host: impl Into<String>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            secret: secret.into(),
        }
    }

    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secret", &redact(&self.secret))
            .finish()
    }
}

#[derive(Serialize)]
struct SessionRequest {
    persistent: &'static str,
    #[serde(rename = "serverPath")]
    server_path: String,
}

/// Server path sent in the handshake: the base directory with a trailing
/// separator, followed by the session tag.
pub fn session_server_path(base_dir: &str) -> String {
    let mut path = base_dir.to_string();
    if !path.is_empty() && !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(SESSION_TAG);
    path
}

/// HTTP client for the auth endpoint
#[derive(Debug, Clone)]
pub struct AuthClient {
    http_client: HttpClient,
    auth_url: Url,
    auth: AuthConfig,
}

impl AuthClient {
    pub fn new(auth_url: Url, auth: AuthConfig) -> UftpResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("uftp-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UftpError::Auth(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            auth_url,
            auth,
        })
    }

    pub fn from_url(auth_url: &str, auth: AuthConfig) -> UftpResult<Self> {
        let auth_url = Url::parse(auth_url)
            .map_err(|e| UftpError::Auth(format!("invalid auth URL {}: {}", auth_url, e)))?;
        Self::new(auth_url, auth)
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    /// Request a persistent session rooted at `base_dir`.
    pub fn authenticate(&self, base_dir: &str) -> UftpResult<SessionDescriptor> {
        let body = SessionRequest {
            persistent: "true",
            server_path: session_server_path(base_dir),
        };
        debug!(
            target: "uftp::auth",
            url = %self.auth_url,
            server_path = %body.server_path,
            "requesting session"
        );

        let mut request = self.http_client.post(self.auth_url.clone()).json(&body);
        request = match &self.auth {
            AuthConfig::Anonymous => request,
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthConfig::Bearer(token) => request.bearer_auth(token),
        };

        let response = request
            .send()
            .map_err(|e| UftpError::Auth(format!("request to {} failed: {}", self.auth_url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| UftpError::Auth(format!("cannot read response body: {}", e)))?;

        if !status.is_success() {
            return Err(UftpError::Auth(format!(
                "{} returned {}: {}",
                self.auth_url,
                status,
                truncate(&text, MAX_ERROR_BODY)
            )));
        }

        let descriptor: SessionDescriptor = serde_json::from_str(&text)
            .map_err(|e| UftpError::Auth(format!("malformed session descriptor: {}", e)))?;
        info!(
            target: "uftp::auth",
            host = %descriptor.host,
            port = descriptor.port,
            "session granted"
        );
        Ok(descriptor)
    }
}

/// One-shot handshake helper.
pub fn authenticate(
    auth_url: &str,
    base_dir: &str,
    auth: AuthConfig,
) -> UftpResult<SessionDescriptor> {
    AuthClient::from_url(auth_url, auth)?.authenticate(base_dir)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_path_gets_separator_before_tag() {
        assert_eq!(session_server_path(""), SESSION_TAG);
        assert_eq!(session_server_path("/data"), format!("/data/{}", SESSION_TAG));
        assert_eq!(session_server_path("/data/"), format!("/data/{}", SESSION_TAG));
    }

    #[test]
    fn descriptor_parses_and_hides_secret() {
        let json = r#"{"serverHost":"uftp.example.org","serverPort":64434,"secret":"s3cr3t"}"#;
        let descriptor: SessionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor, SessionDescriptor::new("uftp.example.org", 64434, "s3cr3t"));
        assert_eq!(descriptor.address(), "uftp.example.org:64434");
        assert_eq!(SessionDescriptor::new("::1", 64434, "s").address(), "[::1]:64434");

        let shown = format!("{:?}", descriptor);
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains("[REDACTED]"));
    }

    #[test]
    fn auth_config_debug_hides_credentials() {
        let basic = AuthConfig::Basic {
            username: "demouser".into(),
            password: "test123".into(),
        };
        let shown = format!("{:?}", basic);
        assert!(shown.contains("demouser"));
        assert!(!shown.contains("test123"));
        assert!(!format!("{:?}", AuthConfig::Bearer("tok".into())).contains("tok"));
    }

    #[test]
    fn invalid_auth_url_is_an_auth_error() {
        let err = AuthClient::from_url("not a url", AuthConfig::Anonymous).unwrap_err();
        assert!(matches!(err, UftpError::Auth(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
