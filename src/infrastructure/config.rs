use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("missing required variable {0}")]
    Missing(&'static str),
}

/// Which blob store backend persists rendered artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Served uploads directory on local disk.
    Local,
    /// Drive-style HTTP store.
    Drive,
}

/// Where OAuth credentials come from at runtime.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// JSON blob in an environment variable, re-read on reload.
    Env(String),
    /// JSON file on disk.
    File(PathBuf),
    /// Fixed token; used by tests and one-off tooling.
    Static(String),
    /// No credentials available.
    Disabled,
}

/// Process-wide configuration, gathered once at startup from the
/// environment. Everything that differs between deployed form variants
/// (allow-list, identifier prefixes, item label, store backend) lives
/// here rather than in pipeline logic.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub ledger_path: String,
    pub allowed_domains: Vec<String>,
    pub id_prefixes: Vec<char>,
    pub item_category: String,
    pub tz: FixedOffset,
    pub store: StoreBackend,
    pub uploads_dir: PathBuf,
    pub public_base_url: String,
    pub drive_api_base: String,
    pub drive_view_base: String,
    pub drive_folder_id: Option<String>,
    /// Mail relay base URL; `None` disables the notifier entirely.
    pub gmail_api_base: Option<String>,
    pub font_path: Option<PathBuf>,
    pub token_source: TokenSource,
    pub oauth_auth_base: String,
    pub oauth_client_id: Option<String>,
    pub oauth_redirect_uri: Option<String>,
    pub call_timeout: Duration,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = var("SIGNOFF_ADDR").unwrap_or_else(|| "0.0.0.0:3003".to_string());
        let bind_addr = bind_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "SIGNOFF_ADDR",
            value: bind_addr.clone(),
        })?;

        let tz_minutes = var("SIGNOFF_TZ_OFFSET_MINUTES").unwrap_or_else(|| "480".to_string());
        let tz = tz_minutes
            .parse::<i32>()
            .ok()
            .filter(|m| m.abs() < 24 * 60)
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .ok_or(ConfigError::Invalid {
                name: "SIGNOFF_TZ_OFFSET_MINUTES",
                value: tz_minutes,
            })?;

        let store = match var("SIGNOFF_STORE").as_deref() {
            None | Some("local") => StoreBackend::Local,
            Some("drive") => StoreBackend::Drive,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "SIGNOFF_STORE",
                    value: other.to_string(),
                })
            }
        };

        let drive_folder_id = var("SIGNOFF_DRIVE_FOLDER_ID");
        if store == StoreBackend::Drive && drive_folder_id.is_none() {
            return Err(ConfigError::Missing("SIGNOFF_DRIVE_FOLDER_ID"));
        }

        let token_source = if env::var("SIGNOFF_TOKENS").is_ok() {
            TokenSource::Env("SIGNOFF_TOKENS".to_string())
        } else if let Some(path) = var("SIGNOFF_TOKENS_PATH") {
            TokenSource::File(PathBuf::from(path))
        } else {
            TokenSource::Disabled
        };

        let call_timeout = var("SIGNOFF_TIMEOUT_SECS").unwrap_or_else(|| "30".to_string());
        let call_timeout = call_timeout
            .parse::<u64>()
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::Invalid {
                name: "SIGNOFF_TIMEOUT_SECS",
                value: call_timeout,
            })?;

        Ok(Self {
            bind_addr,
            ledger_path: var("SIGNOFF_LEDGER_PATH").unwrap_or_else(|| "signoff.db".to_string()),
            allowed_domains: var("SIGNOFF_ALLOWED_DOMAINS")
                .map(|v| v.split(',').map(|d| d.trim().to_string()).collect())
                .unwrap_or_default(),
            id_prefixes: var("SIGNOFF_ID_PREFIXES")
                .unwrap_or_else(|| "J".to_string())
                .chars()
                .filter(|c| c.is_ascii_uppercase())
                .collect(),
            item_category: var("SIGNOFF_SIGN_ITEM").unwrap_or_else(|| "停車證".to_string()),
            tz,
            store,
            uploads_dir: PathBuf::from(var("SIGNOFF_UPLOADS_DIR").unwrap_or_else(|| "uploads".to_string())),
            public_base_url: var("SIGNOFF_PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3003".to_string()),
            drive_api_base: var("SIGNOFF_DRIVE_API_BASE")
                .unwrap_or_else(|| "https://www.googleapis.com".to_string()),
            drive_view_base: var("SIGNOFF_DRIVE_VIEW_BASE")
                .unwrap_or_else(|| "https://drive.google.com".to_string()),
            drive_folder_id,
            gmail_api_base: var("SIGNOFF_GMAIL_API_BASE"),
            font_path: var("SIGNOFF_FONT_PATH").map(PathBuf::from),
            token_source,
            oauth_auth_base: var("SIGNOFF_OAUTH_AUTH_BASE")
                .unwrap_or_else(|| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            oauth_client_id: var("SIGNOFF_OAUTH_CLIENT_ID"),
            oauth_redirect_uri: var("SIGNOFF_OAUTH_REDIRECT_URI"),
            call_timeout,
        })
    }
}

/// Long-lived credential blob produced by the delegation flow and pasted
/// into the deployment by an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Injectable credential provider with an explicit reload lifecycle.
///
/// Constructed once and shared; never a module-level singleton, so tests
/// can run with fixed fake tokens and deployments can rotate the blob
/// without a restart.
pub struct CredentialProvider {
    source: TokenSource,
    tokens: RwLock<Option<StoredTokens>>,
}

impl CredentialProvider {
    pub fn new(source: TokenSource) -> Self {
        let tokens = RwLock::new(Self::load(&source));
        Self { source, tokens }
    }

    /// Fixed token for tests and short-lived tooling.
    pub fn with_token(token: &str) -> Self {
        Self::new(TokenSource::Static(token.to_string()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .ok()?
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    /// Re-read the backing source, e.g. after the operator rotates tokens.
    pub fn reload(&self) {
        if let Ok(mut guard) = self.tokens.write() {
            *guard = Self::load(&self.source);
        }
    }

    fn load(source: &TokenSource) -> Option<StoredTokens> {
        let raw = match source {
            TokenSource::Env(name) => env::var(name).ok()?,
            TokenSource::File(path) => match std::fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential file unreadable");
                    return None;
                }
            },
            TokenSource::Static(token) => {
                return Some(StoredTokens {
                    access_token: token.clone(),
                    refresh_token: None,
                })
            }
            TokenSource::Disabled => return None,
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(error = %e, "credential blob unparseable");
                None
            }
        }
    }
}
