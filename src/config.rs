use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::{env, fmt, fs, path::Path, path::PathBuf};

use crate::auth::SigningKey;

/// Default token lifetime (24 hours).
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 86_400;

/// Smallest accepted signing secret, in bytes (256 bits).
pub const MIN_SECRET_BYTES: usize = 32;

/// Default listen address for the HTTP server.
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Prefix marking a secret as standard base64 rather than raw UTF-8.
const BASE64_SECRET_PREFIX: &str = "base64:";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No signing secret was configured
    MissingSecret,
    /// The decoded secret is shorter than `MIN_SECRET_BYTES`
    SecretTooShort { bytes: usize },
    /// A `base64:` secret could not be decoded
    InvalidBase64(String),
    /// Token lifetime must be positive and fit a signed timestamp
    InvalidLifetime(u64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSecret => write!(f, "JWT signing secret is not configured"),
            Self::SecretTooShort { bytes } => write!(
                f,
                "JWT signing secret is {} bytes, at least {} bytes (256 bits) are required",
                bytes, MIN_SECRET_BYTES
            ),
            Self::InvalidBase64(msg) => {
                write!(f, "JWT signing secret is not valid base64: {}", msg)
            }
            Self::InvalidLifetime(secs) => write!(f, "Invalid token lifetime: {} seconds", secs),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Token signing configuration.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// Raw UTF-8 secret, or `base64:<standard base64>`
    pub secret: String,
    /// Token lifetime in seconds (default: 86400)
    #[serde(default = "default_lifetime_seconds")]
    pub lifetime_seconds: u64,
}

fn default_lifetime_seconds() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECONDS
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("lifetime_seconds", &self.lifetime_seconds)
            .finish()
    }
}

impl TokenConfig {
    /// Create a config with the default 24h lifetime.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            lifetime_seconds: DEFAULT_TOKEN_LIFETIME_SECONDS,
        }
    }

    pub fn with_lifetime_seconds(mut self, lifetime_seconds: u64) -> Self {
        self.lifetime_seconds = lifetime_seconds;
        self
    }

    /// Decode the configured secret into key bytes.
    pub fn secret_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }

        let bytes = match self.secret.strip_prefix(BASE64_SECRET_PREFIX) {
            Some(encoded) => STANDARD
                .decode(encoded.trim())
                .map_err(|e| ConfigError::InvalidBase64(e.to_string()))?,
            None => self.secret.as_bytes().to_vec(),
        };

        Ok(bytes)
    }

    /// Build the process-wide signing key, rejecting weak secrets.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        SigningKey::new(&self.secret_bytes()?)
    }

    /// Token lifetime as a duration.
    pub fn lifetime(&self) -> Result<chrono::Duration, ConfigError> {
        let secs = i64::try_from(self.lifetime_seconds)
            .map_err(|_| ConfigError::InvalidLifetime(self.lifetime_seconds))?;
        if secs == 0 {
            return Err(ConfigError::InvalidLifetime(self.lifetime_seconds));
        }
        chrono::Duration::try_seconds(secs)
            .ok_or(ConfigError::InvalidLifetime(self.lifetime_seconds))
    }
}

/// Top-level application configuration as read from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub jwt: TokenConfig,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl AppConfig {
    /// Read a JSON config file and expand `${VAR}` references.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: AppConfig = serde_json::from_str(&raw)?;
        Ok(cfg.expand(|name| env::var(name).ok()))
    }

    fn expand(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.bind = expand_env_vars_with(&self.bind, &lookup);
        self.jwt.secret = expand_env_vars_with(&self.jwt.secret, &lookup);
        self
    }
}

/// Locate the config file, if any.
///
/// Order: explicit path, `QUOTE_VAULT_CONFIG`, `$XDG_CONFIG_HOME/quote-vault/config.json`,
/// `./quote-vault.json`. An explicit or env-provided path is returned even when missing
/// so the read error surfaces.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p);
    }

    if let Ok(p) = env::var("QUOTE_VAULT_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("quote-vault").join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("quote-vault.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Replace `${NAME}` with the value returned by `lookup`.
///
/// Unknown variables are left as written.
fn expand_env_vars_with(input: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match lookup(&name) {
                Some(val) => out.push_str(&val),
                None => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}
