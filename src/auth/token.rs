//! Token codec: signs and parses compact HS256 JWTs.
//!
//! The codec knows nothing about users or requests. Every call re-derives
//! the signature from the key; nothing is cached and nothing is stored.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::auth::clock::{Clock, SystemClock};
use crate::config::{ConfigError, MIN_SECRET_BYTES, TokenConfig};

/// Process-wide HMAC-SHA256 key.
///
/// Built once at startup and shared read-only by every codec call.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Build a key from raw secret bytes. Secrets under 256 bits are refused.
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort {
                bytes: secret.len(),
            });
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp, seconds)
    pub iat: i64,
    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,
}

/// Token errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a decodable three-part token with the expected claims
    Malformed,
    /// Signature does not match the payload under our key
    InvalidSignature,
    /// Signature is fine but `exp` has passed
    Expired,
    /// Encoding a new token failed
    Signing(String),
}

impl TokenError {
    /// Short, stable label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::Signing(_) => "signing",
        }
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed token"),
            Self::InvalidSignature => write!(f, "Invalid token signature"),
            Self::Expired => write!(f, "Token has expired"),
            Self::Signing(msg) => write!(f, "Failed to sign token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed,
        }
    }
}

/// Signs and verifies bearer tokens.
pub struct TokenCodec {
    key: SigningKey,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec using wall-clock time.
    pub fn new(key: SigningKey, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against `self.clock`, not jsonwebtoken's system time.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            key,
            lifetime,
            clock: Arc::new(SystemClock),
            validation,
        }
    }

    /// Create a codec from configuration, failing on a weak secret.
    pub fn from_config(config: &TokenConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.signing_key()?, config.lifetime()?))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a token for `subject`, valid for the configured lifetime.
    pub fn sign(&self, subject: &str) -> Result<String, TokenError> {
        let now = self.clock.now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.lifetime.num_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify the signature and decode the claims. Expiry is not checked.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.key.decoding, &self.validation)?;
        Ok(data.claims)
    }

    /// Subject of a correctly signed token.
    pub fn extract_subject(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.decode(token)?.sub)
    }

    /// Whether a correctly signed token's `exp` lies strictly in the past.
    pub fn is_expired(&self, token: &str) -> Result<bool, TokenError> {
        let claims = self.decode(token)?;
        Ok(self.expired(&claims))
    }

    /// Decode and check expiry, reporting which check failed.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if self.expired(&claims) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// The validity predicate: good signature, exact subject match, not expired.
    pub fn is_valid(&self, token: &str, expected_subject: &str) -> bool {
        match self.verify(token) {
            Ok(claims) => claims.sub == expected_subject,
            Err(_) => false,
        }
    }

    fn expired(&self, claims: &Claims) -> bool {
        claims.exp < self.clock.now().timestamp()
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
