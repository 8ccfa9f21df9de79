//! Bearer tokens identifying the calling user.
//!
//! Tokens are HMAC-SHA256 signatures over the user id.
//! Format: `fitgenie_ut_<user_id>_<hmac_hex>`

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "fitgenie_ut_";

/// Environment variable holding the hex-encoded signing secret.
pub const TOKEN_SECRET_ENV: &str = "FITGENIE_TOKEN_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid user ID in token: {0}")]
    InvalidUserId(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing bearer token")]
    MissingBearer,

    #[error("missing token secret")]
    MissingSecret,
}

/// Signing key for user tokens.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Decode a hex secret as written by `fitgenie init`.
    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| TokenError::InvalidFormat(format!("token secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self::new(secret))
    }
}

/// Issue a token for `user_id`.
pub fn generate_token(config: &TokenConfig, user_id: Uuid) -> String {
    let mac = compute_hmac(&config.secret, user_id.to_string().as_bytes());
    format!("{TOKEN_PREFIX}{user_id}_{}", hex::encode(mac))
}

/// Verify a token and return the user it was issued for.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<Uuid, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
    })?;

    // A hyphenated UUID is 36 chars, followed by '_' and the hex MAC.
    let (user_str, after_user) = rest
        .split_at_checked(36)
        .ok_or_else(|| TokenError::InvalidFormat("token too short to contain a user ID".into()))?;
    let user_id =
        Uuid::parse_str(user_str).map_err(|e| TokenError::InvalidUserId(e.to_string()))?;

    let hmac_hex = after_user
        .strip_prefix('_')
        .ok_or_else(|| TokenError::InvalidFormat("expected underscore after user ID".into()))?;
    let provided = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    let mut mac = new_mac(&config.secret);
    mac.update(user_str.as_bytes());
    mac.verify_slice(&provided)
        .map_err(|_| TokenError::HmacMismatch)?;

    Ok(user_id)
}

/// Authenticate an `Authorization` header value of the form `Bearer <token>`.
pub fn authenticate_bearer(config: &TokenConfig, header: Option<&str>) -> Result<Uuid, TokenError> {
    let token = header
        .and_then(|h| {
            let (scheme, token) = h.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .ok_or(TokenError::MissingBearer)?;
    validate_token(config, token)
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}
