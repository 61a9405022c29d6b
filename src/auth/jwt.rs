//! JWT access tokens and opaque refresh tokens

use crate::auth::models::UserRole;
use crate::config::AuthSettings;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Bytes of randomness in a refresh token (hex-encoded to twice this length)
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub user_id: i64,
    /// Username
    pub username: String,
    /// User role
    pub role: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Claims for a token issued at `issued_at`
    pub fn new(
        user_id: i64,
        username: &str,
        role: UserRole,
        settings: &AuthSettings,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let ttl = Duration::minutes(settings.access_token_ttl_minutes);
        Self {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
            iss: settings.issuer.clone(),
            aud: settings.audience.clone(),
        }
    }

    /// Get user role
    pub fn get_role(&self) -> Result<UserRole> {
        self.role.parse().map_err(|_| Error::InvalidToken)
    }
}

/// Signing backend for access tokens
pub trait TokenService: Send + Sync {
    /// Sign a short-lived access token for the given identity
    fn issue_access_token(&self, user_id: i64, username: &str, role: UserRole) -> Result<String>;

    /// Check signature, issuer, audience and expiry.
    ///
    /// Every failure is reported as [`Error::InvalidToken`]; the cause is only logged.
    fn verify_access_token(&self, token: &str) -> Result<Claims>;
}

/// HMAC-SHA256 JWTs bound to one issuer/audience pair
pub struct JwtTokenService {
    settings: AuthSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenService {
    pub fn new(settings: &AuthSettings) -> Result<Self> {
        if settings.access_token_secret.is_empty() {
            return Err(Error::Config(
                "access token secret must not be empty".to_string(),
            ));
        }

        let secret = settings.access_token_secret.as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Ok(Self {
            settings: settings.clone(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign arbitrary claims with this service's key
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to create token: {}", e)))
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }
}

impl TokenService for JwtTokenService {
    fn issue_access_token(&self, user_id: i64, username: &str, role: UserRole) -> Result<String> {
        let claims = Claims::new(user_id, username, role, &self.settings, Utc::now());
        self.sign(&claims)
    }

    fn verify_access_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(cause = %e, "access token rejected");
                Error::InvalidToken
            })
    }
}

/// Generate an opaque refresh token: 64 random bytes, hex-encoded
pub fn issue_refresh_token() -> String {
    let bytes: [u8; REFRESH_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Pull the token out of an `Authorization: Bearer <token>` header value
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
