//! Bearer token management
//!
//! Uses HMAC-signed tokens. No server-side token storage needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// Authenticated user id
    pub user_id: i64,
    /// Role ("user" or "admin")
    pub role: String,
    /// When the token was issued
    pub issued_at: DateTime<Utc>,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
}

impl AuthClaims {
    /// Build claims for a user valid for `ttl_seconds` from now.
    pub fn new(user_id: i64, role: &str, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            role: role.to_string(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Create a signed bearer token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
///
/// # Arguments
/// * `claims` - Claims to encode
/// * `secret` - HMAC secret key
pub fn create_token(claims: &AuthClaims, secret: &str) -> Result<String, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let payload =
        serde_json::to_string(claims).map_err(|e| crate::error::AppError::Internal(e.into()))?;
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a bearer token
///
/// # Errors
/// Returns `Unauthenticated` if the token is malformed, the signature does
/// not verify, or the claims are expired.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthClaims, crate::error::AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Some((payload_b64, signature_b64)) = token.split_once('.') else {
        return Err(crate::error::AppError::Unauthenticated);
    };

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| crate::error::AppError::Unauthenticated)?;
    mac.verify_slice(&expected_signature)
        .map_err(|_| crate::error::AppError::Unauthenticated)?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| crate::error::AppError::Unauthenticated)?;
    let claims: AuthClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| crate::error::AppError::Unauthenticated)?;

    if claims.is_expired() {
        return Err(crate::error::AppError::Unauthenticated);
    }

    Ok(claims)
}
