//! Authentication extractors
//!
//! Every authenticated route takes `CurrentUser`; admin routes take
//! `AdminUser`. Both read `Authorization: Bearer <token>` and verify the
//! HMAC signature against the configured secret.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use super::token::{AuthClaims, verify_token};
use crate::AppState;
use crate::error::AppError;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Extractor for the authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(claims): CurrentUser) { ... }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthClaims);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthenticated)?;
        let claims = verify_token(token, &state.config.auth.token_secret)?;
        Ok(CurrentUser(claims))
    }
}

/// Extractor for admin-only routes
///
/// Rejects with `PermissionDenied` when the token is valid but the role is
/// not `admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(claims) = CurrentUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            return Err(AppError::PermissionDenied);
        }
        Ok(AdminUser(claims))
    }
}
