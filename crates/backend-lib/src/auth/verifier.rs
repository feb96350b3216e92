// ============================
// crates/backend-lib/src/auth/verifier.rs
// ============================
//! Credential extraction and the realtime role gate.
use axum::http::{header, HeaderMap};
use parley_common::Role;

use super::claims::IdentityClaim;
use super::token::TokenCodec;
use crate::error::AppError;

/// Cookie carrying the credential
pub const TOKEN_COOKIE: &str = "token";

/// Turns handshake headers into a trusted [`IdentityClaim`]
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    codec: TokenCodec,
    realtime_roles: Vec<Role>,
}

impl IdentityVerifier {
    pub fn new(codec: TokenCodec, realtime_roles: Vec<Role>) -> Self {
        Self {
            codec,
            realtime_roles,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verify the credential without the realtime role gate
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<IdentityClaim, AppError> {
        let token = extract_credential(headers).ok_or(AppError::Unauthenticated)?;
        let claims = self.codec.verify(&token)?;
        IdentityClaim::try_from(claims)
    }

    /// Verify the credential and require a role admitted to realtime access
    pub fn authorize_realtime(&self, headers: &HeaderMap) -> Result<IdentityClaim, AppError> {
        let claim = self.authenticate(headers)?;
        if !self.realtime_roles.contains(&claim.role) {
            return Err(AppError::Forbidden(format!(
                "role {} may not open realtime connections",
                claim.role
            )));
        }
        Ok(claim)
    }
}

/// Pull the raw credential out of the `token` cookie, falling back to a
/// bearer `Authorization` header.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}
