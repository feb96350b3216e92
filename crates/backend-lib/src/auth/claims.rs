// ============================
// crates/backend-lib/src/auth/claims.rs
// ============================
//! Identity claims carried by credentials and attached to connections.
use parley_common::{Role, UserId, ANONYMOUS};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::validation::is_valid_user_id;

/// Payload of a signed credential, with the field names clients already use
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: UserId,
    pub position: String,
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verified identity of a connection. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaim {
    pub user_id: UserId,
    pub role: Role,
    pub company_id: String,
    pub display_name: String,
}

impl TryFrom<TokenClaims> for IdentityClaim {
    type Error = AppError;

    fn try_from(claims: TokenClaims) -> Result<Self, Self::Error> {
        if !is_valid_user_id(&claims.user_id) {
            return Err(AppError::InvalidCredential(format!(
                "unusable userId {:?}",
                claims.user_id
            )));
        }
        let role = claims
            .position
            .parse::<Role>()
            .map_err(AppError::Forbidden)?;
        let display_name = claims
            .first_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());

        Ok(Self {
            user_id: claims.user_id,
            role,
            company_id: claims.company_id,
            display_name,
        })
    }
}
