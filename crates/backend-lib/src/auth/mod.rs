// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Identity verification for handshakes and HTTP requests.

pub mod claims;
pub mod rate_limit;
pub mod token;
mod verifier;

pub use claims::{IdentityClaim, TokenClaims};
pub use rate_limit::AuthRateLimiter;
pub use token::TokenCodec;
pub use verifier::{extract_credential, IdentityVerifier, TOKEN_COOKIE};
