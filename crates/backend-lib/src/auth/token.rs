// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
//! Compact HS256 credentials.
//!
//! Tokens are `base64url(header).base64url(payload).base64url(mac)` where
//! `mac = HMAC-SHA256(secret, header "." payload)`, without padding.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;

use super::claims::TokenClaims;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Signs and verifies credentials with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    leeway_secs: i64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>, leeway_secs: u64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            leeway_secs: i64::try_from(leeway_secs).unwrap_or(i64::MAX),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(format!("hmac key: {e}")))
    }

    /// Mint a token for `claims`
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, AppError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{header}.{payload}.{signature}"))
    }

    /// Verify signature and expiry, returning the decoded claims
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AppError> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::InvalidCredential("malformed token".into()));
        };

        let decoded_header: Header = decode_segment(header)?;
        if decoded_header.alg != ALGORITHM {
            return Err(AppError::InvalidCredential(format!(
                "unsupported algorithm {}",
                decoded_header.alg
            )));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AppError::InvalidCredential("malformed signature".into()))?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        // constant time comparison
        mac.verify_slice(&signature)
            .map_err(|_| AppError::InvalidCredential("signature mismatch".into()))?;

        let claims: TokenClaims = decode_segment(payload)?;
        if claims.exp.saturating_add(self.leeway_secs) <= Utc::now().timestamp() {
            return Err(AppError::Expired);
        }
        Ok(claims)
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, AppError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AppError::InvalidCredential("malformed segment".into()))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::InvalidCredential(format!("undecodable segment: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp_offset: i64) -> TokenClaims {
        TokenClaims {
            user_id: "u1".into(),
            position: "User".into(),
            company_id: "c1".into(),
            first_name: Some("Ann".into()),
            exp: Utc::now().timestamp() + exp_offset,
            iat: Some(Utc::now().timestamp()),
        }
    }

    #[test]
    fn test_signed_token_verifies() {
        let codec = TokenCodec::new("secret", 0);
        let token = codec.sign(&claims(60)).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = codec.verify(&token).unwrap();
        assert_eq!(decoded.user_id, "u1");
        assert_eq!(decoded.first_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenCodec::new("secret", 0).sign(&claims(60)).unwrap();
        let err = TokenCodec::new("other", 0).verify(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidCredential(_)));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = TokenCodec::new("secret", 0);
        let token = codec.sign(&claims(60)).unwrap();
        let mut forged = claims(60);
        forged.position = "Admin".into();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(matches!(
            codec.verify(&tampered),
            Err(AppError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let codec = TokenCodec::new("secret", 0);
        let token = codec.sign(&claims(-10)).unwrap();
        assert!(matches!(codec.verify(&token), Err(AppError::Expired)));

        // leeway covers small clock skew
        let lenient = TokenCodec::new("secret", 60);
        assert!(lenient.verify(&token).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        let codec = TokenCodec::new("secret", 0);
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(
                matches!(codec.verify(token), Err(AppError::InvalidCredential(_))),
                "{token:?} should be rejected"
            );
        }
    }
}
