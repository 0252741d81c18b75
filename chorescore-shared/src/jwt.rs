use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;
use crate::domain::{FamilyId, ProfileId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Profile id.
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub role: Role,
    /// Unset until the profile has created or joined a family.
    pub family_id: Option<String>,
}

impl JwtClaims {
    pub fn profile_id(&self) -> ProfileId {
        ProfileId(self.sub.clone())
    }

    pub fn family_id(&self) -> Option<FamilyId> {
        self.family_id.clone().map(FamilyId)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn decode_unverified(token: &str) -> Result<JwtClaims, JwtError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return Err(JwtError::Decode("invalid JWT format".into()));
    }
    let payload_b64 = parts[1];
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| JwtError::Decode(format!("invalid base64 payload: {e}")))?;
    serde_json::from_slice::<JwtClaims>(&payload_bytes)
        .map_err(|e| JwtError::Decode(format!("invalid json payload: {e}")))
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(token: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        token,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> JwtClaims {
        JwtClaims {
            sub: "p1".into(),
            jti: "j1".into(),
            exp: chrono::Utc::now().timestamp() + 3600,
            role: Role::Child,
            family_id: Some("fam".into()),
        }
    }

    #[test]
    fn signed_token_verifies_and_reads_back() {
        let token = encode(&claims(), b"secret").unwrap();
        let verified = decode_and_verify(&token, b"secret").unwrap();
        assert_eq!(verified.sub, "p1");
        assert_eq!(verified.family_id().map(|f| f.0), Some("fam".to_string()));
        let peeked = decode_unverified(&token).unwrap();
        assert_eq!(peeked.role, Role::Child);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = encode(&claims(), b"secret").unwrap();
        assert!(decode_and_verify(&token, b"other").is_err());
        assert!(decode_unverified("garbage").is_err());
    }
}
