use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::models::errors::AuthError;

type HmacSha512 = Hmac<Sha512>;

const ALGORITHM: &str = "HS512";

/// Issues bearer tokens for a subject and resolves them back to it.
pub trait TokenAuthority: Send + Sync {
    fn issue(&self, subject: &str, display_name: &str, ttl_hours: i64) -> Result<String, AuthError>;

    /// Returns the subject of a valid, unexpired token.
    fn validate(&self, token: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    iat: i64,
    exp: i64,
}

/// Compact JWS tokens (`HS512`) signed with a shared secret.
pub struct HmacTokenAuthority {
    secret: Vec<u8>,
}

impl HmacTokenAuthority {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha512, AuthError> {
        let mut mac = HmacSha512::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidKey)?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, AuthError> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
}

impl TokenAuthority for HmacTokenAuthority {
    fn issue(&self, subject: &str, display_name: &str, ttl_hours: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: subject.to_string(),
            username: display_name.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(ttl_hours)).timestamp(),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);
        let signature = self.mac(&signing_input)?.finalize().into_bytes();

        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    fn validate(&self, token: &str) -> Result<String, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::Malformed);
        };

        let parsed_header: Header = decode_segment(header)?;
        if parsed_header.alg != ALGORITHM {
            return Err(AuthError::UnsupportedAlgorithm(parsed_header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;
        self.mac(&format!("{header}.{claims}"))?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let claims: Claims = decode_segment(claims)?;
        if claims.exp < Utc::now().timestamp() {
            let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_default();
            return Err(AuthError::Expired(expired_at));
        }
        if claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }

        Ok(claims.sub)
    }
}

/// Hashes `password` with Argon2id and a random salt into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Checks `password` against a PHC string produced by [`hash_password`].
pub fn verify_password(password: &str, password_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::IncorrectPassword)
}
