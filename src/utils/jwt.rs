//! Verification of the session tokens issued by the panel.
//!
//! Tokens are minted elsewhere; this service only checks the HS256 signature,
//! issuer, audience and expiry before trusting the `id` claim.

use std::collections::BTreeSet;

use jsonwebtoken::{decode, errors::Error as JwtError, Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::routes::auth::claims::Claims;

pub const MIN_SECRET_BYTES: usize = 32;
const MIN_DISTINCT_SECRET_BYTES: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionKeyError {
    #[error("JWT_SECRET must be set")]
    Missing,
    #[error("JWT_SECRET is {0} bytes long, at least {MIN_SECRET_BYTES} are required")]
    TooShort(usize),
    #[error("JWT_SECRET uses only {0} distinct bytes, at least {MIN_DISTINCT_SECRET_BYTES} are required")]
    Repetitive(usize),
}

#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("iss", &self.validation.iss)
            .field("aud", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

impl SessionVerifier {
    /// Reads the shared secret from `JWT_SECRET`.
    pub fn from_env(issuer: &str, audience: &str) -> Result<Self, SessionKeyError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| SessionKeyError::Missing)?;
        Self::new(secret.as_bytes(), issuer, audience)
    }

    pub fn new(secret: &[u8], issuer: &str, audience: &str) -> Result<Self, SessionKeyError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(SessionKeyError::TooShort(secret.len()));
        }
        let distinct = secret.iter().collect::<BTreeSet<_>>().len();
        if distinct < MIN_DISTINCT_SECRET_BYTES {
            return Err(SessionKeyError::Repetitive(distinct));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}
