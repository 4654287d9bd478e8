//! Token signature verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::{AuthClaims, TokenValidationError, validate_claims};

/// Verifies a bearer token and returns its claims.
///
/// Trait seam so the HTTP layer and the realtime socket can be tested with a
/// deterministic validator.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, TokenValidationError>;
}

/// HS256 validator over a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<AuthClaims>(token, &self.key, &validation)
            .map_err(|_| TokenValidationError::Malformed)?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
