//! `mingle-auth` — pure authentication boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it models
//! bearer-token claims, validates them deterministically, and verifies token
//! signatures behind a trait. Token *issuance* happens outside this system.

pub mod claims;
pub mod validator;

pub use claims::{AuthClaims, TokenValidationError, validate_claims};
pub use validator::{Hs256JwtValidator, JwtValidator};
