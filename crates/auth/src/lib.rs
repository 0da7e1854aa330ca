//! `orderflow-auth` — authentication boundary (token claims → acting identity).
//!
//! This crate is intentionally decoupled from HTTP and storage. Credential
//! issuance lives elsewhere; this crate only verifies tokens and resolves the
//! acting identity together with its authorization level.

pub mod actor;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use actor::Actor;
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
