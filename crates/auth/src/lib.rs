//! `bankledger-auth`: caller identity at the service boundary.
//!
//! Token *issuance*, registration, and passwords live elsewhere; this crate only
//! verifies a bearer token and yields the authenticated `UserId`.

pub mod claims;
pub mod jwt;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
