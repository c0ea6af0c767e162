//! `mensa-auth` — bearer-token authentication boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it decodes
//! and verifies tokens, nothing more. Token *minting* belongs to the
//! external identity provider and is out of scope.

pub mod claims;
pub mod validator;

pub use claims::{OrderClaims, TokenError};
pub use validator::{Hs256JwtValidator, JwtValidator};
