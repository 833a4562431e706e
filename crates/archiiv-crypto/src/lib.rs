//! Cryptographic primitives for Archiiv.
//!
//! Provides Ed25519-signed session tokens with expiry and a fixed-length
//! password digest with constant-time comparison.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod digest;
pub mod error;
pub mod token;

pub use digest::PasswordDigest;
pub use error::TokenError;
pub use token::{
    sign, sign_at, verify, verify_at, TokenPayload, TokenSecret, DEFAULT_TOKEN_MAX_AGE,
    MAX_CLOCK_SKEW,
};
