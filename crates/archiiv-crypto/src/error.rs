/// Errors from session-token verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token could not be decoded.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The signature does not match the payload under this secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token is older than the allowed maximum age.
    #[error("token expired")]
    Expired,

    /// The token claims to be issued later than the clock allows.
    #[error("token issued in the future")]
    NotYetValid,

    /// The token could not be encoded.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// The secret is not a 32-byte hex seed.
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
}
