use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

/// Tokens older than this are rejected unless the caller says otherwise.
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How far in the future a token's issue time may lie before it is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

/// Server-side secret from which the token signing key is derived.
///
/// The secret is a 32-byte Ed25519 seed, exchanged as hex text (for example
/// through the `ARCHIIV_SECRET` environment variable).
pub struct TokenSecret(ed25519_dalek::SigningKey);

impl TokenSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte seed.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_hex(s: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            TokenError::InvalidSecret(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_bytes(seed))
    }

    /// Hex-encoded seed.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenSecret(<redacted>)")
    }
}

/// The signed part of a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub username: String,
    /// Issue time in milliseconds since the Unix epoch.
    pub issued_at_ms: i64,
    pub nonce: u64,
}

impl TokenPayload {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at_ms)
    }
}

/// Wire form of a token: payload plus detached signature.
#[derive(Serialize, Deserialize)]
struct SignedToken {
    payload: TokenPayload,
    #[serde(with = "signature_serde")]
    signature: ed25519_dalek::Signature,
}

fn payload_bytes(payload: &TokenPayload) -> Result<Vec<u8>, TokenError> {
    bincode::serialize(payload).map_err(|e| TokenError::Encoding(e.to_string()))
}

/// Issue a session token for `username`.
pub fn sign(username: &str, secret: &TokenSecret) -> Result<String, TokenError> {
    sign_at(username, secret, Utc::now())
}

/// Issue a session token with an explicit issue time.
pub fn sign_at(
    username: &str,
    secret: &TokenSecret,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    use ed25519_dalek::Signer;

    let payload = TokenPayload {
        username: username.to_string(),
        issued_at_ms: issued_at.timestamp_millis(),
        nonce: rand::thread_rng().gen(),
    };
    let message = payload_bytes(&payload)?;
    let token = SignedToken {
        signature: secret.0.sign(&message),
        payload,
    };
    let raw = bincode::serialize(&token).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(hex::encode(raw))
}

/// Verify a session token and return the username it was issued for.
pub fn verify(token: &str, secret: &TokenSecret, max_age: Duration) -> Result<String, TokenError> {
    verify_at(token, secret, max_age, Utc::now())
}

/// Verify a session token against an explicit clock.
pub fn verify_at(
    token: &str,
    secret: &TokenSecret,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    use ed25519_dalek::Verifier;

    let raw = hex::decode(token.trim()).map_err(|e| TokenError::Malformed(e.to_string()))?;
    let decoded: SignedToken =
        bincode::deserialize(&raw).map_err(|e| TokenError::Malformed(e.to_string()))?;

    let message = payload_bytes(&decoded.payload)?;
    secret
        .0
        .verifying_key()
        .verify(&message, &decoded.signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let age_ms = i128::from(now.timestamp_millis()) - i128::from(decoded.payload.issued_at_ms);
    if age_ms < -(MAX_CLOCK_SKEW.as_millis() as i128) {
        return Err(TokenError::NotYetValid);
    }
    if age_ms > max_age.as_millis() as i128 {
        return Err(TokenError::Expired);
    }

    Ok(decoded.payload.username)
}

mod signature_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(sig: &ed25519_dalek::Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&sig.to_bytes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ed25519_dalek::Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 64-byte signature"))?;
        Ok(ed25519_dalek::Signature::from_bytes(&arr))
    }
}
