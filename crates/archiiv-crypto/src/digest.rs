use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const DOMAIN: &str = "archiiv-password-v1";

/// Fixed-length digest of a user's password.
///
/// The digest is a domain-separated BLAKE3 hash over the username and the
/// password, so two users with the same password store different digests.
/// Equality is constant-time (delegated to [`blake3::Hash`]).
#[derive(Clone, Copy)]
pub struct PasswordDigest(blake3::Hash);

impl PasswordDigest {
    /// Digest a password for the given user.
    pub fn derive(username: &str, password: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN.as_bytes());
        hasher.update(b":");
        hasher.update(&(username.len() as u64).to_le_bytes());
        hasher.update(username.as_bytes());
        hasher.update(password.as_bytes());
        Self(hasher.finalize())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Check a candidate password against this digest.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        *self == Self::derive(username, password)
    }
}

impl PartialEq for PasswordDigest {
    fn eq(&self, other: &Self) -> bool {
        // blake3::Hash compares in constant time.
        self.0 == other.0
    }
}

impl Eq for PasswordDigest {}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PasswordDigest({}...)", &self.to_hex()[..8])
    }
}

impl Serialize for PasswordDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PasswordDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
