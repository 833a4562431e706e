use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of the canonical hyphenated UUID text form.
pub const RECORD_ID_LEN: usize = 36;

/// Byte offsets of the dashes in the canonical text form.
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// Globally unique identifier of a record.
///
/// A `RecordId` is a random (v4) UUID. Its text form is always the canonical
/// lowercase hyphenated representation, which is also the name of the
/// record's descriptor file. Parsing is strict: braces, uppercase digits and
/// the simple (dash-less) form are rejected so that one record can never be
/// reached under two different file names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(uuid::Uuid);

impl RecordId {
    /// Allocate a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }

    /// Parse the canonical text form.
    ///
    /// ```
    /// use archiiv_types::RecordId;
    ///
    /// assert!(RecordId::parse("38b4183d-4df4-43dd-9495-1847083a3662").is_ok());
    /// assert!(RecordId::parse("../etc/passwd").is_err());
    /// assert!(RecordId::parse("38B4183D-4DF4-43DD-9495-1847083A3662").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidRecordId {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if s.len() != RECORD_ID_LEN {
            return Err(invalid("expected 36 characters"));
        }
        for (i, b) in s.bytes().enumerate() {
            if DASH_POSITIONS.contains(&i) {
                if b != b'-' {
                    return Err(invalid("expected '-' separator"));
                }
            } else if !matches!(b, b'0'..=b'9' | b'a'..=b'f') {
                return Err(invalid("expected lowercase hex digit"));
            }
        }

        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| invalid(&e.to_string()))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RecordId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.short_id())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
