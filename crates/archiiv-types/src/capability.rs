use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A permission a user may hold on a record.
///
/// The set is closed: every operation that reaches the store is guarded by
/// exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// List children, read sections.
    Read,
    /// Create children, mount/unmount, write data sections.
    Write,
    /// Everything, including rewriting the record's metadata.
    Owner,
}

impl Capability {
    /// Whether holding `self` is sufficient for an operation requiring `required`.
    pub fn satisfies(self, required: Capability) -> bool {
        self == Capability::Owner || self == required
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

impl FromStr for Capability {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "owner" => Ok(Self::Owner),
            other => Err(TypeError::UnknownCapability(other.to_string())),
        }
    }
}

/// The capabilities one user holds on one record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding only [`Capability::Owner`].
    pub fn owner() -> Self {
        Self::from_iter([Capability::Owner])
    }

    pub fn insert(&mut self, cap: Capability) -> bool {
        self.0.insert(cap)
    }

    pub fn remove(&mut self, cap: Capability) -> bool {
        self.0.remove(&cap)
    }

    /// Whether any held capability satisfies `required`.
    pub fn allows(&self, required: Capability) -> bool {
        self.0.iter().any(|held| held.satisfies(required))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
