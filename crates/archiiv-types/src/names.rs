//! Section and storage-file name validation.
//!
//! Records and their sections live side by side in one flat directory:
//!
//! - `<id>`: the record descriptor
//! - `<id>.<section>`: a section byte stream
//!
//! Valid section names:
//! - Must be non-empty
//! - Must consist only of ASCII letters, digits, `_` and `-`
//!
//! This leaves no room for `/`, `.` or any other character that could point
//! a file name outside the storage directory.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::{RecordId, RECORD_ID_LEN};

/// Separator between a record id and a section name in a file name.
pub const SECTION_SEPARATOR: char = '.';

fn is_section_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

/// A validated section name.
///
/// # Examples
///
/// ```
/// use archiiv_types::SectionName;
///
/// assert!(SectionName::new("data").is_ok());
/// assert!(SectionName::new("thumb_256-v2").is_ok());
/// assert!(SectionName::new("").is_err());
/// assert!(SectionName::new("../etc/passwd").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SectionName(String);

impl SectionName {
    /// The section holding a file's payload.
    pub const DATA: &'static str = "data";
    /// The section holding a record's JSON metadata (owner, permissions).
    pub const META: &'static str = "meta";
    /// The section holding a preview image.
    pub const THUMB: &'static str = "thumb";

    /// Validate and wrap a section name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidSectionName {
                value: name,
                reason: "section name must not be empty".into(),
            });
        }
        if let Some(ch) = name.chars().find(|ch| !is_section_char(*ch)) {
            return Err(TypeError::InvalidSectionName {
                reason: format!("contains forbidden character: {ch:?}"),
                value: name,
            });
        }
        Ok(Self(name))
    }

    /// The `data` section.
    pub fn data() -> Self {
        Self(Self::DATA.to_string())
    }

    /// The `meta` section.
    pub fn meta() -> Self {
        Self(Self::META.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SectionName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SectionName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SectionName> for String {
    fn from(name: SectionName) -> Self {
        name.0
    }
}

impl AsRef<str> for SectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectionName({})", self.0)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entry of the flat storage directory, classified by its name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FileName {
    /// `<id>`: the JSON descriptor of a record.
    Descriptor(RecordId),
    /// `<id>.<section>`: a section byte stream of a record.
    Section(RecordId, SectionName),
}

impl FileName {
    /// Classify a directory entry name, rejecting anything that matches
    /// neither the descriptor nor the section grammar.
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        let garbage = || TypeError::InvalidFileName(name.to_string());

        // Slicing at a fixed byte offset is only sound on a char boundary.
        if name.len() < RECORD_ID_LEN || !name.is_char_boundary(RECORD_ID_LEN) {
            return Err(garbage());
        }
        let (id_part, rest) = name.split_at(RECORD_ID_LEN);
        let id = RecordId::parse(id_part).map_err(|_| garbage())?;

        if rest.is_empty() {
            return Ok(Self::Descriptor(id));
        }
        let section = rest
            .strip_prefix(SECTION_SEPARATOR)
            .ok_or_else(garbage)?;
        let section = SectionName::new(section).map_err(|_| garbage())?;
        Ok(Self::Section(id, section))
    }

    /// The record this file belongs to.
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Descriptor(id) | Self::Section(id, _) => *id,
        }
    }

    /// Render the on-disk file name.
    pub fn render(&self) -> String {
        match self {
            Self::Descriptor(id) => id.to_string(),
            Self::Section(id, section) => format!("{id}{SECTION_SEPARATOR}{section}"),
        }
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "38b4183d-4df4-43dd-9495-1847083a3662";

    #[test]
    fn valid_section_names() {
        assert!(SectionName::new("data").is_ok());
        assert!(SectionName::new("meta").is_ok());
        assert!(SectionName::new("THUMB").is_ok());
        assert!(SectionName::new("a_b-c9").is_ok());
    }

    #[test]
    fn reject_empty_section() {
        assert!(SectionName::new("").is_err());
    }

    #[test]
    fn reject_path_characters() {
        assert!(SectionName::new("../etc/passwd").is_err());
        assert!(SectionName::new("a/b").is_err());
        assert!(SectionName::new("a.b").is_err());
        assert!(SectionName::new("a\\b").is_err());
        assert!(SectionName::new("has space").is_err());
        assert!(SectionName::new("é").is_err());
    }

    #[test]
    fn parse_descriptor_name() {
        let parsed = FileName::parse(SAMPLE).unwrap();
        assert!(matches!(parsed, FileName::Descriptor(_)));
        assert_eq!(parsed.render(), SAMPLE);
    }

    #[test]
    fn parse_section_name() {
        let name = format!("{SAMPLE}.data");
        let parsed = FileName::parse(&name).unwrap();
        match &parsed {
            FileName::Section(id, section) => {
                assert_eq!(id.to_string(), SAMPLE);
                assert_eq!(section.as_str(), "data");
            }
            other => panic!("expected section, got {other:?}"),
        }
        assert_eq!(parsed.render(), name);
    }

    #[test]
    fn reject_garbage_file_names() {
        assert!(FileName::parse("users.json").is_err());
        assert!(FileName::parse(".DS_Store").is_err());
        assert!(FileName::parse(&format!("{SAMPLE}.")).is_err());
        assert!(FileName::parse(&format!("{SAMPLE}.a.b")).is_err());
        assert!(FileName::parse(&format!("{SAMPLE}~")).is_err());
        assert!(FileName::parse(&format!("{SAMPLE}.tmp~")).is_err());
    }

    #[test]
    fn reject_multibyte_at_boundary() {
        // 35 ASCII bytes followed by a two-byte char straddling offset 36.
        let name = format!("{}é", &SAMPLE[..35]);
        assert!(FileName::parse(&name).is_err());
    }

    #[test]
    fn section_serde_validates() {
        assert!(serde_json::from_str::<SectionName>("\"data\"").is_ok());
        assert!(serde_json::from_str::<SectionName>("\"../x\"").is_err());
    }

    proptest! {
        #[test]
        fn any_valid_section_round_trips_through_file_name(section in "[A-Za-z0-9_-]{1,32}") {
            let id = RecordId::new();
            let file = FileName::Section(id, SectionName::new(section.clone()).unwrap());
            let parsed = FileName::parse(&file.render()).unwrap();
            prop_assert_eq!(parsed, file);
        }

        #[test]
        fn section_names_never_contain_separators(name in "\\PC*") {
            if let Ok(section) = SectionName::new(name) {
                prop_assert!(!section.as_str().contains('/'));
                prop_assert!(!section.as_str().contains('.'));
            }
        }
    }
}
