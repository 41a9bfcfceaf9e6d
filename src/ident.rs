//! Reversible mapping between human readable concept/tag names and the URL-safe identifiers
//! used inside storage URIs.
//!
//! Identifiers are the UTF-8 percent-encoding of the name, leaving only the RFC 3986
//! unreserved characters (`A-Z a-z 0-9 - . _ ~`) as-is. Hex digits are always upper case, so
//! every name has exactly one identifier and [`decode`] rejects any identifier that
//! [`encode`] could not have produced.
//!
//! Accepted names are non-empty, contain no control characters, and are not one of the
//! path-segment specials `.` / `..`.
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt::{Display, Formatter};

use crate::error::ConceptError;

const ID_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Concept and tag identifiers live in independent namespaces: the same name yields the same
/// identifier string in both, but they are joined onto different workspace prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Concept,
    Tag,
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Namespace::Concept => write!(f, "concept"),
            Namespace::Tag => write!(f, "tag"),
        }
    }
}

pub fn validate_name(name: &str) -> Result<(), ConceptError> {
    if name.is_empty() {
        return Err(ConceptError::InvalidName("name is empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(ConceptError::InvalidName(format!(
            "'{name}' is reserved as a path segment"
        )));
    }
    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(ConceptError::InvalidName(format!(
            "{name:?} contains the control character {c:?}"
        )));
    }
    Ok(())
}

/// Encode a name into its identifier.
pub fn encode(name: &str) -> Result<String, ConceptError> {
    validate_name(name)?;
    Ok(utf8_percent_encode(name, ID_ENCODE_SET).to_string())
}

/// Decode an identifier back into the name it was produced from.
pub fn decode(id: &str) -> Result<String, ConceptError> {
    let name = percent_decode_str(id)
        .decode_utf8()
        .map_err(|e| ConceptError::InvalidName(format!("identifier '{id}' is not UTF-8: {e}")))?
        .into_owned();
    // Only canonical identifiers decode; "%41" and "A" must not both map to "A".
    if encode(&name)? != id {
        return Err(ConceptError::InvalidName(format!(
            "'{id}' is not a canonical identifier"
        )));
    }
    Ok(name)
}
