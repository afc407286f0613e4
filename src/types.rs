//! Core identifier types for trellis.
//!
//! Foundation types used throughout the engine: session identifiers,
//! revision identifiers, and trunk sequence numbers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A validated editing-session identifier.
///
/// Session names must be lowercase alphanumeric with hyphens, 1–64
/// characters. Examples: `alice`, `peer-2`, `replica-west-1`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// The maximum length of a session identifier.
    pub const MAX_LEN: usize = 64;

    /// Create a new `SessionId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty, too long, or contains invalid
    /// characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the session identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason: "session id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason: format!(
                    "session id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if s.starts_with('-') || s.ends_with('-') {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason: "session id must not start or end with a hyphen".to_owned(),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason:
                    "session id must contain only lowercase letters (a-z), digits (0-9), and hyphens (-)"
                        .to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// RevisionId
// ---------------------------------------------------------------------------

/// An opaque, unique revision identifier attached to every commit.
///
/// The engine never interprets revision contents; it only compares them for
/// equality. Uniqueness across sessions is the caller's responsibility
/// (typically `<session>:<counter>`). Validated to be non-empty, at most 128
/// characters, and free of whitespace so revisions survive serialization
/// unambiguously.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RevisionId(String);

impl RevisionId {
    /// The maximum length of a revision identifier.
    pub const MAX_LEN: usize = 128;

    /// Create a new `RevisionId`, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains whitespace.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the revision identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::RevisionId,
                value: s.to_owned(),
                reason: "revision id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::RevisionId,
                value: s.to_owned(),
                reason: format!(
                    "revision id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(ValidationError {
                kind: ErrorKind::RevisionId,
                value: s.to_owned(),
                reason: "revision id must not contain whitespace".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RevisionId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RevisionId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<RevisionId> for String {
    fn from(id: RevisionId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// SequenceNumber
// ---------------------------------------------------------------------------

/// A trunk position assigned by the ordering authority.
///
/// Sequence numbers are non-decreasing along the trunk: batched delivery may
/// assign the same number to several commits, in which case the order of
/// presentation is authoritative.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence number of the trunk origin, before any commit is
    /// accepted.
    pub const ZERO: Self = Self(0);

    /// Return the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// The kind of value that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A [`SessionId`] validation error.
    SessionId,
    /// A [`RevisionId`] validation error.
    RevisionId,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionId => write!(f, "SessionId"),
            Self::RevisionId => write!(f, "RevisionId"),
        }
    }
}

/// A validation error for trellis identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {}: {:?} — {}",
            self.kind, self.value, self.reason
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- SessionId --

    #[test]
    fn session_id_valid_simple() {
        let id = SessionId::new("alice").unwrap();
        assert_eq!(id.as_str(), "alice");
    }

    #[test]
    fn session_id_valid_mixed() {
        assert!(SessionId::new("peer-west-2").is_ok());
    }

    #[test]
    fn session_id_rejects_empty() {
        let err = SessionId::new("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SessionId);
    }

    #[test]
    fn session_id_rejects_uppercase() {
        assert!(SessionId::new("Alice").is_err());
    }

    #[test]
    fn session_id_rejects_underscore() {
        assert!(SessionId::new("peer_1").is_err());
    }

    #[test]
    fn session_id_rejects_leading_hyphen() {
        assert!(SessionId::new("-peer").is_err());
    }

    #[test]
    fn session_id_rejects_trailing_hyphen() {
        assert!(SessionId::new("peer-").is_err());
    }

    #[test]
    fn session_id_rejects_too_long() {
        let long = "a".repeat(65);
        assert!(SessionId::new(&long).is_err());
    }

    #[test]
    fn session_id_max_length_ok() {
        let max = "a".repeat(64);
        assert!(SessionId::new(&max).is_ok());
    }

    #[test]
    fn session_id_display() {
        let id = SessionId::new("peer-1").unwrap();
        assert_eq!(format!("{id}"), "peer-1");
    }

    #[test]
    fn session_id_serde_roundtrip() {
        let id = SessionId::new("replica-3").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"replica-3\"");
        let decoded: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn session_id_serde_rejects_invalid() {
        assert!(serde_json::from_str::<SessionId>("\"BAD ID\"").is_err());
    }

    // -- RevisionId --

    #[test]
    fn revision_id_valid() {
        let rev = RevisionId::new("alice:42").unwrap();
        assert_eq!(rev.as_str(), "alice:42");
    }

    #[test]
    fn revision_id_rejects_empty() {
        let err = RevisionId::new("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RevisionId);
    }

    #[test]
    fn revision_id_rejects_whitespace() {
        assert!(RevisionId::new("rev 1").is_err());
        assert!(RevisionId::new("rev\t1").is_err());
        assert!(RevisionId::new("rev\n1").is_err());
    }

    #[test]
    fn revision_id_rejects_too_long() {
        let long = "r".repeat(129);
        assert!(RevisionId::new(&long).is_err());
    }

    #[test]
    fn revision_id_max_length_ok() {
        let max = "r".repeat(128);
        assert!(RevisionId::new(&max).is_ok());
    }

    #[test]
    fn revision_id_from_str() {
        let rev: RevisionId = "peer-1:7".parse().unwrap();
        assert_eq!(rev.as_str(), "peer-1:7");
    }

    #[test]
    fn revision_id_serde_roundtrip() {
        let rev = RevisionId::new("alice:1").unwrap();
        let json = serde_json::to_string(&rev).unwrap();
        let decoded: RevisionId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, rev);
    }

    #[test]
    fn revision_id_serde_rejects_invalid() {
        assert!(serde_json::from_str::<RevisionId>("\"has space\"").is_err());
    }

    // -- SequenceNumber --

    #[test]
    fn sequence_number_ordering() {
        assert!(SequenceNumber(1) < SequenceNumber(2));
        assert_eq!(SequenceNumber::ZERO, SequenceNumber(0));
    }

    #[test]
    fn sequence_number_display() {
        assert_eq!(format!("{}", SequenceNumber(17)), "17");
    }

    #[test]
    fn sequence_number_serde_transparent() {
        let json = serde_json::to_string(&SequenceNumber(5)).unwrap();
        assert_eq!(json, "5");
        let decoded: SequenceNumber = serde_json::from_str("5").unwrap();
        assert_eq!(decoded, SequenceNumber(5));
    }

    // -- ValidationError --

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            kind: ErrorKind::RevisionId,
            value: "bad id".to_owned(),
            reason: "must not contain whitespace".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("RevisionId"));
        assert!(msg.contains("bad id"));
        assert!(msg.contains("whitespace"));
    }
}
