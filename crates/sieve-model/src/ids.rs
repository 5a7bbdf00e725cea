//! Identifiers
//!
//! ULID-backed so ids sort by creation time in logs and event stores.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a fresh id
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Raw 16-byte form, used in digests
            #[inline]
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ulid_id!(
    /// One analysis run
    RunId
);

ulid_id!(
    /// One disposable scoring worker
    WorkerId
);

ulid_id!(
    /// One submitted document
    DocumentId
);

/// Criterion identifier, as written in the rubric
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriterionId(pub String);

impl CriterionId {
    /// Wrap a rubric id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CriterionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CriterionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fragment identifier: criterion plus pass number
///
/// Derived, not random, so two dry runs over the same input name their
/// fragments identically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentId {
    /// Owning criterion
    pub criterion: CriterionId,
    /// Pass index for multi-pass criteria
    pub pass: u16,
}

impl FragmentId {
    /// Create a fragment id
    #[inline]
    #[must_use]
    pub fn new(criterion: CriterionId, pass: u16) -> Self {
        Self { criterion, pass }
    }
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.criterion, self.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn fragment_id_display() {
        let id = FragmentId::new(CriterionId::new("intro"), 2);
        assert_eq!(id.to_string(), "intro#2");
    }

    #[test]
    fn criterion_id_serializes_as_string() {
        let json = serde_json::to_string(&CriterionId::new("grammar")).unwrap();
        assert_eq!(json, "\"grammar\"");
    }
}
