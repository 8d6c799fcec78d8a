//! Conflicts between attribute assertions of one entity.

use crate::attribute::{AssertionId, AttributeAssertion, AttributeKey};
use crate::document::Span;
use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Comparator family that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Values listed as incompatible in a categorical table.
    Antonym,
    /// Numeric ranges that cannot both hold given elapsed story time.
    NumericRange,
    /// Free-text values that are semantically far apart.
    SemanticDistance,
}

impl InconsistencyKind {
    /// Detector name, as used in voting weights and feedback.
    #[must_use]
    pub fn detector(self) -> &'static str {
        match self {
            InconsistencyKind::Antonym => "antonym",
            InconsistencyKind::NumericRange => "numeric_range",
            InconsistencyKind::SemanticDistance => "semantic_distance",
        }
    }
}

/// How urgently an editor should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Bucket a confidence value.
    #[must_use]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Severity::High
        } else if confidence >= 0.6 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Content hash identifying "the same" finding across re-analyses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the given parts (SHA-256, first 16 hex chars).
    #[must_use]
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
            hasher.update([0x1f]);
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..16].to_string())
    }

    /// Wrap an already computed fingerprint.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One side of a conflict, enough for the editor to jump to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excerpt {
    pub assertion: AssertionId,
    pub value: String,
    pub text: String,
    pub span: Span,
    pub chapter: u32,
    pub confidence: f64,
}

impl From<&AttributeAssertion> for Excerpt {
    fn from(a: &AttributeAssertion) -> Self {
        Self {
            assertion: a.id,
            value: a.value.clone(),
            text: a.excerpt.clone(),
            span: a.span,
            chapter: a.chapter,
            confidence: a.confidence,
        }
    }
}

/// A pair of assertions on one entity judged incompatible.
///
/// Derived data: recomputed on every pass, never edited directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub entity: EntityId,
    pub entity_name: String,
    pub key: AttributeKey,
    pub kind: InconsistencyKind,
    pub severity: Severity,
    pub confidence: f64,
    pub explanation: String,
    pub first: Excerpt,
    pub second: Excerpt,
    /// Attribute extraction methods behind either assertion.
    pub methods: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl Inconsistency {
    /// Fingerprint over kind, entity name, key and the unordered value pair.
    ///
    /// Positions and ids are left out so the fingerprint survives edits and
    /// re-numbering between runs.
    #[must_use]
    pub fn fingerprint_for(
        kind: InconsistencyKind,
        entity_name: &str,
        key: AttributeKey,
        value_a: &str,
        value_b: &str,
    ) -> Fingerprint {
        let (lo, hi) = if value_a <= value_b {
            (value_a, value_b)
        } else {
            (value_b, value_a)
        };
        let name = entity_name.to_lowercase();
        Fingerprint::from_parts([
            "attribute_inconsistency",
            kind.detector(),
            name.as_str(),
            key.as_str(),
            lo,
            hi,
        ])
    }

    /// Both values, in the order reported.
    #[must_use]
    pub fn values(&self) -> [&str; 2] {
        [&self.first.value, &self.second.value]
    }

    /// Detector responsible for the finding.
    #[must_use]
    pub fn detector(&self) -> &'static str {
        self.kind.detector()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = Inconsistency::fingerprint_for(
            InconsistencyKind::Antonym,
            "María Sánchez",
            AttributeKey::EyeColor,
            "azul",
            "verde",
        );
        let b = Inconsistency::fingerprint_for(
            InconsistencyKind::Antonym,
            "maría sánchez",
            AttributeKey::EyeColor,
            "verde",
            "azul",
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn test_fingerprint_distinguishes_keys() {
        let a = Inconsistency::fingerprint_for(
            InconsistencyKind::Antonym,
            "Ana",
            AttributeKey::EyeColor,
            "azul",
            "verde",
        );
        let b = Inconsistency::fingerprint_for(
            InconsistencyKind::Antonym,
            "Ana",
            AttributeKey::HairColor,
            "azul",
            "verde",
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_confidence(0.95), Severity::High);
        assert_eq!(Severity::from_confidence(0.65), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.2), Severity::Low);
    }
}
