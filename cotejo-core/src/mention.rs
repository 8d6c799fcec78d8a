//! Mentions: single occurrences of an entity reference in text.

use crate::document::{Gender, Number, Person, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Person,
    Location,
    Object,
    Misc,
}

impl EntityKind {
    /// All kinds, in tie-break order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Person,
        EntityKind::Location,
        EntityKind::Object,
        EntityKind::Misc,
    ];

    /// Map a tagger label (`PER`, `LOC`, `ORG`, ...) to a coarse kind.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "PER" | "PERSON" | "PERS" => Some(EntityKind::Person),
            "LOC" | "LOCATION" | "GPE" | "FAC" => Some(EntityKind::Location),
            "OBJ" | "OBJECT" | "PRODUCT" => Some(EntityKind::Object),
            "MISC" | "ORG" | "ORGANIZATION" | "EVENT" | "WORK_OF_ART" => Some(EntityKind::Misc),
            _ => None,
        }
    }

    /// Kinds that may denote the same referent (MISC is a catch-all).
    #[must_use]
    pub fn compatible(self, other: EntityKind) -> bool {
        self == other || self == EntityKind::Misc || other == EntityKind::Misc
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Person => "PERSON",
            EntityKind::Location => "LOCATION",
            EntityKind::Object => "OBJECT",
            EntityKind::Misc => "MISC",
        };
        f.write_str(s)
    }
}

/// Surface form of a mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionForm {
    /// Proper name ("María Sánchez").
    Proper,
    /// Definite noun phrase ("la mujer").
    DefiniteNp,
    /// Demonstrative ("aquella", "este hombre").
    Demonstrative,
    /// Possessive determiner or pronoun ("su", "suyo").
    Possessive,
    /// Personal pronoun ("ella", "lo").
    Pronoun,
    /// Omitted subject recovered from verb morphology.
    Zero,
}

impl MentionForm {
    /// Priority when choosing a chain's representative mention.
    #[must_use]
    pub fn specificity(self) -> i8 {
        match self {
            MentionForm::Proper => 4,
            MentionForm::DefiniteNp => 3,
            MentionForm::Demonstrative => 2,
            MentionForm::Possessive => 1,
            MentionForm::Pronoun => 0,
            MentionForm::Zero => -1,
        }
    }

    /// Anaphoric forms need an antecedent to denote anything.
    #[must_use]
    pub fn is_anaphoric(self) -> bool {
        matches!(
            self,
            MentionForm::Pronoun | MentionForm::Possessive | MentionForm::Zero | MentionForm::Demonstrative
        )
    }

    /// Forms that can name an entity on their own.
    #[must_use]
    pub fn is_nominal(self) -> bool {
        matches!(self, MentionForm::Proper | MentionForm::DefiniteNp)
    }
}

/// Stable identifier of a mention within one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MentionId(pub u32);

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// One voter's support for a mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteSource {
    /// Voter name ("transformer", "gazetteer", ...).
    pub voter: String,
    /// The voter's own confidence.
    pub confidence: f64,
}

/// A single occurrence of an entity reference.
///
/// Immutable once created: later phases refer to mentions by [`MentionId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: MentionId,
    pub span: Span,
    pub text: String,
    pub kind: EntityKind,
    pub form: MentionForm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
    /// Chapter number.
    pub chapter: u32,
    /// Global sentence index.
    pub sentence: usize,
    /// Global paragraph index.
    pub paragraph: usize,
    /// Index of the head token within the sentence.
    pub head_token: usize,
    /// Voters that proposed this mention.
    #[serde(default)]
    pub provenance: Vec<VoteSource>,
    /// Combined confidence.
    pub confidence: f64,
}

impl Mention {
    /// Names of the voters that proposed this mention.
    pub fn voters(&self) -> impl Iterator<Item = &str> {
        self.provenance.iter().map(|v| v.voter.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(EntityKind::from_label("per"), Some(EntityKind::Person));
        assert_eq!(EntityKind::from_label("GPE"), Some(EntityKind::Location));
        assert_eq!(EntityKind::from_label("ORG"), Some(EntityKind::Misc));
        assert_eq!(EntityKind::from_label("DATE"), None);
    }

    #[test]
    fn test_kind_compat() {
        assert!(EntityKind::Person.compatible(EntityKind::Misc));
        assert!(!EntityKind::Person.compatible(EntityKind::Location));
    }

    #[test]
    fn test_form_priority() {
        assert!(MentionForm::Proper.specificity() > MentionForm::DefiniteNp.specificity());
        assert!(MentionForm::Pronoun.specificity() > MentionForm::Zero.specificity());
        assert!(MentionForm::Zero.is_anaphoric());
        assert!(!MentionForm::Proper.is_anaphoric());
    }
}
