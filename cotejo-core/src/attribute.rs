//! Attribute keys and assertions bound to entities.

use crate::document::Span;
use crate::entity::EntityId;
use crate::mention::MentionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    Physical,
    Psychological,
    Social,
}

/// What an assertion describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    EyeColor,
    HairColor,
    HairType,
    Age,
    Height,
    Build,
    Skin,
    FacialHair,
    DistinctiveFeature,
    Personality,
    Profession,
    Nationality,
    Other,
}

impl AttributeKey {
    /// All keys.
    pub const ALL: [AttributeKey; 13] = [
        AttributeKey::EyeColor,
        AttributeKey::HairColor,
        AttributeKey::HairType,
        AttributeKey::Age,
        AttributeKey::Height,
        AttributeKey::Build,
        AttributeKey::Skin,
        AttributeKey::FacialHair,
        AttributeKey::DistinctiveFeature,
        AttributeKey::Personality,
        AttributeKey::Profession,
        AttributeKey::Nationality,
        AttributeKey::Other,
    ];

    /// Category of the key.
    #[must_use]
    pub fn category(self) -> AttributeCategory {
        match self {
            AttributeKey::Personality => AttributeCategory::Psychological,
            AttributeKey::Profession | AttributeKey::Nationality => AttributeCategory::Social,
            _ => AttributeCategory::Physical,
        }
    }

    /// Stable snake_case name (used in fingerprints and weights).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKey::EyeColor => "eye_color",
            AttributeKey::HairColor => "hair_color",
            AttributeKey::HairType => "hair_type",
            AttributeKey::Age => "age",
            AttributeKey::Height => "height",
            AttributeKey::Build => "build",
            AttributeKey::Skin => "skin",
            AttributeKey::FacialHair => "facial_hair",
            AttributeKey::DistinctiveFeature => "distinctive_feature",
            AttributeKey::Personality => "personality",
            AttributeKey::Profession => "profession",
            AttributeKey::Nationality => "nationality",
            AttributeKey::Other => "other",
        }
    }

    /// Parse the snake_case name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Spanish label for explanations.
    #[must_use]
    pub fn label_es(self) -> &'static str {
        match self {
            AttributeKey::EyeColor => "color de ojos",
            AttributeKey::HairColor => "color de pelo",
            AttributeKey::HairType => "tipo de pelo",
            AttributeKey::Age => "edad",
            AttributeKey::Height => "estatura",
            AttributeKey::Build => "complexión",
            AttributeKey::Skin => "piel",
            AttributeKey::FacialHair => "vello facial",
            AttributeKey::DistinctiveFeature => "rasgo distintivo",
            AttributeKey::Personality => "personalidad",
            AttributeKey::Profession => "profesión",
            AttributeKey::Nationality => "nacionalidad",
            AttributeKey::Other => "atributo",
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grammatical/narrative status of the sentence an assertion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Asserted,
    /// Comparison or simile ("ojos como el mar").
    Metaphorical,
    /// Conditional or subjunctive ("si fuera rubia").
    Hypothetical,
    /// Describes an earlier time ("de niño era rubio").
    Past,
}

impl Modality {
    /// Confidence multiplier applied to assertions of this modality.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Modality::Asserted => 1.0,
            Modality::Metaphorical => 0.5,
            Modality::Hypothetical => 0.6,
            Modality::Past => 0.8,
        }
    }
}

/// How the scope resolver reached the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    /// Genitive owner ("los ojos azules de Pedro").
    Genitive,
    /// Nominal subject of the clause.
    Subject,
    /// Head of an appositive or relative clause.
    Appositive,
    /// Carried over from a preceding sentence.
    Inherited,
    /// Named by the text generator and confirmed by scope.
    Generated,
}

/// Stable identifier of an assertion within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssertionId(pub u32);

impl fmt::Display for AssertionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// One statement of an attribute value about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub id: AssertionId,
    pub key: AttributeKey,
    /// Value as written ("azules").
    pub value: String,
    /// Normalized value ("azul").
    pub normalized: String,
    pub entity: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mention: Option<MentionId>,
    /// Span from the binding subject to the attribute.
    pub scope: Span,
    /// Span of the attribute phrase itself.
    pub span: Span,
    /// Sentence text around the attribute.
    pub excerpt: String,
    pub confidence: f64,
    pub chapter: u32,
    /// Global sentence index.
    pub sentence: usize,
    pub paragraph: usize,
    #[serde(default)]
    pub modality: Modality,
    pub source: AssignmentSource,
    /// Extraction methods that voted for this value.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<AssertionId>,
}

impl AttributeAssertion {
    /// Not yet superseded by a later correction.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_roundtrip() {
        for key in AttributeKey::ALL {
            assert_eq!(AttributeKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(AttributeKey::parse("shoe_size"), None);
    }

    #[test]
    fn test_modality_weights_never_exclude() {
        for m in [
            Modality::Asserted,
            Modality::Metaphorical,
            Modality::Hypothetical,
            Modality::Past,
        ] {
            assert!(m.weight() > 0.0 && m.weight() <= 1.0);
        }
    }
}
