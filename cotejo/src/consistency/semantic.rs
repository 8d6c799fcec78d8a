//! Semantic-distance comparator for free-text attributes.
//!
//! Personality values are checked against the antonym table first. Otherwise
//! each value is embedded together with its whole paragraph, since
//! characterization depends on wider context than binding does.

use super::tables;
use super::Conflict;
use crate::signals::{cosine, Embedder};
use crate::Result;
use cotejo_core::{AttributeAssertion, Document, InconsistencyKind};
use std::collections::BTreeSet;

/// Conflict for a similarity: close texts barely conflict.
fn from_similarity(sim: f64) -> f64 {
    if sim >= 0.7 {
        0.1
    } else if sim >= 0.5 {
        0.4
    } else if sim >= 0.3 {
        0.6
    } else {
        0.8
    }
}

/// Text embedded for an assertion: the value, then its paragraph.
#[must_use]
pub fn context_text(doc: &Document, a: &AttributeAssertion) -> String {
    let paragraph = doc
        .paragraph_span(a.paragraph)
        .map_or(a.excerpt.as_str(), |span| doc.slice(span));
    format!("{}. {}", a.value, paragraph)
}

/// Compare two free-text assertions.
pub fn compare(
    doc: &Document,
    a: &AttributeAssertion,
    b: &AttributeAssertion,
    embedder: Option<&dyn Embedder>,
) -> Result<Option<Conflict>> {
    if tables::synonyms(a.key, &a.normalized, &b.normalized) {
        return Ok(None);
    }
    if tables::opposed(a.key, &a.normalized, &b.normalized) {
        return Ok(Some(Conflict {
            kind: InconsistencyKind::Antonym,
            score: 0.95,
            reason: "son rasgos opuestos".into(),
        }));
    }
    let score = match embedder {
        Some(e) => {
            let va = e.embed(&context_text(doc, a))?;
            let vb = e.embed(&context_text(doc, b))?;
            from_similarity(cosine(&va, &vb))
        }
        None => {
            if char_overlap(&a.normalized, &b.normalized) < 0.3 {
                0.6
            } else {
                0.4
            }
        }
    };
    Ok(Some(Conflict {
        kind: InconsistencyKind::SemanticDistance,
        score,
        reason: "las descripciones difieren".into(),
    }))
}

/// Jaccard overlap of the character sets.
fn char_overlap(a: &str, b: &str) -> f64 {
    let sa: BTreeSet<char> = a.chars().filter(|c| c.is_alphanumeric()).collect();
    let sb: BTreeSet<char> = b.chars().filter(|c| c.is_alphanumeric()).collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 1.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_bands() {
        assert!((from_similarity(0.9) - 0.1).abs() < 1e-9);
        assert!((from_similarity(0.55) - 0.4).abs() < 1e-9);
        assert!((from_similarity(0.35) - 0.6).abs() < 1e-9);
        assert!((from_similarity(-0.2) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_char_overlap() {
        assert!(char_overlap("herrero", "herrera") > 0.5);
        assert!(char_overlap("médico", "sastre") < 0.3);
    }
}
