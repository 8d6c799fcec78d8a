//! Factor scorer for dropped subjects.
//!
//! A zero mention has no surface form to compare, so its antecedent is scored
//! from five factors:
//!
//! | Factor | Weight | Signal |
//! |--------|--------|--------|
//! | recency | 0.30 | sentence distance |
//! | saliency | 0.25 | grammatical role and frequency of the candidate |
//! | gender | 0.20 | agreement with a predicative adjective/participle |
//! | discourse | 0.15 | same paragraph, coordinated clause continuity |
//! | number | 0.10 | verb number agreement |

use cotejo_coalesce::normalize_alias;
use cotejo_core::{DepRel, Document, Mention};
use serde::{Deserialize, Serialize};

/// Factor weights; they sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProDropWeights {
    pub recency: f64,
    pub saliency: f64,
    pub gender: f64,
    pub discourse: f64,
    pub number: f64,
}

impl Default for ProDropWeights {
    fn default() -> Self {
        Self {
            recency: 0.30,
            saliency: 0.25,
            gender: 0.20,
            discourse: 0.15,
            number: 0.10,
        }
    }
}

/// Scores zero-subject antecedents.
#[derive(Debug, Clone, Default)]
pub struct ProDropScorer {
    weights: ProDropWeights,
}

impl ProDropScorer {
    /// Scorer with custom weights.
    #[must_use]
    pub fn with_weights(weights: ProDropWeights) -> Self {
        Self { weights }
    }

    /// Score `candidate` as antecedent of the zero mention `zero`, in [0, 1].
    #[must_use]
    pub fn score(&self, doc: &Document, zero: &Mention, candidate: &Mention, window: &[Mention]) -> f64 {
        let w = &self.weights;
        let s = w.recency * recency(zero, candidate)
            + w.saliency * saliency(doc, candidate, zero, window)
            + w.gender * agreement(zero.gender, candidate.gender)
            + w.discourse * discourse(doc, zero, candidate)
            + w.number * agreement(zero.number, candidate.number);
        s.clamp(0.0, 1.0)
    }
}

fn recency(anaphor: &Mention, candidate: &Mention) -> f64 {
    match anaphor.sentence.saturating_sub(candidate.sentence) {
        0 => 1.0,
        1 => 0.7,
        _ => 0.4,
    }
}

/// 1.0 for explicit agreement, 0.5 when either side is unknown, 0 on conflict.
pub(crate) fn agreement<T: PartialEq>(a: Option<T>, b: Option<T>) -> f64 {
    match (a, b) {
        (Some(x), Some(y)) if x == y => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    }
}

/// Role of the candidate in its clause: subjects are the most salient.
pub(crate) fn role_score(doc: &Document, m: &Mention) -> f64 {
    let Some(tok) = doc
        .sentence(m.sentence)
        .and_then(|s| s.tokens.get(m.head_token))
    else {
        return 0.3;
    };
    if tok.dep.is_subject() {
        1.0
    } else if tok.dep == DepRel::Obj {
        0.6
    } else {
        0.3
    }
}

/// How often the candidate's name was mentioned before the anaphor, capped at 5.
pub(crate) fn frequency(candidate: &Mention, before: &Mention, window: &[Mention]) -> f64 {
    let key = normalize_alias(&candidate.text);
    if key.is_empty() {
        return 0.0;
    }
    let n = window
        .iter()
        .filter(|m| m.form.is_nominal() && m.span.start < before.span.start)
        .filter(|m| normalize_alias(&m.text) == key)
        .count();
    (n.min(5) as f64) / 5.0
}

fn saliency(doc: &Document, candidate: &Mention, zero: &Mention, window: &[Mention]) -> f64 {
    0.6 * role_score(doc, candidate) + 0.4 * frequency(candidate, zero, window)
}

fn discourse(doc: &Document, zero: &Mention, candidate: &Mention) -> f64 {
    if zero.paragraph != candidate.paragraph {
        return 0.5;
    }
    // "María entró y Ø se sentó": the zero's verb is a conjunct of the
    // candidate's verb.
    if zero.sentence == candidate.sentence {
        if let Some(s) = doc.sentence(zero.sentence) {
            let verb = &s.tokens[zero.head_token];
            let cand_gov = s.tokens.get(candidate.head_token).and_then(|t| t.head);
            if verb.dep == DepRel::Conj && verb.head == cand_gov && cand_gov.is_some() {
                return 1.0;
            }
        }
    }
    0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let w = ProDropWeights::default();
        let total = w.recency + w.saliency + w.gender + w.discourse + w.number;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_agreement() {
        assert_eq!(agreement(Some(1), Some(1)), 1.0);
        assert_eq!(agreement(Some(1), Some(2)), 0.0);
        assert_eq!(agreement::<u8>(None, Some(2)), 0.5);
    }
}
