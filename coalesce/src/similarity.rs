//! Name and profile similarity used to decide whether two entities are one.

use crate::normalize::{expand_hypocoristics, name_tokens};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Why two aliases matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Identical normalized aliases.
    Exact,
    /// Identical after expanding hypocoristics ("paco" / "francisco").
    Hypocoristic,
    /// One alias's name tokens are a strict subset of the other's.
    Containment,
    /// Substring or word overlap.
    Lexical,
}

/// Similarity of two normalized aliases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NameMatch {
    pub score: f64,
    pub reason: MatchReason,
    /// For containment: true if the first alias is the contained one.
    pub first_is_contained: bool,
}

/// Compute string similarity using multiple strategies.
///
/// - 1.0 = identical strings
/// - 0.8 = substring match (one contains the other)
/// - 0.0-0.8 = Jaccard similarity on word sets
///
/// ```
/// use cotejo_coalesce::string_similarity;
///
/// assert_eq!(string_similarity("maria sanchez", "maria sanchez"), 1.0);
/// assert!(string_similarity("maria sanchez", "sanchez") >= 0.8);
/// assert!(string_similarity("pedro", "lucia") < 0.1);
/// ```
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.8;
    }
    jaccard_word_similarity(a, b) * 0.8
}

/// Word-level Jaccard coefficient.
#[must_use]
pub fn jaccard_word_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

/// Cosine similarity mapped from [-1, 1] to [0, 1].
///
/// ```
/// use cotejo_coalesce::embedding_similarity;
///
/// assert_eq!(embedding_similarity(&[1.0, 0.0], &[1.0, 0.0]), 1.0);
/// assert_eq!(embedding_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
/// assert_eq!(embedding_similarity(&[1.0], &[1.0, 0.0]), 0.0);
/// ```
#[must_use]
pub fn embedding_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    ((dot / (na * nb) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Compare two normalized aliases.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> NameMatch {
    if a == b && !a.is_empty() {
        return NameMatch {
            score: 1.0,
            reason: MatchReason::Exact,
            first_is_contained: false,
        };
    }
    let ea = expand_hypocoristics(a);
    let eb = expand_hypocoristics(b);
    if ea == eb && !ea.is_empty() {
        return NameMatch {
            score: 0.95,
            reason: MatchReason::Hypocoristic,
            first_is_contained: false,
        };
    }
    let ta: HashSet<&str> = name_tokens(&ea).into_iter().collect();
    let tb: HashSet<&str> = name_tokens(&eb).into_iter().collect();
    if !ta.is_empty() && !tb.is_empty() && ta != tb {
        if ta.is_subset(&tb) {
            return NameMatch {
                score: 0.9,
                reason: MatchReason::Containment,
                first_is_contained: true,
            };
        }
        if tb.is_subset(&ta) {
            return NameMatch {
                score: 0.9,
                reason: MatchReason::Containment,
                first_is_contained: false,
            };
        }
    }
    NameMatch {
        score: string_similarity(&ea, &eb),
        reason: MatchReason::Lexical,
        first_is_contained: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment() {
        let m = name_similarity("maria", "maria sanchez");
        assert_eq!(m.reason, MatchReason::Containment);
        assert!(m.first_is_contained);
        assert!((m.score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_hypocoristic() {
        let m = name_similarity("paco", "francisco");
        assert_eq!(m.reason, MatchReason::Hypocoristic);
    }

    #[test]
    fn test_particles_do_not_contain() {
        // "de" alone is not a name
        let m = name_similarity("de", "juan de la cruz");
        assert_ne!(m.reason, MatchReason::Containment);
    }

    #[test]
    fn test_unrelated_low() {
        assert!(name_similarity("pedro", "isabel").score < 0.1);
    }

    #[test]
    fn test_jaccard() {
        assert!((jaccard_word_similarity("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
    }
}
