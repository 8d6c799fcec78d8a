//! Weighted voting shared by every ensemble.
//!
//! Each ensemble collects [`Vote`]s from whichever voters fired and asks an
//! [`Aggregator`] for a decision. Weights come from [`VotingWeights`] and are
//! renormalized on every call:
//!
//! - **score** renormalizes over the voters that actually voted, so a decision
//!   is still possible when some voters are unavailable;
//! - **confidence** renormalizes over every *registered* voter, so a missing
//!   voter lowers confidence instead of being silently ignored.
//!
//! ```rust
//! use cotejo::voting::{Aggregator, Vote};
//! use cotejo_core::{Task, VotingWeights};
//!
//! let weights = VotingWeights::default();
//! let agg = Aggregator::new(Task::Coreference, &weights, ["morpho", "heuristics", "llm"]);
//! let full = agg.weighted(&[("morpho", 0.8), ("heuristics", 0.8), ("llm", 0.8)]).unwrap();
//! let partial = agg.weighted(&[("morpho", 0.8), ("heuristics", 0.8)]).unwrap();
//! assert!((partial.score - full.score).abs() < 1e-9);
//! assert!(partial.confidence < full.confidence);
//! ```

mod registry;

pub use registry::VoterRegistry;

use cotejo_core::{Task, VoteSource, VotingWeights};
use std::collections::BTreeMap;

/// One voter's choice with its own confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote<T> {
    pub voter: String,
    pub choice: T,
    pub confidence: f64,
}

impl<T> Vote<T> {
    /// Create a vote; confidence is clamped to [0, 1].
    pub fn new(voter: impl Into<String>, choice: T, confidence: f64) -> Self {
        Self {
            voter: voter.into(),
            choice,
            confidence: clamp01(confidence),
        }
    }
}

/// Winning choice of a vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<T> {
    pub choice: T,
    /// Weighted support among the voters that fired.
    pub score: f64,
    /// Weighted support among all registered voters.
    pub confidence: f64,
    /// Voters that backed the winning choice.
    pub support: Vec<VoteSource>,
}

/// Score and confidence of a single weighted average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighted {
    pub score: f64,
    pub confidence: f64,
}

/// Renormalizing weighted vote for one task.
#[derive(Debug, Clone)]
pub struct Aggregator<'w> {
    task: Task,
    weights: &'w VotingWeights,
    registered: Vec<String>,
}

impl<'w> Aggregator<'w> {
    /// Aggregator over the voters registered for `task`.
    pub fn new<I, S>(task: Task, weights: &'w VotingWeights, registered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task,
            weights,
            registered: registered.into_iter().map(Into::into).collect(),
        }
    }

    /// Task this aggregator decides for.
    #[must_use]
    pub fn task(&self) -> Task {
        self.task
    }

    /// Registered voter names.
    #[must_use]
    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    /// Weights renormalized over `fired`, and over `fired` plus every
    /// registered voter.
    fn weight_maps(&self, fired: &[&str]) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
        let among_fired = owned(self.weights.normalized(self.task, fired));
        let mut all: Vec<&str> = self.registered.iter().map(String::as_str).collect();
        for f in fired {
            if !all.contains(f) {
                all.push(f);
            }
        }
        let among_all = owned(self.weights.normalized(self.task, &all));
        (among_fired, among_all)
    }

    /// Weighted average of per-voter scores. `None` if nobody voted.
    #[must_use]
    pub fn weighted(&self, scores: &[(&str, f64)]) -> Option<Weighted> {
        if scores.is_empty() {
            return None;
        }
        let fired: Vec<&str> = scores.iter().map(|(v, _)| *v).collect();
        let (fired_w, all_w) = self.weight_maps(&fired);
        let mut score = 0.0;
        let mut confidence = 0.0;
        for (voter, s) in scores {
            let s = clamp01(*s);
            score += fired_w.get(*voter).copied().unwrap_or(0.0) * s;
            confidence += all_w.get(*voter).copied().unwrap_or(0.0) * s;
        }
        Some(Weighted {
            score: clamp01(score),
            confidence: clamp01(confidence),
        })
    }

    /// Support for one option backed by `backers`, out of everyone in `fired`.
    ///
    /// Unlike [`weighted`](Self::weighted), voters in `fired` that did not
    /// back the option still take their share of the weight.
    #[must_use]
    pub fn support(&self, fired: &[&str], backers: &[(&str, f64)]) -> Weighted {
        let (fired_w, all_w) = self.weight_maps(fired);
        let mut score = 0.0;
        let mut confidence = 0.0;
        for (voter, c) in backers {
            let c = clamp01(*c);
            score += fired_w.get(*voter).copied().unwrap_or(0.0) * c;
            confidence += all_w.get(*voter).copied().unwrap_or(0.0) * c;
        }
        Weighted {
            score: clamp01(score),
            confidence: clamp01(confidence),
        }
    }

    /// Pick the choice with the most weighted support.
    ///
    /// A voter voting several times for the same choice counts once, with its
    /// best confidence. Ties go to the choice with more voters, then to the
    /// smallest choice in `Ord` order.
    #[must_use]
    pub fn decide<T: Clone + Ord>(&self, votes: &[Vote<T>]) -> Option<Decision<T>> {
        if votes.is_empty() {
            return None;
        }
        let mut fired: Vec<&str> = votes.iter().map(|v| v.voter.as_str()).collect();
        fired.sort_unstable();
        fired.dedup();
        let (fired_w, all_w) = self.weight_maps(&fired);

        let mut by_choice: BTreeMap<&T, BTreeMap<&str, f64>> = BTreeMap::new();
        for v in votes {
            let slot = by_choice
                .entry(&v.choice)
                .or_default()
                .entry(v.voter.as_str())
                .or_insert(0.0);
            *slot = slot.max(v.confidence);
        }

        let mut best: Option<(&T, f64, usize)> = None;
        for (choice, voters) in &by_choice {
            let support: f64 = voters
                .iter()
                .map(|(v, c)| fired_w.get(*v).copied().unwrap_or(0.0) * c)
                .sum();
            let better = match best {
                None => true,
                Some((_, s, n)) => {
                    support > s + 1e-12 || ((support - s).abs() <= 1e-12 && voters.len() > n)
                }
            };
            if better {
                best = Some((*choice, support, voters.len()));
            }
        }

        let (choice, score, _) = best?;
        let voters = &by_choice[choice];
        let confidence: f64 = voters
            .iter()
            .map(|(v, c)| all_w.get(*v).copied().unwrap_or(0.0) * c)
            .sum();
        Some(Decision {
            choice: choice.clone(),
            score: clamp01(score),
            confidence: clamp01(confidence),
            support: voters
                .iter()
                .map(|(v, c)| VoteSource {
                    voter: (*v).to_string(),
                    confidence: *c,
                })
                .collect(),
        })
    }
}

fn owned(map: BTreeMap<&str, f64>) -> BTreeMap<String, f64> {
    map.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::EntityKind;

    fn ner_agg(weights: &VotingWeights) -> Aggregator<'_> {
        Aggregator::new(
            Task::Ner,
            weights,
            ["transformer", "llm", "statistical", "gazetteer", "heuristic"],
        )
    }

    #[test]
    fn test_highest_weight_wins() {
        let w = VotingWeights::default();
        let agg = ner_agg(&w);
        let votes = vec![
            Vote::new("transformer", EntityKind::Person, 0.9),
            Vote::new("heuristic", EntityKind::Location, 0.9),
            Vote::new("gazetteer", EntityKind::Location, 0.9),
        ];
        let d = agg.decide(&votes).unwrap();
        assert_eq!(d.choice, EntityKind::Person);
        assert_eq!(d.support.len(), 1);
    }

    #[test]
    fn test_tie_prefers_more_voters() {
        let mut w = VotingWeights::empty();
        w.set(Task::Ner, "a", 0.5);
        w.set(Task::Ner, "b", 0.25);
        w.set(Task::Ner, "c", 0.25);
        let agg = Aggregator::new(Task::Ner, &w, ["a", "b", "c"]);
        let votes = vec![
            Vote::new("a", EntityKind::Location, 1.0),
            Vote::new("b", EntityKind::Person, 1.0),
            Vote::new("c", EntityKind::Person, 1.0),
        ];
        assert_eq!(agg.decide(&votes).unwrap().choice, EntityKind::Person);
    }

    #[test]
    fn test_missing_voter_lowers_confidence_only() {
        let w = VotingWeights::default();
        let agg = ner_agg(&w);
        let one = vec![Vote::new("statistical", EntityKind::Person, 0.8)];
        let d = agg.decide(&one).unwrap();
        assert!((d.score - 0.8).abs() < 1e-9);
        assert!(d.confidence < 0.2);
    }

    #[test]
    fn test_duplicate_votes_count_once() {
        let w = VotingWeights::default();
        let agg = ner_agg(&w);
        let votes = vec![
            Vote::new("statistical", EntityKind::Misc, 0.5),
            Vote::new("statistical", EntityKind::Misc, 0.7),
        ];
        let d = agg.decide(&votes).unwrap();
        assert!((d.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_support_counts_silent_voters() {
        let w = VotingWeights::default();
        let agg = ner_agg(&w);
        // statistical .2 and heuristic .1 fired; only heuristic backs the option.
        let s = agg.support(&["statistical", "heuristic"], &[("heuristic", 0.9)]);
        assert!((s.score - 0.3).abs() < 1e-9);
        assert!(s.confidence < s.score);
    }

    #[test]
    fn test_empty() {
        let w = VotingWeights::default();
        let agg = ner_agg(&w);
        assert!(agg.decide::<EntityKind>(&[]).is_none());
        assert!(agg.weighted(&[]).is_none());
    }
}
