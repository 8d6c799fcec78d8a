//! Combining extractor candidates.
//!
//! Candidates agreeing on (token, key, normalized value) form one group.
//! Method weights are renormalized over the registered extractors, so `w`
//! below is a method's share. A lone method keeps most of its confidence,
//! scaled by its share:
//!
//! ```text
//! conf · (0.85 + 0.15 · w)
//! ```
//!
//! Several agreeing methods get their weighted mean plus an agreement bonus
//! of 0.05 per extra method, at most 0.15. Shares are floored at 0.10 so a
//! method that feedback has driven down can still contribute.

use super::extract::Candidate;
use crate::voting::clamp01;
use cotejo_core::{AttributeKey, Span, Task, VotingWeights};
use std::collections::BTreeMap;

const SHARE_FLOOR: f64 = 0.10;
const BONUS_PER_METHOD: f64 = 0.05;
const MAX_BONUS: f64 = 0.15;

/// A voted attribute candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Voted {
    pub key: AttributeKey,
    pub value: String,
    pub normalized: String,
    pub sentence: usize,
    pub token: usize,
    pub span: Span,
    pub confidence: f64,
    /// Methods that proposed this value, sorted.
    pub methods: Vec<String>,
}

type Group<'a> = Vec<(&'a str, &'a Candidate)>;

/// Vote candidates from several methods; at most one result per token.
///
/// `registered` names every extractor of the run, including those that
/// proposed nothing.
#[must_use]
pub fn vote(candidates: &[(String, Candidate)], registered: &[&str], weights: &VotingWeights) -> Vec<Voted> {
    let mut methods: Vec<&str> = registered.to_vec();
    methods.extend(candidates.iter().map(|(m, _)| m.as_str()));
    methods.sort_unstable();
    methods.dedup();
    let shares = weights.normalized(Task::Attribute, &methods);

    let mut groups: BTreeMap<(usize, usize, AttributeKey, &str), Group<'_>> = BTreeMap::new();
    for (method, c) in candidates {
        groups
            .entry((c.sentence, c.token, c.key, c.normalized.as_str()))
            .or_default()
            .push((method.as_str(), c));
    }

    let mut best: BTreeMap<(usize, usize), Voted> = BTreeMap::new();
    for ((sentence, token, key, normalized), group) in groups {
        let Some(voted) = combine(sentence, token, key, normalized, &group, &shares) else {
            continue;
        };
        match best.get(&(sentence, token)) {
            Some(current)
                if current.confidence > voted.confidence + 1e-12
                    || ((current.confidence - voted.confidence).abs() <= 1e-12
                        && current.methods.len() >= voted.methods.len()) => {}
            _ => {
                best.insert((sentence, token), voted);
            }
        }
    }
    best.into_values().collect()
}

fn combine(
    sentence: usize,
    token: usize,
    key: AttributeKey,
    normalized: &str,
    group: &[(&str, &Candidate)],
    shares: &BTreeMap<&str, f64>,
) -> Option<Voted> {
    // Best confidence per method.
    let mut per_method: BTreeMap<&str, &Candidate> = BTreeMap::new();
    for &(m, c) in group {
        let slot = per_method.entry(m).or_insert(c);
        if c.confidence > slot.confidence {
            *slot = c;
        }
    }
    let methods: Vec<&str> = per_method.keys().copied().collect();
    let raw: BTreeMap<&str, f64> = methods
        .iter()
        .map(|m| (*m, shares.get(m).copied().unwrap_or(0.0).max(SHARE_FLOOR)))
        .collect();

    let confidence = if let [only] = methods.as_slice() {
        per_method[only].confidence * (0.85 + 0.15 * raw[only])
    } else {
        let total: f64 = raw.values().sum();
        let mean: f64 = per_method
            .iter()
            .map(|(m, c)| raw[m] / total * c.confidence)
            .sum();
        let bonus = (BONUS_PER_METHOD * (methods.len() - 1) as f64).min(MAX_BONUS);
        mean + bonus
    };

    // Representative surface: the candidate from the most confident method,
    // preferring the widest span.
    let rep = per_method
        .values()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence).then(a.span.len().cmp(&b.span.len())))?;
    Some(Voted {
        key,
        value: rep.value.clone(),
        normalized: normalized.to_string(),
        sentence,
        token,
        span: rep.span,
        confidence: clamp01(confidence),
        methods: methods.iter().map(|m| (*m).to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&str; 4] = ["llm", "embeddings", "dependency", "patterns"];

    fn cand(key: AttributeKey, value: &str, token: usize, confidence: f64) -> Candidate {
        Candidate {
            key,
            value: value.into(),
            normalized: value.into(),
            sentence: 0,
            token,
            span: Span::new(token * 10, token * 10 + value.len()),
            confidence,
        }
    }

    #[test]
    fn test_single_method() {
        let w = VotingWeights::default();
        let out = vote(&[("patterns".into(), cand(AttributeKey::EyeColor, "verde", 3, 0.8))], &ALL, &w);
        assert_eq!(out.len(), 1);
        let expected = 0.8 * (0.85 + 0.15 * 0.15);
        assert!((out[0].confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_agreement_bonus() {
        let w = VotingWeights::default();
        let out = vote(
            &[
                ("patterns".into(), cand(AttributeKey::EyeColor, "verde", 3, 0.7)),
                ("dependency".into(), cand(AttributeKey::EyeColor, "verde", 3, 0.7)),
                ("llm".into(), cand(AttributeKey::EyeColor, "verde", 3, 0.7)),
            ],
            &ALL,
            &w,
        );
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.8).abs() < 1e-9);
        assert_eq!(out[0].methods, vec!["dependency", "llm", "patterns"]);
    }

    #[test]
    fn test_one_result_per_token() {
        let w = VotingWeights::default();
        let out = vote(
            &[
                ("patterns".into(), cand(AttributeKey::Build, "delgado", 2, 0.7)),
                ("dependency".into(), cand(AttributeKey::Build, "delgado", 2, 0.75)),
                ("embeddings".into(), cand(AttributeKey::Personality, "delgado", 2, 0.6)),
                ("patterns".into(), cand(AttributeKey::Age, "30", 5, 0.7)),
            ],
            &ALL,
            &w,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, AttributeKey::Build);
        assert_eq!(out[1].token, 5);
    }

    #[test]
    fn test_lone_method_uses_its_share() {
        let mut doubled = VotingWeights::empty();
        for (m, w) in VotingWeights::default().methods(Task::Attribute) {
            doubled.set(Task::Attribute, m, w * 2.0);
        }
        let c = [("patterns".to_string(), cand(AttributeKey::EyeColor, "verde", 3, 0.8))];
        let base = vote(&c, &ALL, &VotingWeights::default());
        assert!((vote(&c, &ALL, &doubled)[0].confidence - base[0].confidence).abs() < 1e-9);

        // With fewer extractors registered, each one's share grows.
        let two = vote(&c, &["patterns", "dependency"], &VotingWeights::default());
        let expected = 0.8 * (0.85 + 0.15 * (0.15 / 0.35));
        assert!((two[0].confidence - expected).abs() < 1e-9);
    }
}
