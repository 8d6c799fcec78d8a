//! Coreference chains.

use crate::error::{Error, Result};
use crate::mention::{Mention, MentionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a chain within one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u32);

/// Mentions believed to denote one referent, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreferenceChain {
    pub id: ChainId,
    pub mentions: Vec<MentionId>,
    /// Longest / most specific mention.
    pub representative: MentionId,
    /// Aggregate confidence of the links that built the chain.
    pub confidence: f64,
}

impl CoreferenceChain {
    /// Build a chain from mentions, choosing the representative by form
    /// specificity and then surface length.
    ///
    /// Returns `None` for an empty mention list.
    #[must_use]
    pub fn from_mentions(id: ChainId, members: &[&Mention], confidence: f64) -> Option<Self> {
        let representative = members
            .iter()
            .max_by(|a, b| {
                a.form
                    .specificity()
                    .cmp(&b.form.specificity())
                    .then_with(|| a.text.chars().count().cmp(&b.text.chars().count()))
                    // earlier mention wins a full tie
                    .then_with(|| b.span.start.cmp(&a.span.start))
            })?
            .id;
        let mut ordered: Vec<&&Mention> = members.iter().collect();
        ordered.sort_by_key(|m| (m.span.start, m.span.end));
        Some(Self {
            id,
            mentions: ordered.iter().map(|m| m.id).collect(),
            representative,
            confidence,
        })
    }

    /// Number of mentions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// True if the chain holds no mentions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
}

/// Check that every mention belongs to exactly one chain.
pub fn check_partition(mentions: &[Mention], chains: &[CoreferenceChain]) -> Result<()> {
    let mut owner: HashMap<MentionId, ChainId> = HashMap::with_capacity(mentions.len());
    for chain in chains {
        for &m in &chain.mentions {
            if let Some(prev) = owner.insert(m, chain.id) {
                return Err(Error::data_integrity(format!(
                    "mention {m} belongs to chains {} and {}",
                    prev.0, chain.id.0
                )));
            }
        }
    }
    for m in mentions {
        if !owner.contains_key(&m.id) {
            return Err(Error::data_integrity(format!(
                "mention {} '{}' belongs to no chain",
                m.id, m.text
            )));
        }
    }
    if owner.len() != mentions.len() {
        return Err(Error::data_integrity(format!(
            "chains reference {} mentions but {} exist",
            owner.len(),
            mentions.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Span;
    use crate::mention::{EntityKind, MentionForm};

    fn mention(id: u32, text: &str, start: usize, form: MentionForm) -> Mention {
        Mention {
            id: MentionId(id),
            span: Span::new(start, start + text.chars().count()),
            text: text.to_string(),
            kind: EntityKind::Person,
            form,
            gender: None,
            number: None,
            person: None,
            chapter: 1,
            sentence: 0,
            paragraph: 0,
            head_token: 0,
            provenance: vec![],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_representative_prefers_proper_then_longest() {
        let a = mention(0, "ella", 10, MentionForm::Pronoun);
        let b = mention(1, "María", 0, MentionForm::Proper);
        let c = mention(2, "María Sánchez", 30, MentionForm::Proper);
        let chain = CoreferenceChain::from_mentions(ChainId(0), &[&a, &b, &c], 0.8).unwrap();
        assert_eq!(chain.representative, MentionId(2));
        assert_eq!(chain.mentions, vec![MentionId(1), MentionId(0), MentionId(2)]);
    }

    #[test]
    fn test_partition_detects_double_membership() {
        let a = mention(0, "Ana", 0, MentionForm::Proper);
        let chains = vec![
            CoreferenceChain::from_mentions(ChainId(0), &[&a], 1.0).unwrap(),
            CoreferenceChain::from_mentions(ChainId(1), &[&a], 1.0).unwrap(),
        ];
        assert!(matches!(
            check_partition(&[a], &chains),
            Err(Error::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_partition_detects_orphan() {
        let a = mention(0, "Ana", 0, MentionForm::Proper);
        let b = mention(1, "Luis", 10, MentionForm::Proper);
        let chains = vec![CoreferenceChain::from_mentions(ChainId(0), &[&a], 1.0).unwrap()];
        assert!(check_partition(&[a, b], &chains).is_err());
    }
}
