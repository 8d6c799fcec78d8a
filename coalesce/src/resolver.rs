//! Entity fusion: merge entities that denote the same referent.
//!
//! Coreference only links mentions that co-occur in one window, so "María"
//! in chapter 1 and "María Sánchez" in chapter 8 reach fusion as two
//! entities. The [`Resolver`] scores every pair of live entities, merges the
//! pairs above the auto-merge threshold with union-find, and reports the
//! middle band as suggestions for the editor.
//!
//! # Banding
//!
//! | Score | Outcome |
//! |-------|---------|
//! | `>= auto_merge_threshold` (0.85) | merged |
//! | `>= suggest_threshold` (0.70) | [`MergeSuggestion`] |
//! | below | left distinct |
//!
//! Fusion runs to a fixpoint, so calling [`Resolver::fuse`] again on its own
//! output changes nothing.

use crate::normalize::normalize_alias;
use crate::similarity::{embedding_similarity, name_similarity, MatchReason, NameMatch};
use cotejo_core::{Entity, EntityId, EntityStore, Gender, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fusion thresholds and switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Merge automatically at or above this score.
    pub auto_merge_threshold: f64,
    /// Suggest a manual merge at or above this score.
    pub suggest_threshold: f64,
    /// Only fuse entities of compatible kinds.
    pub require_type_match: bool,
    /// Share of the score taken from profile similarity when both profiles exist.
    pub profile_weight: f64,
    /// Cap on reported suggestions.
    pub max_suggestions: usize,
    /// Upper bound on merge rounds.
    pub max_rounds: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: 0.85,
            suggest_threshold: 0.70,
            require_type_match: true,
            profile_weight: 0.15,
            max_suggestions: 50,
            max_rounds: 8,
        }
    }
}

/// A pair the editor should confirm or reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSuggestion {
    pub a: EntityId,
    pub b: EntityId,
    pub score: f64,
    pub reason: MatchReason,
}

/// One automatic merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeEvent {
    pub survivor: EntityId,
    pub absorbed: EntityId,
    pub score: f64,
    pub reason: MatchReason,
}

/// Result of a fusion pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionReport {
    pub merges: Vec<MergeEvent>,
    pub suggestions: Vec<MergeSuggestion>,
    /// `(alias, kept_by, removed_from)` for aliases that had to be deduplicated.
    pub alias_conflicts: Vec<(String, EntityId, EntityId)>,
    pub rounds: usize,
}

impl FusionReport {
    /// True if the pass changed the store.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.merges.is_empty() || !self.alias_conflicts.is_empty()
    }
}

/// Scored pair of entities.
#[derive(Debug, Clone, Copy)]
struct Scored {
    i: usize,
    j: usize,
    score: f64,
    reason: MatchReason,
}

/// Fusion engine.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: FusionConfig,
}

impl Resolver {
    /// Create a resolver with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with explicit configuration.
    pub fn with_config(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Set the auto-merge threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.auto_merge_threshold = threshold;
        self
    }

    /// Set whether entity kinds must be compatible.
    #[must_use]
    pub fn require_type_match(mut self, require: bool) -> Self {
        self.config.require_type_match = require;
        self
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Similarity of two entities, or `None` if they can never be one.
    #[must_use]
    pub fn entity_similarity(&self, a: &Entity, b: &Entity) -> Option<NameMatch> {
        if self.config.require_type_match && !a.kind.compatible(b.kind) {
            return None;
        }
        if genders_conflict(a.gender, b.gender) {
            return None;
        }
        let aliases_a = aliases_of(a);
        let aliases_b = aliases_of(b);
        let mut best: Option<NameMatch> = None;
        for x in &aliases_a {
            for y in &aliases_b {
                let m = name_similarity(x, y);
                if best.map_or(true, |b| m.score > b.score) {
                    best = Some(m);
                }
            }
        }
        let mut best = best?;
        if let (Some(pa), Some(pb)) = (&a.profile, &b.profile) {
            let w = self.config.profile_weight.clamp(0.0, 1.0);
            best.score = best.score * (1.0 - w) + embedding_similarity(pa, pb) * w;
        }
        Some(best)
    }

    fn score_pairs(&self, entities: &[&Entity]) -> Vec<Scored> {
        let mut scored = Vec::new();
        for i in 0..entities.len() {
            for j in (i + 1)..entities.len() {
                if let Some(m) = self.entity_similarity(entities[i], entities[j]) {
                    if m.score >= self.config.suggest_threshold {
                        scored.push(Scored {
                            i,
                            j,
                            score: m.score,
                            reason: m.reason,
                        });
                    }
                }
            }
        }

        // A name contained in several otherwise-unrelated entities ("García"
        // in "Ana García" and "José García") is ambiguous: demote to suggestion.
        let mut containers: HashMap<usize, Vec<usize>> = HashMap::new();
        for s in &scored {
            if s.reason == MatchReason::Containment {
                let (small, big) = contained_side(entities, s);
                containers.entry(small).or_default().push(big);
            }
        }
        let demote_below = self.config.auto_merge_threshold;
        for s in &mut scored {
            if s.reason != MatchReason::Containment {
                continue;
            }
            let (small, _) = contained_side(entities, s);
            let bigs = &containers[&small];
            if bigs.len() > 1 && !self.all_mergeable(entities, bigs) {
                s.score = s.score.min(demote_below - 0.01);
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(entities[a.i].id.cmp(&entities[b.i].id))
                .then(entities[a.j].id.cmp(&entities[b.j].id))
        });
        scored
    }

    fn all_mergeable(&self, entities: &[&Entity], group: &[usize]) -> bool {
        group.iter().enumerate().all(|(n, &x)| {
            group[n + 1..].iter().all(|&y| {
                self.entity_similarity(entities[x], entities[y])
                    .is_some_and(|m| m.score >= self.config.auto_merge_threshold)
            })
        })
    }

    /// Merge every pair above the auto-merge threshold, to a fixpoint.
    ///
    /// # Algorithm
    ///
    /// 1. Deduplicate aliases across entities
    /// 2. Score all pairs, demote ambiguous containment matches
    /// 3. Union pairs above threshold in descending score order, refusing
    ///    unions that would mix genders
    /// 4. Merge each cluster into its survivor (most mentions, then lowest id)
    /// 5. Repeat until a round changes nothing
    pub fn fuse(&self, store: &mut EntityStore) -> Result<FusionReport> {
        let mut report = FusionReport::default();
        for round in 0..self.config.max_rounds.max(1) {
            report.rounds = round + 1;
            let conflicts = store.enforce_alias_uniqueness();
            let conflicts_found = !conflicts.is_empty();
            report.alias_conflicts.extend(conflicts);

            let entities: Vec<&Entity> = store.iter().collect();
            let scored = self.score_pairs(&entities);

            let n = entities.len();
            let mut parent: Vec<usize> = (0..n).collect();
            let mut gender: Vec<Option<Gender>> = entities.iter().map(|e| e.gender).collect();
            let mut best_link: HashMap<usize, (f64, MatchReason)> = HashMap::new();

            fn find(parent: &mut [usize], x: usize) -> usize {
                if parent[x] != x {
                    parent[x] = find(parent, parent[x]);
                }
                parent[x]
            }

            let mut unions = 0;
            for s in scored
                .iter()
                .filter(|s| s.score >= self.config.auto_merge_threshold)
            {
                let ri = find(&mut parent, s.i);
                let rj = find(&mut parent, s.j);
                if ri == rj {
                    continue;
                }
                if genders_conflict(gender[ri], gender[rj]) {
                    log::debug!(
                        "fusion: skipping {} ~ {} ({:.2}), clusters disagree on gender",
                        entities[s.i].name,
                        entities[s.j].name,
                        s.score
                    );
                    continue;
                }
                parent[rj] = ri;
                gender[ri] = gender[ri].or(gender[rj]);
                best_link.entry(s.j).or_insert((s.score, s.reason));
                best_link.entry(s.i).or_insert((s.score, s.reason));
                unions += 1;
            }

            let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
            for i in 0..n {
                let root = find(&mut parent, i);
                clusters.entry(root).or_default().push(i);
            }
            let plan: Vec<(EntityId, Vec<(EntityId, f64, MatchReason)>)> = clusters
                .values()
                .filter(|members| members.len() > 1)
                .filter_map(|members| {
                    let survivor = *members.iter().max_by(|&&a, &&b| {
                        entities[a]
                            .mentions
                            .len()
                            .cmp(&entities[b].mentions.len())
                            .then(entities[b].id.cmp(&entities[a].id))
                    })?;
                    let absorbed = members
                        .iter()
                        .filter(|&&m| m != survivor)
                        .map(|&m| {
                            let (score, reason) = best_link
                                .get(&m)
                                .copied()
                                .unwrap_or((self.config.auto_merge_threshold, MatchReason::Lexical));
                            (entities[m].id, score, reason)
                        })
                        .collect();
                    Some((entities[survivor].id, absorbed))
                })
                .collect();
            drop(entities);

            for (survivor, absorbed) in plan {
                for (id, score, reason) in absorbed {
                    store.merge(survivor, id, score)?;
                    log::info!("fusion: merged {id} into {survivor} ({score:.2}, {reason:?})");
                    report.merges.push(MergeEvent {
                        survivor,
                        absorbed: id,
                        score,
                        reason,
                    });
                }
            }

            if unions == 0 && !conflicts_found {
                break;
            }
        }
        report.suggestions = self.suggest(store);
        Ok(report)
    }

    /// Pairs in the suggestion band, best first.
    #[must_use]
    pub fn suggest(&self, store: &EntityStore) -> Vec<MergeSuggestion> {
        let entities: Vec<&Entity> = store.iter().collect();
        let mut out: Vec<MergeSuggestion> = self
            .score_pairs(&entities)
            .into_iter()
            .filter(|s| s.score < self.config.auto_merge_threshold)
            .map(|s| MergeSuggestion {
                a: entities[s.i].id,
                b: entities[s.j].id,
                score: s.score,
                reason: s.reason,
            })
            .collect();
        out.truncate(self.config.max_suggestions);
        out
    }
}

fn genders_conflict(a: Option<Gender>, b: Option<Gender>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

fn aliases_of(e: &Entity) -> Vec<String> {
    if e.aliases.is_empty() {
        let fallback = normalize_alias(&e.name);
        if fallback.is_empty() {
            Vec::new()
        } else {
            vec![fallback]
        }
    } else {
        e.aliases.iter().cloned().collect()
    }
}

/// `(contained, container)` indices of a containment match.
fn contained_side(entities: &[&Entity], s: &Scored) -> (usize, usize) {
    // Recompute direction from the best alias pair.
    let a = aliases_of(entities[s.i]);
    let b = aliases_of(entities[s.j]);
    for x in &a {
        for y in &b {
            let m = name_similarity(x, y);
            if m.reason == MatchReason::Containment {
                return if m.first_is_contained {
                    (s.i, s.j)
                } else {
                    (s.j, s.i)
                };
            }
        }
    }
    (s.i, s.j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::{EntityKind, MentionId};

    fn add(store: &mut EntityStore, name: &str, kind: EntityKind, mentions: &[u32]) -> EntityId {
        let id = store.create(name, kind);
        store
            .get_mut(id)
            .unwrap()
            .aliases
            .insert(normalize_alias(name));
        for m in mentions {
            store.attach_mention(id, MentionId(*m)).unwrap();
        }
        id
    }

    #[test]
    fn test_contained_name_merges() {
        let mut store = EntityStore::new();
        let a = add(&mut store, "María", EntityKind::Person, &[1, 2]);
        let b = add(&mut store, "María Sánchez", EntityKind::Person, &[3]);
        let report = Resolver::new().fuse(&mut store).unwrap();
        assert_eq!(report.merges.len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(b), Some(a));
        assert_eq!(store.get(a).unwrap().name, "María Sánchez");
    }

    #[test]
    fn test_fuse_is_idempotent() {
        let mut store = EntityStore::new();
        add(&mut store, "Paco", EntityKind::Person, &[1]);
        add(&mut store, "Francisco Ruiz", EntityKind::Person, &[2]);
        add(&mut store, "don Francisco", EntityKind::Person, &[3]);
        add(&mut store, "Toledo", EntityKind::Location, &[4]);
        let resolver = Resolver::new();
        resolver.fuse(&mut store).unwrap();
        let before = store.len();
        let again = resolver.fuse(&mut store).unwrap();
        assert!(!again.changed());
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_ambiguous_surname_is_only_suggested() {
        let mut store = EntityStore::new();
        let garcia = add(&mut store, "García", EntityKind::Person, &[1]);
        add(&mut store, "Ana García", EntityKind::Person, &[2]);
        add(&mut store, "José García", EntityKind::Person, &[3]);
        let report = Resolver::new().fuse(&mut store).unwrap();
        assert!(report.merges.is_empty());
        assert_eq!(store.len(), 3);
        assert!(report
            .suggestions
            .iter()
            .any(|s| s.a == garcia || s.b == garcia));
    }

    #[test]
    fn test_kind_mismatch_never_merges() {
        let mut store = EntityStore::new();
        add(&mut store, "García", EntityKind::Person, &[1]);
        add(&mut store, "García", EntityKind::Location, &[2]);
        let report = Resolver::new().fuse(&mut store).unwrap();
        assert!(report.merges.is_empty());
        // the shared alias is kept by one entity only
        assert_eq!(report.alias_conflicts.len(), 1);
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_gender_conflict_blocks_merge() {
        let mut store = EntityStore::new();
        let a = add(&mut store, "Andrea", EntityKind::Person, &[1]);
        let b = add(&mut store, "Andrea Rossi", EntityKind::Person, &[2]);
        store.get_mut(a).unwrap().gender = Some(Gender::Fem);
        store.get_mut(b).unwrap().gender = Some(Gender::Masc);
        let report = Resolver::new().fuse(&mut store).unwrap();
        assert!(report.merges.is_empty());
    }

    #[test]
    fn test_low_scores_stay_distinct() {
        let mut store = EntityStore::new();
        add(&mut store, "Pedro", EntityKind::Person, &[1]);
        add(&mut store, "Isabel", EntityKind::Person, &[2]);
        let report = Resolver::new().fuse(&mut store).unwrap();
        assert!(report.merges.is_empty());
        assert!(report.suggestions.is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const NAMES: &[&str] = &[
            "María", "María Sánchez", "Paco", "Francisco", "don Francisco Ruiz", "Isabel",
            "Isa", "García", "Ana García", "José García", "Toledo", "Lola",
        ];

        proptest! {
            #[test]
            fn fuse_reaches_fixpoint(picks in proptest::collection::vec((0..NAMES.len(), 1u32..4), 1..8)) {
                let mut store = EntityStore::new();
                let mut next = 0u32;
                for (i, n) in picks {
                    let ids: Vec<u32> = (next..next + n).collect();
                    next += n;
                    add(&mut store, NAMES[i], EntityKind::Person, &ids);
                }
                let resolver = Resolver::new();
                resolver.fuse(&mut store).unwrap();
                store.check_integrity().unwrap();
                let live = store.ids();
                let again = resolver.fuse(&mut store).unwrap();
                prop_assert!(!again.changed());
                prop_assert_eq!(store.ids(), live);
            }
        }
    }
}
