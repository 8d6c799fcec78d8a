//! Coreference voting with pro-drop support.
//!
//! Input: the NER mentions (the *anchors*). The phase first adds candidate
//! anaphora (pronouns, possessives, demonstratives, definite human NPs and
//! zero subjects, see [`mentions`]), then scores every anaphor against its
//! nearby antecedent candidates with each [`PairVoter`], aggregates the
//! per-pair scores, and links greedily with union-find:
//!
//! 1. pairs scoring above the link threshold are visited strongest first,
//!    across the whole window; each anaphor links at most once;
//! 2. a link is skipped when it would join clusters with explicitly different
//!    gender;
//! 3. if a candidate in another cluster scores within the ambiguity margin of
//!    the best one, the anaphor abstains and an
//!    [`Error::AmbiguousResolution`] issue is recorded;
//! 4. clusters without an anchor are dissolved and their anaphora counted as
//!    unresolved.
//!
//! Every surviving mention ends up in exactly one chain, which is verified
//! before the phase returns.

pub mod mentions;
pub mod narrator;
mod prodrop;
mod voters;

pub use prodrop::{ProDropScorer, ProDropWeights};
pub use voters::{EmbeddingsVoter, HeuristicsVoter, LlmPairVoter, MorphoVoter};

use crate::pipeline::{CancellationToken, Issue, Phase, RunLimits};
use crate::signals::Embedder;
use crate::voting::Aggregator;
use crate::{Error, Result};
use cotejo_coalesce::{name_similarity, normalize_alias};
use cotejo_core::{
    check_partition, ChainId, CoreferenceChain, Document, EntityKind, EntityStore, Gender,
    Mention, MentionForm, MentionId, Person, Task, VotingWeights,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Coreference phase settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorefConfig {
    /// Chapters per processing window.
    pub window_chapters: usize,
    /// How many sentences back a pronoun may look.
    pub pronoun_window: usize,
    /// How many sentences back a zero subject may look.
    pub zero_window: usize,
    /// Nearest candidates kept per anaphor.
    pub max_candidates: usize,
    /// Aggregated score a link must exceed.
    pub link_threshold: f64,
    /// Score gap under which two antecedents in different clusters are a tie.
    pub ambiguity_margin: f64,
    /// Name similarity needed to pair two nominal mentions.
    pub nominal_threshold: f64,
    /// Link first-person mentions to a self-naming narrator.
    pub narrator: bool,
}

impl Default for CorefConfig {
    fn default() -> Self {
        Self {
            window_chapters: 3,
            pronoun_window: 3,
            zero_window: 1,
            max_candidates: 8,
            link_threshold: 0.5,
            ambiguity_margin: 0.02,
            nominal_threshold: 0.85,
            narrator: true,
        }
    }
}

/// What a pair voter sees for one anaphor.
#[derive(Debug, Clone)]
pub struct AnaphorContext<'a> {
    pub doc: &'a Document,
    pub anaphor: &'a Mention,
    /// Candidate antecedents, nearest first.
    pub candidates: Vec<&'a Mention>,
    /// All mentions of the current window, in text order.
    pub window: &'a [Mention],
    /// Pair of two nominal mentions rather than an anaphor.
    pub nominal: bool,
}

/// An independent coreference method scoring (anaphor, candidate) pairs.
pub trait PairVoter: Send + Sync {
    /// Voter name; must match a key of the coreference voting weights.
    fn name(&self) -> &str;

    /// One score in [0, 1] per candidate, `None` to abstain on a pair.
    fn score(&self, ctx: &AnaphorContext<'_>) -> Result<Vec<Option<f64>>>;
}

/// Result of the coreference phase.
#[derive(Debug, Clone, Default)]
pub struct CorefOutcome {
    /// Anchors plus resolved anaphora, in text order.
    pub mentions: Vec<Mention>,
    pub chains: Vec<CoreferenceChain>,
    pub issues: Vec<Issue>,
    pub degraded: Vec<String>,
    /// Anaphora dropped because they reached no anchor.
    pub unresolved: usize,
    /// Links made.
    pub links: usize,
}

/// Voting coreference resolver.
pub struct CorefEnsemble {
    voters: Vec<Arc<dyn PairVoter>>,
    config: CorefConfig,
}

/// Builder for [`CorefEnsemble`].
#[derive(Default)]
pub struct CorefEnsembleBuilder {
    voters: Vec<Arc<dyn PairVoter>>,
    config: CorefConfig,
}

impl CorefEnsembleBuilder {
    /// Add a voter.
    #[must_use]
    pub fn voter<V: PairVoter + 'static>(mut self, voter: V) -> Self {
        self.voters.push(Arc::new(voter));
        self
    }

    /// Add a shared voter.
    #[must_use]
    pub fn voter_arc(mut self, voter: Arc<dyn PairVoter>) -> Self {
        self.voters.push(voter);
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: CorefConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the ensemble.
    #[must_use]
    pub fn build(self) -> CorefEnsemble {
        CorefEnsemble {
            voters: self.voters,
            config: self.config,
        }
    }
}

struct Edge {
    anaphor: usize,
    antecedent: usize,
    score: f64,
    confidence: f64,
}

type ScoredContext = (usize, Vec<usize>, Vec<(String, Result<Vec<Option<f64>>>)>);

impl CorefEnsemble {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> CorefEnsembleBuilder {
        CorefEnsembleBuilder::default()
    }

    /// Names of the registered voters.
    #[must_use]
    pub fn voter_names(&self) -> Vec<&str> {
        self.voters.iter().map(|v| v.name()).collect()
    }

    /// Resolve coreference over the anchors produced by NER.
    pub fn run(
        &self,
        doc: &Document,
        anchors: Vec<Mention>,
        weights: &VotingWeights,
        cancel: &CancellationToken,
        limits: RunLimits,
    ) -> Result<CorefOutcome> {
        let mut outcome = CorefOutcome::default();
        let anchor_ids: BTreeSet<MentionId> = anchors.iter().map(|m| m.id).collect();
        let first_free = anchors.iter().map(|m| m.id.0 + 1).max().unwrap_or(0);
        let narrator = if self.config.narrator {
            narrator::find_narrator(doc, &anchors)
        } else {
            None
        };

        let mut anaphora = mentions::detect(doc, &anchors, first_free);
        let room = limits.max_items.saturating_sub(anchors.len());
        if anaphora.len() > room {
            log::warn!("[coref] mention cap {} reached, {} anaphora ignored", limits.max_items, anaphora.len() - room);
            outcome.issues.push(Issue::limit(
                Phase::Coreference,
                format!("mention cap of {} reached; {} anaphora ignored", limits.max_items, anaphora.len() - room),
            ));
            anaphora.truncate(room);
        }

        let mut all = anchors;
        all.extend(anaphora);
        all.sort_by(|a, b| {
            a.span
                .start
                .cmp(&b.span.start)
                .then(b.form.specificity().cmp(&a.form.specificity()))
                .then(a.id.cmp(&b.id))
        });
        let is_anchor = |m: &Mention| anchor_ids.contains(&m.id);

        let registered: Vec<String> = self.voters.iter().map(|v| v.name().to_string()).collect();
        let aggregator = Aggregator::new(Task::Coreference, weights, registered);
        let mut down: BTreeSet<String> = BTreeSet::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut narrator_links: Vec<usize> = Vec::new();
        let mut processed = 0usize;

        for window in self.windows(doc, &all) {
            cancel.check(Phase::Coreference)?;
            let slice = &all[window.clone()];
            let mut contexts: Vec<(usize, Vec<usize>, AnaphorContext<'_>)> = Vec::new();
            for p in window.clone() {
                let m = &all[p];
                let nominal = is_anchor(m) && m.form == MentionForm::Proper;
                if !nominal && is_anchor(m) {
                    continue;
                }
                if !nominal && narrator.is_some() && narrator::is_narrator_reference(m) && !is_anchor(m) {
                    narrator_links.push(p);
                    continue;
                }
                let candidates = self.candidates(&all, window.start, p, nominal, &is_anchor);
                if candidates.is_empty() {
                    continue;
                }
                let ctx = AnaphorContext {
                    doc,
                    anaphor: m,
                    candidates: candidates.iter().map(|&q| &all[q]).collect(),
                    window: slice,
                    nominal,
                };
                contexts.push((p, candidates, ctx));
            }

            let scored = self.score_contexts(contexts, &down);

            // Single-threaded reduction.
            for (p, candidates, results) in scored {
                processed += 1;
                cancel.check_every(Phase::Coreference, processed, limits.cancel_check_interval)?;
                let mut per_voter: Vec<(String, Vec<Option<f64>>)> = Vec::new();
                for (name, result) in results {
                    match result {
                        Ok(scores) if scores.len() == candidates.len() => per_voter.push((name, scores)),
                        Ok(scores) => {
                            log::warn!(
                                "[coref] voter '{name}' returned {} scores for {} candidates; ignored",
                                scores.len(),
                                candidates.len()
                            );
                        }
                        Err(e) if e.is_fatal() || matches!(e, Error::Cancelled { .. }) => return Err(e),
                        Err(e) => {
                            if down.insert(name.clone()) {
                                log::warn!("[coref] voter '{name}' dropped: {e}");
                                let err = e.attributed_to(&name);
                                outcome.issues.push(Issue::from_error(Phase::Coreference, &err));
                            }
                        }
                    }
                }
                for (j, &q) in candidates.iter().enumerate() {
                    let votes: Vec<(&str, f64)> = per_voter
                        .iter()
                        .filter_map(|(name, scores)| scores[j].map(|s| (name.as_str(), s)))
                        .collect();
                    if let Some(w) = aggregator.weighted(&votes) {
                        edges.push(Edge {
                            anaphor: p,
                            antecedent: q,
                            score: w.score,
                            confidence: w.confidence,
                        });
                    }
                }
            }
        }

        let narrator_pos = narrator.and_then(|id| all.iter().position(|m| m.id == id));
        let (mut union, links) =
            self.link(&all, edges, narrator_pos, &narrator_links, &mut outcome.issues);
        outcome.links = links;

        // Group by root and dissolve anchorless clusters.
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for p in 0..all.len() {
            groups.entry(union.find(p)).or_default().push(p);
        }
        let mut keep = vec![false; all.len()];
        let mut clusters: Vec<(Vec<usize>, f64)> = Vec::new();
        for (root, members) in groups {
            if members.iter().any(|&p| is_anchor(&all[p])) {
                for &p in &members {
                    keep[p] = true;
                }
                let conf = union.confidence(root).unwrap_or_else(|| {
                    members.iter().map(|&p| all[p].confidence).fold(0.0, f64::max)
                });
                clusters.push((members, conf));
            } else {
                outcome.unresolved += members.len();
            }
        }
        clusters.sort_by_key(|(members, _)| members.iter().copied().min().unwrap_or(0));

        let mut chains = Vec::with_capacity(clusters.len());
        for (i, (members, conf)) in clusters.iter().enumerate() {
            let refs: Vec<&Mention> = members.iter().map(|&p| &all[p]).collect();
            if let Some(chain) = CoreferenceChain::from_mentions(ChainId(i as u32), &refs, *conf) {
                chains.push(chain);
            }
        }
        let kept: Vec<Mention> = all
            .into_iter()
            .zip(keep)
            .filter_map(|(m, k)| k.then_some(m))
            .collect();
        check_partition(&kept, &chains)?;

        outcome.degraded = down.into_iter().collect();
        log::info!(
            "[coref] {} chains over {} mentions, {} links, {} unresolved",
            chains.len(),
            kept.len(),
            outcome.links,
            outcome.unresolved
        );
        outcome.mentions = kept;
        outcome.chains = chains;
        Ok(outcome)
    }

    /// Contiguous position ranges of `all`, one per chapter window.
    fn windows(&self, doc: &Document, all: &[Mention]) -> Vec<std::ops::Range<usize>> {
        let size = self.config.window_chapters.max(1);
        let mut out = Vec::new();
        for group in doc.chapters.chunks(size) {
            let numbers: BTreeSet<u32> = group.iter().map(|c| c.number).collect();
            let positions: Vec<usize> = all
                .iter()
                .enumerate()
                .filter(|(_, m)| numbers.contains(&m.chapter))
                .map(|(p, _)| p)
                .collect();
            if let (Some(&lo), Some(&hi)) = (positions.first(), positions.last()) {
                out.push(lo..hi + 1);
            }
        }
        out
    }

    /// Earlier mentions that could be the antecedent of `all[p]`, nearest first.
    fn candidates(
        &self,
        all: &[Mention],
        window_start: usize,
        p: usize,
        nominal: bool,
        is_anchor: &dyn Fn(&Mention) -> bool,
    ) -> Vec<usize> {
        let m = &all[p];
        let mut out = Vec::new();
        for q in (window_start..p).rev() {
            if out.len() >= self.config.max_candidates {
                break;
            }
            let c = &all[q];
            if c.span.start >= m.span.start {
                continue;
            }
            let ok = if nominal {
                is_anchor(c)
                    && c.form.is_nominal()
                    && c.kind.compatible(m.kind)
                    && name_similarity(&m.text, &c.text).score >= self.config.nominal_threshold
            } else {
                let limit = if m.form == MentionForm::Zero {
                    self.config.zero_window
                } else {
                    self.config.pronoun_window
                };
                c.chapter == m.chapter
                    && m.sentence.saturating_sub(c.sentence) <= limit
                    && anaphor_compatible(m, c)
            };
            if ok {
                out.push(q);
            }
        }
        out
    }

    fn score_contexts<'a>(
        &self,
        contexts: Vec<(usize, Vec<usize>, AnaphorContext<'a>)>,
        down: &BTreeSet<String>,
    ) -> Vec<ScoredContext> {
        let active: Vec<&Arc<dyn PairVoter>> = self
            .voters
            .iter()
            .filter(|v| !down.contains(v.name()))
            .collect();
        let score_one = |(p, candidates, ctx): (usize, Vec<usize>, AnaphorContext<'a>)| {
            let results = active
                .iter()
                .map(|v| (v.name().to_string(), v.score(&ctx)))
                .collect();
            (p, candidates, results)
        };
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            contexts.into_par_iter().map(score_one).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            contexts.into_iter().map(score_one).collect()
        }
    }

    /// Greedy linking over all scored edges, best score first.
    ///
    /// Ties go to the earlier anaphor, then the nearer antecedent. Each
    /// anaphor links at most once; it abstains when another antecedent in a
    /// different, compatible cluster scores within the ambiguity margin.
    fn link(
        &self,
        all: &[Mention],
        mut edges: Vec<Edge>,
        narrator: Option<usize>,
        narrator_links: &[usize],
        issues: &mut Vec<Issue>,
    ) -> (Clusters, usize) {
        let mut clusters = Clusters::new(all);
        let mut links = 0;

        if let Some(n) = narrator {
            for &p in narrator_links {
                if clusters.union(p, n, 1.0) {
                    links += 1;
                }
            }
        }

        edges.retain(|e| e.score > self.config.link_threshold);
        edges.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.anaphor.cmp(&b.anaphor))
                .then(b.antecedent.cmp(&a.antecedent))
        });
        let mut rivals: BTreeMap<usize, Vec<(usize, f64)>> = BTreeMap::new();
        for e in &edges {
            rivals.entry(e.anaphor).or_default().push((e.antecedent, e.score));
        }

        let mut settled: BTreeSet<usize> = BTreeSet::new();
        for e in &edges {
            let p = e.anaphor;
            if settled.contains(&p) {
                continue;
            }
            let ra = clusters.find(p);
            let rc = clusters.find(e.antecedent);
            if ra == rc {
                settled.insert(p);
                continue;
            }
            if conflicts(clusters.gender[ra], clusters.gender[rc]) {
                continue;
            }
            let rival = rivals[&p]
                .iter()
                .filter(|(q, score)| *q != e.antecedent && (e.score - score).abs() <= self.config.ambiguity_margin)
                .find_map(|&(q, score)| {
                    let ro = clusters.find(q);
                    (ro != rc && ro != ra && !conflicts(clusters.gender[ra], clusters.gender[ro]))
                        .then_some((q, score))
                });
            settled.insert(p);
            if let Some((q, score)) = rival {
                let err = Error::ambiguous(format!(
                    "'{}' ({}) ties between '{}' and '{}' ({:.2} vs {:.2})",
                    all[p].text, all[p].id, all[e.antecedent].text, all[q].text, e.score, score
                ));
                log::debug!("[coref] abstaining: {err}");
                issues.push(Issue::from_error(Phase::Coreference, &err));
                continue;
            }
            if clusters.union(p, e.antecedent, e.confidence) {
                links += 1;
            }
        }
        (clusters, links)
    }
}

/// Union-find over mention positions, tracking each cluster's explicit
/// gender and the confidences of the links that built it.
struct Clusters {
    parent: Vec<usize>,
    gender: Vec<Option<Gender>>,
    link_conf: HashMap<usize, (f64, usize)>,
}

impl Clusters {
    fn new(all: &[Mention]) -> Self {
        Self {
            parent: (0..all.len()).collect(),
            gender: all.iter().map(|m| m.gender).collect(),
            link_conf: HashMap::new(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        fn find(parent: &mut [usize], x: usize) -> usize {
            if parent[x] != x {
                parent[x] = find(parent, parent[x]);
            }
            parent[x]
        }
        find(&mut self.parent, x)
    }

    /// Join the clusters of `a` and `b`; the lower position becomes root.
    fn union(&mut self, a: usize, b: usize, confidence: f64) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child] = root;
        self.gender[root] = self.gender[root].or(self.gender[child]);
        let moved = self.link_conf.remove(&child).unwrap_or((0.0, 0));
        let slot = self.link_conf.entry(root).or_insert((0.0, 0));
        slot.0 += moved.0 + confidence;
        slot.1 += moved.1 + 1;
        true
    }

    /// Mean confidence of the links inside the cluster rooted at `root`.
    fn confidence(&self, root: usize) -> Option<f64> {
        self.link_conf
            .get(&root)
            .filter(|(_, n)| *n > 0)
            .map(|(sum, n)| sum / *n as f64)
    }
}

fn conflicts(a: Option<Gender>, b: Option<Gender>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x != y)
}

/// Hard filters between an anaphor and a candidate antecedent.
fn anaphor_compatible(a: &Mention, c: &Mention) -> bool {
    if !c.kind.compatible(EntityKind::Person) {
        return false;
    }
    let person_ok = match (a.person, c.person) {
        (Some(x), Some(y)) => x == y,
        (Some(Person::First | Person::Second), None) => false,
        _ => true,
    };
    person_ok && !conflicts(a.gender, c.gender) && !matches!((a.number, c.number), (Some(x), Some(y)) if x != y)
}

/// Turn chains into entities of the store.
///
/// Name and display form come from the chain representative; the kind is
/// the majority kind of the chain's NER mentions; aliases are the normalized
/// proper-name surfaces. With an embedder, each entity also gets a profile
/// vector from the sentences it is mentioned in.
pub fn materialize(
    doc: &Document,
    mentions: &[Mention],
    chains: &[CoreferenceChain],
    store: &mut EntityStore,
    embedder: Option<&dyn Embedder>,
) -> Result<Vec<Issue>> {
    let by_id: HashMap<MentionId, &Mention> = mentions.iter().map(|m| (m.id, m)).collect();
    let mut issues = Vec::new();
    let mut embedder = embedder;

    for chain in chains {
        let members: Vec<&Mention> = chain.mentions.iter().filter_map(|id| by_id.get(id).copied()).collect();
        let Some(rep) = by_id.get(&chain.representative) else {
            return Err(Error::data_integrity(format!(
                "chain {} has unknown representative {}",
                chain.id.0, chain.representative
            )));
        };

        let mut kinds: BTreeMap<EntityKind, usize> = BTreeMap::new();
        for m in members.iter().filter(|m| m.form.is_nominal()) {
            *kinds.entry(m.kind).or_default() += 1;
        }
        let kind = majority(&kinds).unwrap_or(rep.kind);

        let id = store.create(rep.text.clone(), kind);
        for m in &members {
            store.attach_mention(id, m.id)?;
        }
        let mut genders: BTreeMap<Gender, usize> = BTreeMap::new();
        let mut numbers = BTreeMap::new();
        for m in &members {
            if let Some(g) = m.gender {
                *genders.entry(g).or_default() += 1;
            }
            if let Some(n) = m.number {
                *numbers.entry(n).or_default() += 1;
            }
        }
        let profile_text: Vec<&str> = {
            let mut seen = BTreeSet::new();
            members
                .iter()
                .filter(|m| seen.insert(m.sentence))
                .take(5)
                .filter_map(|m| doc.sentence(m.sentence).map(|s| doc.slice(s.span)))
                .collect()
        };
        let profile = match embedder {
            Some(e) => match e.embed(&profile_text.join(" ")) {
                Ok(v) => Some(v),
                Err(err) => {
                    log::warn!("[coref] profile embeddings unavailable: {err}");
                    issues.push(Issue::from_error(Phase::Coreference, &err));
                    embedder = None;
                    None
                }
            },
            None => None,
        };

        let Some(entity) = store.get_mut(id) else {
            return Err(Error::data_integrity(format!("entity {id} vanished after creation")));
        };
        entity.gender = majority(&genders);
        entity.number = majority(&numbers);
        entity.first_chapter = members.iter().map(|m| m.chapter).min().unwrap_or(rep.chapter);
        entity.profile = profile;
        for m in members.iter().filter(|m| m.form.is_nominal()) {
            entity.surface_forms.insert(m.text.clone());
            if m.form == MentionForm::Proper {
                let alias = normalize_alias(&m.text);
                if !alias.is_empty() {
                    entity.aliases.insert(alias);
                }
            }
        }
    }
    Ok(issues)
}

/// Most frequent key; `None` on a tie for first place.
fn majority<K: Copy + Ord>(counts: &BTreeMap<K, usize>) -> Option<K> {
    let max = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, n)| **n == max).map(|(k, _)| *k);
    let first = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(first)
    }
}
