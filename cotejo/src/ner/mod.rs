//! NER voting ensemble.
//!
//! Several independent voters propose `(span, kind, confidence)` candidates
//! for a chapter. Votes naming coordinated people ("María y Eva") are split
//! per conjunct, then overlapping candidates are clustered. Within a cluster
//! each span is scored by its weighted votes; spans are tried in
//! [`SpanStrategy`] order against three linguistic filters, and every span
//! that passes and does not overlap an earlier winner becomes a [`Mention`]
//! whose kind is decided by a weighted vote.
//!
//! ```text
//!   statistical ─┐
//!   transformer ─┤   votes    ┌──────────┐  clusters  ┌─────────┐  mentions
//!   gazetteer   ─┼──────────▶ │ cluster  │ ─────────▶ │ filters │ ─────────▶
//!   heuristic   ─┤            │ + decide │            └─────────┘
//!   llm         ─┘            └──────────┘
//! ```
//!
//! | Filter | Drops / changes |
//! |--------|-----------------|
//! | dominant POS | spans whose majority tag is VERB/AUX |
//! | sentence boundary | spans crossing a sentence end not caused by "Sr." or "J." |
//! | MISC promotion | MISC becomes PERSON only with a known name *and* an animate verb |
//!
//! A voter that fails is dropped for the rest of the run; the remaining
//! voters still decide, with lower absolute confidence.

mod voters;

pub use voters::{
    Gazetteer, GazetteerVoter, HeuristicVoter, LlmVoter, StatisticalVoter, TransformerVoter,
};

use crate::lang;
use crate::pipeline::{CancellationToken, Issue, Phase, RunLimits};
use crate::voting::{Aggregator, Vote};
use crate::{Error, Result};
use cotejo_core::{
    Chapter, DepRel, Document, EntityKind, Mention, MentionForm, MentionId, Person, Pos, Span,
    Task, VoteSource, VotingWeights,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;

/// A candidate entity span proposed by one voter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanVote {
    pub span: Span,
    pub kind: EntityKind,
    pub confidence: f64,
}

impl SpanVote {
    /// Create a vote.
    #[must_use]
    pub fn new(span: Span, kind: EntityKind, confidence: f64) -> Self {
        Self {
            span,
            kind,
            confidence,
        }
    }
}

/// An independent NER method.
pub trait SpanVoter: Send + Sync {
    /// Voter name; must match a key of the NER voting weights.
    fn name(&self) -> &str;

    /// Propose candidate spans for one chapter.
    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>>;
}

/// How the representative span of an overlap cluster is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStrategy {
    /// Longest proposed span. Prefers "María Sánchez" over "María".
    #[default]
    LongestSpan,
    /// Span with the most weighted support.
    HighestVote,
}

/// NER phase settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    pub strategy: SpanStrategy,
    /// Minimum weighted score (among voters that fired) to keep a cluster.
    pub min_score: f64,
    /// Allow MISC → PERSON promotion.
    pub promote_misc: bool,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            strategy: SpanStrategy::LongestSpan,
            min_score: 0.3,
            promote_misc: true,
        }
    }
}

/// Result of the NER phase.
#[derive(Debug, Clone, Default)]
pub struct NerOutcome {
    pub mentions: Vec<Mention>,
    pub issues: Vec<Issue>,
    /// Voters dropped during the run.
    pub degraded: Vec<String>,
    /// Candidates discarded by the filters.
    pub filtered: usize,
}

/// Voting NER over a set of voters.
///
/// ```rust
/// use cotejo::ner::{NerEnsemble, SpanStrategy, StatisticalVoter, HeuristicVoter};
///
/// let ner = NerEnsemble::builder()
///     .voter(StatisticalVoter::new())
///     .voter(HeuristicVoter::new())
///     .strategy(SpanStrategy::LongestSpan)
///     .build();
/// assert_eq!(ner.voter_names(), vec!["statistical", "heuristic"]);
/// ```
pub struct NerEnsemble {
    voters: Vec<Arc<dyn SpanVoter>>,
    config: NerConfig,
}

/// Builder for [`NerEnsemble`].
#[derive(Default)]
pub struct NerEnsembleBuilder {
    voters: Vec<Arc<dyn SpanVoter>>,
    config: NerConfig,
}

impl NerEnsembleBuilder {
    /// Add a voter.
    #[must_use]
    pub fn voter<V: SpanVoter + 'static>(mut self, voter: V) -> Self {
        self.voters.push(Arc::new(voter));
        self
    }

    /// Add a shared voter.
    #[must_use]
    pub fn voter_arc(mut self, voter: Arc<dyn SpanVoter>) -> Self {
        self.voters.push(voter);
        self
    }

    /// Set the span strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: SpanStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: NerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the ensemble.
    #[must_use]
    pub fn build(self) -> NerEnsemble {
        NerEnsemble {
            voters: self.voters,
            config: self.config,
        }
    }
}

impl NerEnsemble {
    /// Start a builder.
    #[must_use]
    pub fn builder() -> NerEnsembleBuilder {
        NerEnsembleBuilder::default()
    }

    /// Names of the registered voters.
    #[must_use]
    pub fn voter_names(&self) -> Vec<&str> {
        self.voters.iter().map(|v| v.name()).collect()
    }

    /// Run every voter on every chapter and vote.
    pub fn run(
        &self,
        doc: &Document,
        weights: &VotingWeights,
        cancel: &CancellationToken,
        limits: RunLimits,
    ) -> Result<NerOutcome> {
        let registered: Vec<String> = self.voters.iter().map(|v| v.name().to_string()).collect();
        let aggregator = Aggregator::new(Task::Ner, weights, registered);
        let mut outcome = NerOutcome::default();
        let mut down: BTreeSet<String> = BTreeSet::new();

        'chapters: for chapter in &doc.chapters {
            cancel.check(Phase::Ner)?;
            let active: Vec<&Arc<dyn SpanVoter>> = self
                .voters
                .iter()
                .filter(|v| !down.contains(v.name()))
                .collect();
            let results = run_voters(&active, doc, chapter);

            // Single-threaded reduction.
            let mut votes: Vec<(String, SpanVote)> = Vec::new();
            for (name, result) in results {
                match result {
                    Ok(list) => {
                        log::debug!("[ner] {name}: {} candidates in chapter {}", list.len(), chapter.number);
                        votes.extend(list.into_iter().map(|v| (name.clone(), v)));
                    }
                    Err(e) if e.is_fatal() || matches!(e, Error::Cancelled { .. }) => return Err(e),
                    Err(e) => {
                        log::warn!("[ner] voter '{name}' dropped: {e}");
                        outcome.issues.push(Issue::from_error(Phase::Ner, &e.attributed_to(&name)));
                        down.insert(name);
                    }
                }
            }

            let votes: Vec<(String, SpanVote)> = votes
                .into_iter()
                .flat_map(|(name, v)| {
                    split_coordinated(doc, chapter, v)
                        .into_iter()
                        .map(move |part| (name.clone(), part))
                })
                .collect();
            for cluster in cluster_votes(votes) {
                let (mentions, filtered) = self.decide_cluster(doc, chapter, &aggregator, &cluster);
                outcome.filtered += filtered;
                for mention in mentions {
                    if outcome.mentions.len() >= limits.max_items {
                        log::warn!("[ner] mention cap {} reached", limits.max_items);
                        outcome.issues.push(Issue::limit(
                            Phase::Ner,
                            format!("mention cap of {} reached; remaining candidates ignored", limits.max_items),
                        ));
                        break 'chapters;
                    }
                    cancel.check_every(Phase::Ner, outcome.mentions.len(), limits.cancel_check_interval)?;
                    outcome.mentions.push(mention);
                }
            }
        }

        outcome.mentions.sort_by_key(|m| (m.span.start, m.span.end));
        for (i, m) in outcome.mentions.iter_mut().enumerate() {
            m.id = MentionId(i as u32);
        }
        outcome.degraded = down.into_iter().collect();
        log::info!(
            "[ner] {} mentions, {} filtered, {} voters degraded",
            outcome.mentions.len(),
            outcome.filtered,
            outcome.degraded.len()
        );
        Ok(outcome)
    }

    /// Pick the mentions of one overlap cluster.
    ///
    /// Every distinct span is scored by the weighted votes proposing it, out
    /// of all voters that fired in the cluster. Spans are tried in strategy
    /// order; a span that fails a filter is counted and the next one is
    /// tried, and spans overlapping an accepted one are skipped. Returns the
    /// mentions and the number of filtered spans.
    fn decide_cluster(
        &self,
        doc: &Document,
        chapter: &Chapter,
        aggregator: &Aggregator<'_>,
        cluster: &[(String, SpanVote)],
    ) -> (Vec<Mention>, usize) {
        let mut fired: Vec<&str> = cluster.iter().map(|(n, _)| n.as_str()).collect();
        fired.sort_unstable();
        fired.dedup();

        let mut backers: BTreeMap<Span, BTreeMap<&str, f64>> = BTreeMap::new();
        for (name, v) in cluster {
            let slot = backers.entry(v.span).or_default().entry(name.as_str()).or_insert(0.0);
            *slot = slot.max(v.confidence);
        }
        let mut ranked: Vec<(Span, f64)> = backers
            .iter()
            .map(|(span, by)| {
                let by: Vec<(&str, f64)> = by.iter().map(|(n, c)| (*n, *c)).collect();
                (*span, aggregator.support(&fired, &by).score)
            })
            .filter(|(span, score)| {
                let keep = *score >= self.config.min_score;
                if !keep {
                    log::debug!("[ner] '{}' below threshold ({score:.2})", doc.slice(*span));
                }
                keep
            })
            .collect();
        ranked.sort_by(|(a, sa), (b, sb)| {
            let order = match self.config.strategy {
                SpanStrategy::LongestSpan => b.len().cmp(&a.len()).then(sb.total_cmp(sa)),
                SpanStrategy::HighestVote => sb.total_cmp(sa).then(b.len().cmp(&a.len())),
            };
            order.then(a.start.cmp(&b.start))
        });

        let mut accepted: Vec<Mention> = Vec::new();
        let mut filtered = 0;
        for (span, _) in ranked {
            if accepted.iter().any(|m| m.span.overlaps(&span)) {
                continue;
            }
            let Some(candidate) = candidate_for(aggregator, cluster, span) else {
                continue;
            };
            match self.to_mention(doc, chapter, candidate) {
                Some(m) => accepted.push(m),
                None => filtered += 1,
            }
        }
        (accepted, filtered)
    }

    /// Apply the filters and build the mention. `None` when filtered out.
    fn to_mention(&self, doc: &Document, chapter: &Chapter, c: Candidate) -> Option<Mention> {
        let pieces = locate(doc, chapter, c.span);
        let (first_sentence, first_range) = pieces.first()?.clone();
        if pieces.len() > 1 && !boundary_is_artefact(doc, &pieces) {
            log::debug!("[ner] '{}' crosses a sentence boundary", doc.slice(c.span));
            return None;
        }
        let sentence = &doc.sentences[first_sentence];
        let head = sentence.head_of(first_range.clone())?;
        if dominant_pos_is_verbal(doc, &pieces, sentence.tokens[head].pos) {
            log::debug!("[ner] '{}' is verbal", doc.slice(c.span));
            return None;
        }

        let text = doc.slice(c.span).to_string();
        let mut kind = c.kind;
        if kind == EntityKind::Misc && self.config.promote_misc && promotes_to_person(sentence, head, &text) {
            log::debug!("[ner] promoting '{text}' to PERSON");
            kind = EntityKind::Person;
        }

        let tokens = &sentence.tokens[first_range.clone()];
        let form = if tokens.iter().any(|t| t.pos == Pos::Propn) {
            MentionForm::Proper
        } else {
            MentionForm::DefiniteNp
        };
        let head_tok = &sentence.tokens[head];
        let gender = head_tok.morph.gender.or_else(|| {
            sentence
                .children(head)
                .filter(|&j| sentence.tokens[j].dep == DepRel::Det)
                .find_map(|j| sentence.tokens[j].morph.gender)
        });
        Some(Mention {
            id: MentionId(0),
            span: c.span,
            text,
            kind,
            form,
            gender,
            number: head_tok.morph.number,
            person: Some(Person::Third),
            chapter: chapter.number,
            sentence: first_sentence,
            paragraph: sentence.paragraph,
            head_token: head,
            provenance: c.provenance,
            confidence: c.confidence,
        })
    }
}

struct Candidate {
    span: Span,
    kind: EntityKind,
    confidence: f64,
    provenance: Vec<VoteSource>,
}

/// Confidence kept by each conjunct of a split coordination.
const COORDINATED_DISCOUNT: f64 = 0.85;

type VoterResult = (String, Result<Vec<SpanVote>>);

fn run_voters(voters: &[&Arc<dyn SpanVoter>], doc: &Document, chapter: &Chapter) -> Vec<VoterResult> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        voters
            .par_iter()
            .map(|v| (v.name().to_string(), v.propose(doc, chapter)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        voters
            .iter()
            .map(|v| (v.name().to_string(), v.propose(doc, chapter)))
            .collect()
    }
}

/// Group votes whose spans overlap, transitively.
fn cluster_votes(mut votes: Vec<(String, SpanVote)>) -> Vec<Vec<(String, SpanVote)>> {
    votes.retain(|(_, v)| !v.span.is_empty());
    votes.sort_by(|a, b| {
        a.1.span
            .start
            .cmp(&b.1.span.start)
            .then(b.1.span.end.cmp(&a.1.span.end))
            .then(a.0.cmp(&b.0))
    });
    let mut clusters: Vec<Vec<(String, SpanVote)>> = Vec::new();
    let mut cover: Option<Span> = None;
    for vote in votes {
        match cover {
            Some(c) if c.overlaps(&vote.1.span) => {
                cover = Some(c.cover(&vote.1.span));
                if let Some(last) = clusters.last_mut() {
                    last.push(vote);
                }
            }
            _ => {
                cover = Some(vote.1.span);
                clusters.push(vec![vote]);
            }
        }
    }
    clusters
}

/// Kind vote over the votes lying inside `span`.
fn candidate_for(aggregator: &Aggregator<'_>, cluster: &[(String, SpanVote)], span: Span) -> Option<Candidate> {
    let inside: Vec<&(String, SpanVote)> = cluster.iter().filter(|(_, v)| span.contains(&v.span)).collect();
    let kind_votes: Vec<Vote<EntityKind>> = inside
        .iter()
        .map(|(name, v)| Vote::new(name.clone(), v.kind, v.confidence))
        .collect();
    let decision = aggregator.decide(&kind_votes)?;
    let mut provenance: BTreeMap<&str, f64> = BTreeMap::new();
    for (name, v) in inside {
        let slot = provenance.entry(name.as_str()).or_insert(0.0);
        *slot = slot.max(v.confidence);
    }
    Some(Candidate {
        span,
        kind: decision.choice,
        confidence: decision.confidence,
        provenance: provenance
            .into_iter()
            .map(|(voter, confidence)| VoteSource {
                voter: voter.to_string(),
                confidence,
            })
            .collect(),
    })
}

/// Split a vote covering coordinated names ("María y Eva") into one vote
/// per conjunct. Votes without a coordinating conjunction between proper
/// nouns come back unchanged.
fn split_coordinated(doc: &Document, chapter: &Chapter, vote: SpanVote) -> Vec<SpanVote> {
    let pieces = locate(doc, chapter, vote.span);
    let [(i, range)] = pieces.as_slice() else {
        return vec![vote];
    };
    let s = &doc.sentences[*i];
    let mut parts: Vec<Range<usize>> = Vec::new();
    let mut start = range.start;
    let mut coordinated = false;
    for j in range.clone() {
        let t = &s.tokens[j];
        let conj = matches!(t.lower().as_str(), "y" | "e") && (t.pos == Pos::Cconj || t.dep == DepRel::Cc);
        if conj || (t.pos == Pos::Punct && t.text == ",") {
            coordinated |= conj;
            parts.push(start..j);
            start = j + 1;
        }
    }
    parts.push(start..range.end);
    if !coordinated {
        return vec![vote];
    }
    let names: Vec<Span> = parts
        .into_iter()
        .filter_map(|p| {
            let toks = &s.tokens[p];
            let first = toks.iter().position(|t| t.pos != Pos::Punct)?;
            let last = toks.iter().rposition(|t| t.pos != Pos::Punct)?;
            let toks = &toks[first..=last];
            toks.iter()
                .any(|t| t.pos == Pos::Propn)
                .then(|| toks[0].span.cover(&toks[toks.len() - 1].span))
        })
        .collect();
    if names.len() < 2 {
        return vec![vote];
    }
    log::debug!("[ner] splitting coordinated '{}'", doc.slice(vote.span));
    names
        .into_iter()
        .map(|span| SpanVote::new(span, vote.kind, vote.confidence * COORDINATED_DISCOUNT))
        .collect()
}

/// Token ranges of `span` in each sentence of the chapter it touches.
fn locate(doc: &Document, chapter: &Chapter, span: Span) -> Vec<(usize, Range<usize>)> {
    chapter
        .sentences
        .clone()
        .filter_map(|i| {
            let s = &doc.sentences[i];
            if !s.span.overlaps(&span) {
                return None;
            }
            let range = s.tokens_in(span);
            (!range.is_empty()).then_some((i, range))
        })
        .collect()
}

/// Every sentence break inside the span follows an abbreviation or initial.
fn boundary_is_artefact(doc: &Document, pieces: &[(usize, Range<usize>)]) -> bool {
    pieces[..pieces.len() - 1].iter().all(|(i, range)| {
        let s = &doc.sentences[*i];
        range.end == s.tokens.len()
            && s.tokens
                .get(range.end.saturating_sub(1))
                .is_some_and(|t| lang::is_abbreviation(&t.text))
    })
}

fn dominant_pos_is_verbal(doc: &Document, pieces: &[(usize, Range<usize>)], head_pos: Pos) -> bool {
    let mut counts: HashMap<Pos, usize> = HashMap::new();
    for (i, range) in pieces {
        for t in &doc.sentences[*i].tokens[range.clone()] {
            if t.pos != Pos::Punct {
                *counts.entry(t.pos).or_default() += 1;
            }
        }
    }
    let Some(max) = counts.values().copied().max() else {
        return false;
    };
    let leaders: Vec<Pos> = counts
        .iter()
        .filter(|(_, n)| **n == max)
        .map(|(p, _)| *p)
        .collect();
    let dominant = if leaders.len() == 1 || leaders.contains(&head_pos) {
        if leaders.len() == 1 {
            leaders[0]
        } else {
            head_pos
        }
    } else {
        return false;
    };
    dominant.is_verbal()
}

fn promotes_to_person(sentence: &cotejo_core::Sentence, head: usize, text: &str) -> bool {
    if !lang::is_person_name(text) {
        return false;
    }
    let tok = &sentence.tokens[head];
    let Some(gov) = tok.head.map(|h| &sentence.tokens[h]) else {
        return false;
    };
    (tok.dep.is_subject() && lang::selects_animate_subject(&gov.lemma))
        || (tok.dep == DepRel::Obj && lang::selects_animate_object(&gov.lemma))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::parse_conllu;

    struct Fixed(&'static str, Vec<SpanVote>);

    impl SpanVoter for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn propose(&self, _doc: &Document, _chapter: &Chapter) -> Result<Vec<SpanVote>> {
            Ok(self.1.clone())
        }
    }

    struct Broken;

    impl SpanVoter for Broken {
        fn name(&self) -> &str {
            "llm"
        }
        fn propose(&self, _doc: &Document, _chapter: &Chapter) -> Result<Vec<SpanVote>> {
            Err(Error::voter_unavailable("llm", "timeout"))
        }
    }

    const DOC: &str = "\
# chapter = 1
1\tMaría\tMaría\tPROPN\t_\t_\t2\tnsubj\t_\t_
2\tsonrió\tsonreír\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t0\troot\t_\t_
3\ta\ta\tADP\t_\t_\t4\tcase\t_\t_
4\tPedro\tPedro\tPROPN\t_\t_\t2\tobl\t_\tSpaceAfter=No
5\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
";

    fn limits() -> RunLimits {
        RunLimits {
            max_items: 100,
            cancel_check_interval: 8,
        }
    }

    fn run(ner: &NerEnsemble, doc: &Document) -> NerOutcome {
        ner.run(doc, &VotingWeights::default(), &CancellationToken::new(), limits())
            .unwrap()
    }

    fn texts(out: &NerOutcome) -> Vec<&str> {
        out.mentions.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_weak_long_span_does_not_displace_name() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed("statistical", vec![SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8)]))
            .voter(Fixed("gazetteer", vec![SpanVote::new(Span::new(0, 12), EntityKind::Person, 0.2)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(texts(&out), vec!["María"]);
        assert_eq!(out.filtered, 0);
    }

    #[test]
    fn test_names_survive_a_covering_weak_vote() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed(
                "statistical",
                vec![
                    SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8),
                    SpanVote::new(Span::new(15, 20), EntityKind::Person, 0.8),
                ],
            ))
            .voter(Fixed("heuristic", vec![SpanVote::new(Span::new(0, 20), EntityKind::Person, 0.1)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(texts(&out), vec!["María", "Pedro"]);
    }

    #[test]
    fn test_filtered_long_span_falls_back_to_inner_name() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed("transformer", vec![SpanVote::new(Span::new(0, 12), EntityKind::Person, 0.9)]))
            .voter(Fixed("statistical", vec![SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8)]))
            .voter(Fixed("gazetteer", vec![SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.9)]))
            .build();
        let out = run(&ner, &doc);
        // "María sonrió" wins on length but is verbal.
        assert_eq!(texts(&out), vec!["María"]);
        assert_eq!(out.filtered, 1);
        let voters: Vec<&str> = out.mentions[0].voters().collect();
        assert!(voters.contains(&"statistical") && voters.contains(&"gazetteer"));
    }

    #[test]
    fn test_coordinated_names_split() {
        let doc = parse_conllu(
            "\
1\tMaría\tMaría\tPROPN\t_\t_\t4\tnsubj\t_\t_
2\ty\ty\tCCONJ\t_\t_\t3\tcc\t_\t_
3\tEva\tEva\tPROPN\t_\t_\t1\tconj\t_\t_
4\tllegaron\tllegar\tVERB\t_\tMood=Ind|Number=Plur|Person=3|VerbForm=Fin\t0\troot\t_\tSpaceAfter=No
5\t.\t.\tPUNCT\t_\t_\t4\tpunct\t_\t_
",
        )
        .unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed("transformer", vec![SpanVote::new(Span::new(0, 11), EntityKind::Person, 0.9)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(texts(&out), vec!["María", "Eva"]);
        assert!(out.mentions.iter().all(|m| m.kind == EntityKind::Person));
    }

    #[test]
    fn test_verbal_span_discarded_but_name_kept() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed(
                "statistical",
                vec![
                    SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8),
                    SpanVote::new(Span::new(15, 20), EntityKind::Person, 0.8),
                ],
            ))
            .voter(Fixed("heuristic", vec![SpanVote::new(Span::new(6, 12), EntityKind::Misc, 0.9)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(texts(&out), vec!["María", "Pedro"]);
        assert_eq!(out.filtered, 1);
        assert_eq!(out.mentions[0].id, MentionId(0));
        assert_eq!(out.mentions[0].form, MentionForm::Proper);
    }

    #[test]
    fn test_failing_voter_degrades() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed("statistical", vec![SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8)]))
            .voter(Broken)
            .build();
        let out = run(&ner, &doc);
        assert_eq!(out.mentions.len(), 1);
        assert_eq!(out.degraded, vec!["llm".to_string()]);
        assert_eq!(out.issues.len(), 1);
        assert!(out.mentions[0].confidence < 0.8);
    }

    #[test]
    fn test_misc_promoted_with_name_and_animate_verb() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed("heuristic", vec![SpanVote::new(Span::new(0, 5), EntityKind::Misc, 0.6)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(out.mentions[0].kind, EntityKind::Person);

        // Pedro is an oblique, not subject or object: stays MISC.
        let ner = NerEnsemble::builder()
            .voter(Fixed("heuristic", vec![SpanVote::new(Span::new(15, 20), EntityKind::Misc, 0.6)]))
            .build();
        let out = run(&ner, &doc);
        assert_eq!(out.mentions[0].kind, EntityKind::Misc);
    }

    #[test]
    fn test_mention_cap() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder()
            .voter(Fixed(
                "statistical",
                vec![
                    SpanVote::new(Span::new(0, 5), EntityKind::Person, 0.8),
                    SpanVote::new(Span::new(15, 20), EntityKind::Person, 0.8),
                ],
            ))
            .build();
        let out = ner
            .run(
                &doc,
                &VotingWeights::default(),
                &CancellationToken::new(),
                RunLimits {
                    max_items: 1,
                    cancel_check_interval: 8,
                },
            )
            .unwrap();
        assert_eq!(out.mentions.len(), 1);
        assert!(out.issues.iter().any(|i| i.kind == crate::pipeline::IssueKind::LimitReached));
    }

    #[test]
    fn test_cancelled_token_stops_phase() {
        let doc = parse_conllu(DOC).unwrap();
        let ner = NerEnsemble::builder().voter(StatisticalVoter::new()).build();
        let token = CancellationToken::new();
        token.cancel();
        let err = ner
            .run(&doc, &VotingWeights::default(), &token, limits())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { phase: Phase::Ner }));
    }
}
