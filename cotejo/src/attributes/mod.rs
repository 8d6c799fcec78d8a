//! Attribute extraction, voting and binding.
//!
//! ```text
//!   patterns   ─┐
//!   dependency ─┤ candidates ┌──────┐ voted ┌──────────┐ bound ┌──────────┐
//!   embeddings ─┼──────────▶ │ vote │ ────▶ │ negation │ ────▶ │  scope   │ ──▶ assertions
//!   llm        ─┘            └──────┘       └──────────┘       │ modality │
//!                                                              └──────────┘
//! ```
//!
//! Extractors run per chapter and never touch the entity store; the single
//! reducer votes, binds through [`ScopeResolver`](crate::scope::ScopeResolver)
//! and writes assertions. Re-asserting the same key on the same span
//! supersedes the earlier assertion instead of duplicating it.

pub mod context;
mod extract;
pub mod lexicon;
mod voting;

pub use extract::{
    AttributeExtractor, Candidate, DependencyExtractor, EmbeddingsExtractor, LlmExtractor,
    PatternExtractor,
};
pub use voting::{vote, Voted};

use crate::pipeline::{CancellationToken, Issue, Phase, RunLimits};
use crate::scope::{ScopeConfig, ScopeResolver};
use crate::{Error, Result};
use cotejo_core::{
    AssertionId, AttributeAssertion, Chapter, Document, EntityStore, Mention, VotingWeights,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Attribute phase settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// Voted candidates below this confidence are dropped.
    pub min_confidence: f64,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self { min_confidence: 0.5 }
    }
}

/// Result of the attribute phase.
#[derive(Debug, Clone, Default)]
pub struct AttributeOutcome {
    /// Assertions written to the store, in text order.
    pub added: Vec<AssertionId>,
    pub issues: Vec<Issue>,
    pub degraded: Vec<String>,
    /// Voted candidates the scope resolver could not bind.
    pub unbound: usize,
    /// Candidates dropped because they were negated.
    pub negated: usize,
    /// Earlier assertions superseded by a restatement.
    pub superseded: usize,
    /// Voted candidates below the confidence threshold.
    pub below_threshold: usize,
}

/// Attribute extraction over a set of extractors.
pub struct AttributeEnsemble {
    extractors: Vec<Arc<dyn AttributeExtractor>>,
    config: AttributeConfig,
    scope: ScopeConfig,
}

/// Builder for [`AttributeEnsemble`].
#[derive(Default)]
pub struct AttributeEnsembleBuilder {
    extractors: Vec<Arc<dyn AttributeExtractor>>,
    config: AttributeConfig,
    scope: ScopeConfig,
}

impl AttributeEnsembleBuilder {
    /// Add an extractor.
    #[must_use]
    pub fn extractor<E: AttributeExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    /// Add a shared extractor.
    #[must_use]
    pub fn extractor_arc(mut self, extractor: Arc<dyn AttributeExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    #[must_use]
    pub fn config(mut self, config: AttributeConfig) -> Self {
        self.config = config;
        self
    }

    /// Scope resolver settings used for binding.
    #[must_use]
    pub fn scope(mut self, scope: ScopeConfig) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn build(self) -> AttributeEnsemble {
        AttributeEnsemble {
            extractors: self.extractors,
            config: self.config,
            scope: self.scope,
        }
    }
}

impl AttributeEnsemble {
    #[must_use]
    pub fn builder() -> AttributeEnsembleBuilder {
        AttributeEnsembleBuilder::default()
    }

    /// Names of the registered extractors.
    #[must_use]
    pub fn extractor_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Extract, vote, bind and store attributes for every chapter.
    pub fn run(
        &self,
        doc: &Document,
        mentions: &[Mention],
        store: &mut EntityStore,
        weights: &VotingWeights,
        cancel: &CancellationToken,
        limits: RunLimits,
    ) -> Result<AttributeOutcome> {
        let mut outcome = AttributeOutcome::default();
        let mut down: BTreeSet<String> = BTreeSet::new();
        let mut stored = store.assertions().filter(|a| a.is_current()).count();

        // Bindings are computed against the entity set as fusion left it.
        let registered = self.extractor_names();
        let mut voted_all: Vec<Voted> = Vec::new();
        for chapter in &doc.chapters {
            cancel.check(Phase::Attributes)?;
            let active: Vec<&Arc<dyn AttributeExtractor>> = self
                .extractors
                .iter()
                .filter(|e| !down.contains(e.name()))
                .collect();

            let mut candidates: Vec<(String, Candidate)> = Vec::new();
            for (name, result) in run_extractors(&active, doc, chapter) {
                match result {
                    Ok(list) => {
                        log::debug!(
                            "[attributes] {name}: {} candidates in chapter {}",
                            list.len(),
                            chapter.number
                        );
                        candidates.extend(list.into_iter().map(|c| (name.clone(), c)));
                    }
                    Err(e) if e.is_fatal() || matches!(e, Error::Cancelled { .. }) => return Err(e),
                    Err(e) => {
                        log::warn!("[attributes] extractor '{name}' dropped: {e}");
                        outcome
                            .issues
                            .push(Issue::from_error(Phase::Attributes, &e.attributed_to(&name)));
                        down.insert(name);
                    }
                }
            }
            voted_all.extend(vote(&candidates, &registered, weights));
        }

        let resolver = ScopeResolver::new(doc, mentions, store, self.scope.clone());
        let mut pending: Vec<AttributeAssertion> = Vec::new();
        for (n, v) in voted_all.into_iter().enumerate() {
            cancel.check_every(Phase::Attributes, n, limits.cancel_check_interval)?;
            if v.confidence < self.config.min_confidence {
                outcome.below_threshold += 1;
                continue;
            }
            let Some(s) = doc.sentence(v.sentence) else {
                continue;
            };
            if context::is_negated(s, v.token) {
                log::debug!("[attributes] negated '{}' skipped", v.value);
                outcome.negated += 1;
                continue;
            }
            let Some(binding) = resolver.resolve(v.sentence, v.token) else {
                log::debug!("[attributes] '{}' left unbound", v.value);
                outcome.unbound += 1;
                continue;
            };
            let excerpt = doc.slice(s.span).to_string();
            let modality = context::modality(s, v.token, &excerpt);
            pending.push(AttributeAssertion {
                id: AssertionId(0),
                key: v.key,
                value: v.value,
                normalized: v.normalized,
                entity: binding.entity,
                source_mention: Some(binding.mention),
                scope: binding.scope,
                span: v.span,
                excerpt,
                confidence: v.confidence,
                chapter: s.chapter,
                sentence: v.sentence,
                paragraph: s.paragraph,
                modality,
                source: binding.source,
                methods: v.methods,
                superseded_by: None,
            });
        }

        for assertion in pending {
            let previous: Vec<AssertionId> = store
                .get(assertion.entity)
                .map(|e| {
                    e.current(assertion.key)
                        .filter(|a| a.span == assertion.span)
                        .map(|a| a.id)
                        .collect()
                })
                .unwrap_or_default();
            if previous.is_empty() && stored >= limits.max_items {
                log::warn!("[attributes] assertion cap {} reached", limits.max_items);
                outcome.issues.push(Issue::limit(
                    Phase::Attributes,
                    format!("assertion cap of {} reached; remaining attributes ignored", limits.max_items),
                ));
                break;
            }
            let id = store.add_assertion(assertion)?;
            if previous.is_empty() {
                stored += 1;
            }
            for old in previous {
                store.supersede(old, id)?;
                outcome.superseded += 1;
            }
            outcome.added.push(id);
        }

        outcome.degraded = down.into_iter().collect();
        log::info!(
            "[attributes] {} assertions, {} unbound, {} negated, {} superseded",
            outcome.added.len(),
            outcome.unbound,
            outcome.negated,
            outcome.superseded
        );
        Ok(outcome)
    }
}

type ExtractorResult = (String, Result<Vec<Candidate>>);

fn run_extractors(
    extractors: &[&Arc<dyn AttributeExtractor>],
    doc: &Document,
    chapter: &Chapter,
) -> Vec<ExtractorResult> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        extractors
            .par_iter()
            .map(|e| (e.name().to_string(), e.extract(doc, chapter)))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        extractors
            .iter()
            .map(|e| (e.name().to_string(), e.extract(doc, chapter)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::fake::UnavailableGenerator;
    use cotejo_core::{
        parse_conllu, AssignmentSource, AttributeKey, EntityKind, Gender, MentionForm, MentionId,
        Modality, Number, Person, Span,
    };

    // "Pedro tenía los ojos verdes. No era alto."
    const PEDRO: &str = "\
# chapter = 1
1\tPedro\tPedro\tPROPN\t_\tGender=Masc|Number=Sing\t2\tnsubj\t_\t_
2\ttenía\ttener\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t0\troot\t_\t_
3\tlos\tel\tDET\t_\t_\t4\tdet\t_\t_
4\tojos\tojo\tNOUN\t_\tGender=Masc|Number=Plur\t2\tobj\t_\t_
5\tverdes\tverde\tADJ\t_\tNumber=Plur\t4\tamod\t_\tSpaceAfter=No
6\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_

1\tNo\tno\tADV\t_\tPolarity=Neg\t3\tadvmod\t_\t_
2\tera\tser\tAUX\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t3\tcop\t_\t_
3\talto\talto\tADJ\t_\tGender=Masc|Number=Sing\t0\troot\t_\tSpaceAfter=No
4\t.\t.\tPUNCT\t_\t_\t3\tpunct\t_\t_
";

    fn setup() -> (Document, Vec<Mention>, EntityStore) {
        let doc = parse_conllu(PEDRO).unwrap();
        let pedro = Mention {
            id: MentionId(0),
            span: Span::new(0, 5),
            text: "Pedro".into(),
            kind: EntityKind::Person,
            form: MentionForm::Proper,
            gender: Some(Gender::Masc),
            number: Some(Number::Sing),
            person: Some(Person::Third),
            chapter: 1,
            sentence: 0,
            paragraph: 0,
            head_token: 0,
            provenance: vec![],
            confidence: 0.9,
        };
        let mut store = EntityStore::new();
        let id = store.create("Pedro", EntityKind::Person);
        store.attach_mention(id, MentionId(0)).unwrap();
        store.get_mut(id).unwrap().gender = Some(Gender::Masc);
        (doc, vec![pedro], store)
    }

    fn ensemble() -> AttributeEnsemble {
        AttributeEnsemble::builder()
            .extractor(PatternExtractor::new())
            .extractor(DependencyExtractor::new())
            .build()
    }

    fn run(ens: &AttributeEnsemble, doc: &Document, mentions: &[Mention], store: &mut EntityStore) -> AttributeOutcome {
        ens.run(
            doc,
            mentions,
            store,
            &VotingWeights::default(),
            &CancellationToken::new(),
            RunLimits::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_binds_eye_colour_and_skips_negation() {
        let (doc, mentions, mut store) = setup();
        let out = run(&ensemble(), &doc, &mentions, &mut store);
        assert_eq!(out.added.len(), 1);
        assert_eq!(out.negated, 1);
        let a = store.assertions().next().unwrap();
        assert_eq!(a.key, AttributeKey::EyeColor);
        assert_eq!(a.normalized, "verde");
        assert_eq!(a.source, AssignmentSource::Subject);
        assert_eq!(a.modality, Modality::Asserted);
        assert_eq!(a.methods, vec!["dependency", "patterns"]);
    }

    #[test]
    fn test_rerun_supersedes_instead_of_duplicating() {
        let (doc, mentions, mut store) = setup();
        let ens = ensemble();
        run(&ens, &doc, &mentions, &mut store);
        let second = run(&ens, &doc, &mentions, &mut store);
        assert_eq!(second.superseded, 1);
        assert_eq!(store.assertions().count(), 2);
        assert_eq!(store.assertions().filter(|a| a.is_current()).count(), 1);
    }

    #[test]
    fn test_failing_extractor_degrades() {
        let (doc, mentions, mut store) = setup();
        let ens = AttributeEnsemble::builder()
            .extractor(DependencyExtractor::new())
            .extractor(LlmExtractor::new(Arc::new(UnavailableGenerator)))
            .build();
        let out = run(&ens, &doc, &mentions, &mut store);
        assert_eq!(out.degraded, vec!["llm"]);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.added.len(), 1);
    }

    #[test]
    fn test_assertion_cap() {
        let (doc, mentions, mut store) = setup();
        let out = ensemble()
            .run(
                &doc,
                &mentions,
                &mut store,
                &VotingWeights::default(),
                &CancellationToken::new(),
                RunLimits {
                    max_items: 0,
                    cancel_check_interval: 64,
                },
            )
            .unwrap();
        assert!(out.added.is_empty());
        assert!(out.issues.iter().any(|i| i.kind == crate::pipeline::IssueKind::LimitReached));
    }
}
