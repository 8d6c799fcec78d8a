//! The analysis pipeline.
//!
//! One [`Engine::analyze`] call runs the phases strictly in order:
//!
//! ```text
//! NER ──▶ coreference ──▶ fusion ──▶ attributes ──▶ consistency
//! ```
//!
//! Each phase checks its own precondition (the previous phase produced
//! something) and refuses to run otherwise. The run result always carries a
//! [`PhaseReport`] per phase and the outputs of every phase that completed:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | [`RunOutcome::Completed`] | every phase ran (possibly degraded) |
//! | [`RunOutcome::PreconditionFailed`] | a phase had no input; later phases skipped |
//! | [`RunOutcome::Cancelled`] | the token fired; later phases skipped |
//!
//! Only integrity violations surface as `Err`.

mod cancel;
mod report;

pub use cancel::CancellationToken;
pub use report::{Issue, IssueKind, Phase, PhaseReport, PhaseStatus};

use crate::attributes::AttributeEnsemble;
use crate::config::EngineConfig;
use crate::consistency::{ConsistencyChecker, SuppressionRule};
use crate::coref::{materialize, CorefEnsemble};
use crate::feedback::{FeedbackTracker, WeightTable};
use crate::ner::{Gazetteer, NerEnsemble};
use crate::signals::{Embedder, Signals, SpanTagger, TextGenerator};
use crate::sync::{lock, Mutex};
use crate::voting::VoterRegistry;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use cotejo_coalesce::{MergeEvent, MergeSuggestion, Resolver};
use cotejo_core::{
    CoreferenceChain, Document, Entity, EntityStore, Fingerprint, Inconsistency, Mention,
    VotingWeights,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Resource caps of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
    /// Hard cap on mentions held in memory, and separately on assertions.
    pub max_items: usize,
    /// Cancellation is polled every this many processed items.
    pub cancel_check_interval: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_items: 100_000,
            cancel_check_interval: 64,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    Completed,
    PreconditionFailed { phase: Phase, reason: String },
    Cancelled { phase: Phase },
}

/// Everything a run produced, always inspectable.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub started_at: DateTime<Utc>,
    /// One report per phase, in phase order.
    pub reports: Vec<PhaseReport>,
    pub mentions: Vec<Mention>,
    pub chains: Vec<CoreferenceChain>,
    pub store: EntityStore,
    pub merges: Vec<MergeEvent>,
    pub suggestions: Vec<MergeSuggestion>,
    pub findings: Vec<Inconsistency>,
    /// Weights the run voted with.
    pub weights: VotingWeights,
}

impl RunResult {
    fn new(weights: VotingWeights) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            started_at: Utc::now(),
            reports: Vec::new(),
            mentions: Vec::new(),
            chains: Vec::new(),
            store: EntityStore::new(),
            merges: Vec::new(),
            suggestions: Vec::new(),
            findings: Vec::new(),
            weights,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Report of one phase.
    #[must_use]
    pub fn report(&self, phase: Phase) -> Option<&PhaseReport> {
        self.reports.iter().find(|r| r.phase == phase)
    }

    /// Live entities, in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.iter()
    }

    /// Issues of every phase.
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.reports.iter().flat_map(|r| r.issues.iter())
    }
}

/// Output of one phase step: item count and issues.
struct Step {
    items: usize,
    issues: Vec<Issue>,
}

/// The resolution engine.
///
/// ```rust
/// use cotejo::pipeline::{Engine, RunOutcome, Phase};
/// use cotejo_core::parse_conllu;
///
/// let engine = Engine::builder().build().unwrap();
/// let empty = parse_conllu("").unwrap();
/// let result = engine.analyze(&empty).unwrap();
/// assert!(matches!(result.outcome, RunOutcome::PreconditionFailed { phase: Phase::Ner, .. }));
/// ```
pub struct Engine {
    config: EngineConfig,
    signals: Signals,
    registry: VoterRegistry,
    weights: WeightTable,
    feedback: Mutex<FeedbackTracker>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("signals", &self.signals)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    signals: Signals,
    gazetteer: Gazetteer,
    registry: Option<VoterRegistry>,
    weights: Option<VotingWeights>,
    feedback: Option<FeedbackTracker>,
}

impl EngineBuilder {
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.signals.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.signals.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn tagger(mut self, tagger: Arc<dyn SpanTagger>) -> Self {
        self.signals.tagger = Some(tagger);
        self
    }

    /// Known character and place names for the gazetteer voter.
    #[must_use]
    pub fn gazetteer(mut self, gazetteer: Gazetteer) -> Self {
        self.gazetteer = gazetteer;
        self
    }

    /// Use these voters instead of the standard set.
    #[must_use]
    pub fn registry(mut self, registry: VoterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Starting weights, e.g. restored from a previous session.
    #[must_use]
    pub fn weights(mut self, weights: VotingWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Restored feedback state.
    #[must_use]
    pub fn feedback(mut self, tracker: FeedbackTracker) -> Self {
        self.feedback = Some(tracker);
        self
    }

    /// Validate the configuration and build.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let registry = match self.registry {
            Some(r) => r,
            None => VoterRegistry::standard(&self.signals, self.gazetteer),
        };
        let feedback = self
            .feedback
            .unwrap_or_else(|| FeedbackTracker::new(self.config.feedback.clone()));
        Ok(Engine {
            registry,
            weights: WeightTable::new(self.weights.unwrap_or_default()),
            feedback: Mutex::new(feedback),
            signals: self.signals,
            config: self.config,
        })
    }
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &VoterRegistry {
        &self.registry
    }

    /// Current voting weights.
    #[must_use]
    pub fn weights(&self) -> VotingWeights {
        self.weights.snapshot()
    }

    /// Analyze a document to completion.
    pub fn analyze(&self, doc: &Document) -> Result<RunResult> {
        self.analyze_with_cancel(doc, &CancellationToken::new())
    }

    /// Analyze a document, stopping early when `cancel` fires.
    pub fn analyze_with_cancel(&self, doc: &Document, cancel: &CancellationToken) -> Result<RunResult> {
        let _guard = self.weights.begin_run()?;
        let weights = self.weights.snapshot();
        let suppressions = lock(&self.feedback).suppressions().clone();
        let limits = self.config.limits;
        let mut result = RunResult::new(weights.clone());
        log::info!(
            "[pipeline] analyzing {} chapters, {} sentences",
            doc.chapters.len(),
            doc.sentences.len()
        );

        let ner = NerEnsemble::builder().config(self.config.ner.clone());
        let ner = self.registry.ner().iter().fold(ner, |b, v| b.voter_arc(Arc::clone(v))).build();
        let coref = CorefEnsemble::builder().config(self.config.coref.clone());
        let coref = self.registry.coref().iter().fold(coref, |b, v| b.voter_arc(Arc::clone(v))).build();
        let attributes = AttributeEnsemble::builder()
            .config(self.config.attributes.clone())
            .scope(self.config.scope.clone());
        let attributes = self
            .registry
            .attributes()
            .iter()
            .fold(attributes, |b, e| b.extractor_arc(Arc::clone(e)))
            .build();
        let mut checker = ConsistencyChecker::new(self.config.consistency.clone());
        if let Some(embedder) = &self.signals.embedder {
            checker = checker.with_embedder(Arc::clone(embedder));
        }

        for phase in Phase::ORDER {
            let started = Instant::now();
            let step = cancel.check(phase).and_then(|()| match phase {
                Phase::Ner => {
                    if doc.sentences.is_empty() || doc.text.trim().is_empty() {
                        return Err(Error::precondition(phase, "document has no sentences"));
                    }
                    if self.registry.ner().is_empty() {
                        return Err(Error::precondition(phase, "no NER voters registered"));
                    }
                    let out = ner.run(doc, &weights, cancel, limits)?;
                    result.mentions = out.mentions;
                    Ok(Step {
                        items: result.mentions.len(),
                        issues: out.issues,
                    })
                }
                Phase::Coreference => {
                    if result.mentions.is_empty() {
                        return Err(Error::precondition(phase, "NER produced no mentions"));
                    }
                    let anchors = result.mentions.clone();
                    let out = coref.run(doc, anchors, &weights, cancel, limits)?;
                    result.mentions = out.mentions;
                    result.chains = out.chains;
                    Ok(Step {
                        items: result.chains.len(),
                        issues: out.issues,
                    })
                }
                Phase::Fusion => {
                    if result.chains.is_empty() {
                        return Err(Error::precondition(phase, "coreference produced no chains"));
                    }
                    let mut store = EntityStore::new();
                    let issues = materialize(
                        doc,
                        &result.mentions,
                        &result.chains,
                        &mut store,
                        self.signals.embedder.as_deref(),
                    )?;
                    let report = Resolver::with_config(self.config.fusion.clone()).fuse(&mut store)?;
                    store.check_integrity()?;
                    result.store = store;
                    result.merges = report.merges;
                    result.suggestions = report.suggestions;
                    Ok(Step {
                        items: result.store.len(),
                        issues,
                    })
                }
                Phase::Attributes => {
                    if result.store.is_empty() {
                        return Err(Error::precondition(phase, "fusion left no entities"));
                    }
                    let out = attributes.run(doc, &result.mentions, &mut result.store, &weights, cancel, limits)?;
                    Ok(Step {
                        items: out.added.len(),
                        issues: out.issues,
                    })
                }
                Phase::Consistency => {
                    result.store.check_integrity()?;
                    let out = checker.check(doc, &result.store, &weights, &suppressions, cancel, limits)?;
                    result.findings = out.findings;
                    Ok(Step {
                        items: result.findings.len(),
                        issues: out.issues,
                    })
                }
            });
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match step {
                Ok(step) => {
                    let mut report = PhaseReport::new(phase, PhaseStatus::Completed);
                    report.items = step.items;
                    report.issues = step.issues;
                    report.elapsed_ms = elapsed_ms;
                    log::info!(
                        "[pipeline] {phase}: {} items, {} issues in {elapsed_ms} ms",
                        report.items,
                        report.issues.len()
                    );
                    result.reports.push(report);
                }
                Err(e) if e.is_fatal() => {
                    log::error!("[pipeline] {phase} aborted the run: {e}");
                    return Err(e);
                }
                Err(Error::Precondition { phase, reason }) => {
                    log::warn!("[pipeline] {phase} refused to run: {reason}");
                    let mut report = PhaseReport::new(phase, PhaseStatus::PreconditionFailed);
                    report.issues.push(Issue {
                        phase,
                        kind: IssueKind::Precondition,
                        message: reason.clone(),
                    });
                    result.reports.push(report);
                    result.outcome = RunOutcome::PreconditionFailed { phase, reason };
                    break;
                }
                Err(Error::Cancelled { phase }) => {
                    log::info!("[pipeline] cancelled during {phase}");
                    result.reports.push(PhaseReport::new(phase, PhaseStatus::Cancelled));
                    result.outcome = RunOutcome::Cancelled { phase };
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        let done = result.reports.len();
        result
            .reports
            .extend(Phase::ORDER[done..].iter().map(|&p| PhaseReport::skipped(p)));

        lock(&self.feedback).observe(&result.findings);
        Ok(result)
    }

    /// Record an editor decision and fold it into the weights.
    ///
    /// The decision is kept even when the weights are locked by an in-flight
    /// run; it is applied by the next [`adjust_weights`](Self::adjust_weights).
    pub fn record_feedback(&self, fingerprint: Fingerprint, accepted: bool) -> Result<()> {
        let mut tracker = lock(&self.feedback);
        tracker.record_feedback(fingerprint, accepted);
        self.weights.update(|w| tracker.adjust_weights(w))?;
        Ok(())
    }

    /// Apply pending decisions. Returns how many were applied.
    pub fn adjust_weights(&self) -> Result<usize> {
        let mut tracker = lock(&self.feedback);
        self.weights.update(|w| tracker.adjust_weights(w))
    }

    /// Hide findings matching a rule from later runs.
    pub fn add_suppression_rule(&self, rule: SuppressionRule) {
        lock(&self.feedback).add_rule(rule);
    }

    /// Feedback stream and rules as JSON.
    pub fn feedback_json(&self) -> Result<String> {
        lock(&self.feedback).to_json()
    }

    /// Detector false-positive rate from the recorded feedback.
    #[must_use]
    pub fn false_positive_rate(&self, detector: &str) -> Option<f64> {
        lock(&self.feedback).false_positive_rate(detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::parse_conllu;

    #[test]
    fn test_empty_document_fails_ner_precondition() {
        let engine = Engine::builder().build().unwrap();
        let result = engine.analyze(&parse_conllu("").unwrap()).unwrap();
        assert_eq!(
            result.outcome,
            RunOutcome::PreconditionFailed {
                phase: Phase::Ner,
                reason: "document has no sentences".into()
            }
        );
        assert_eq!(result.reports.len(), 5);
        assert_eq!(result.reports[0].status, PhaseStatus::PreconditionFailed);
        assert!(result.reports[1..].iter().all(|r| r.status == PhaseStatus::Skipped));
    }

    #[test]
    fn test_no_mentions_fails_coreference_precondition() {
        let doc = parse_conllu(
            "1\tllovía\tllover\tVERB\t_\t_\t0\troot\t_\tSpaceAfter=No\n2\t.\t.\tPUNCT\t_\t_\t1\tpunct\t_\t_\n",
        )
        .unwrap();
        let result = Engine::builder().build().unwrap().analyze(&doc).unwrap();
        assert!(matches!(
            result.outcome,
            RunOutcome::PreconditionFailed {
                phase: Phase::Coreference,
                ..
            }
        ));
        assert_eq!(result.report(Phase::Ner).unwrap().status, PhaseStatus::Completed);
    }

    #[test]
    fn test_cancelled_before_start() {
        let doc = parse_conllu("1\tAna\tAna\tPROPN\t_\t_\t0\troot\t_\t_\n").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Engine::builder().build().unwrap().analyze_with_cancel(&doc, &cancel).unwrap();
        assert_eq!(result.outcome, RunOutcome::Cancelled { phase: Phase::Ner });
        assert!(result.mentions.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.limits.cancel_check_interval = 0;
        assert!(Engine::builder().config(config).build().is_err());
    }
}
