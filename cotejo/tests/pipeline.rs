//! End-to-end runs of the engine on small annotated manuscripts.

use cotejo::attributes::{AttributeExtractor, Candidate};
use cotejo::ner::Gazetteer;
use cotejo::pipeline::{IssueKind, PhaseStatus};
use cotejo::signals::fake::{UnavailableEmbedder, UnavailableGenerator, UnavailableTagger};
use cotejo::signals::Signals;
use cotejo::voting::VoterRegistry;
use cotejo::{CancellationToken, Engine, Phase, RunOutcome};
use cotejo_core::{parse_conllu, AttributeKey, Chapter, Document, InconsistencyKind};
use std::sync::Arc;

fn maria() -> Document {
    parse_conllu(include_str!("fixtures/maria.conllu")).unwrap()
}

fn maria_far() -> Document {
    parse_conllu(include_str!("fixtures/maria_far.conllu")).unwrap()
}

fn isabel() -> Document {
    parse_conllu(include_str!("fixtures/isabel.conllu")).unwrap()
}

fn engine() -> Engine {
    Engine::builder().build().unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_maria_eye_colour_conflict() {
    let result = engine().analyze(&maria()).unwrap();
    assert_eq!(result.outcome, RunOutcome::Completed);

    // "María Sánchez" and "María" end up as one entity.
    let people: Vec<_> = result.entities().collect();
    assert_eq!(people.len(), 1, "entities: {people:?}");
    assert_eq!(people[0].current(AttributeKey::EyeColor).count(), 2);

    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.kind, InconsistencyKind::Antonym);
    assert_eq!(finding.key, AttributeKey::EyeColor);
    assert_eq!(finding.first.chapter, 1);
    assert_eq!(finding.second.chapter, 2);
    let [a, b] = finding.values();
    assert!(a.contains("azul") && b.contains("verde"), "values: {a} / {b}");
    assert!(finding.confidence >= 0.5);
}

#[test]
fn test_distant_chapters_merge_by_name() {
    let doc = maria_far();
    assert_eq!(doc.chapters.len(), 8);
    let result = engine().analyze(&doc).unwrap();
    assert_eq!(result.outcome, RunOutcome::Completed);

    // Chapters 1 and 8 never share a coreference window; fusion joins them.
    assert_eq!(result.merges.len(), 1, "merges: {:?}", result.merges);
    let people: Vec<_> = result.entities().collect();
    assert_eq!(people.len(), 1, "entities: {people:?}");
    assert_eq!(people[0].name, "María Sánchez");
    assert_eq!(people[0].current(AttributeKey::EyeColor).count(), 2);

    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.key, AttributeKey::EyeColor);
    let mut chapters = [finding.first.chapter, finding.second.chapter];
    chapters.sort_unstable();
    assert_eq!(chapters, [1, 8]);
}

#[test]
fn test_pronoun_resolves_to_isabel() {
    let result = engine().analyze(&isabel()).unwrap();
    assert_eq!(result.outcome, RunOutcome::Completed);

    let ella = result.mentions.iter().find(|m| m.text == "Ella").unwrap();
    let isabel = result.entities().find(|e| e.name == "Isabel").unwrap();
    assert_eq!(result.store.entity_of_mention(ella.id), Some(isabel.id));
    assert_eq!(isabel.mentions.len(), 2);
}

#[test]
fn test_dismissed_finding_does_not_return() {
    let engine = engine();
    let doc = maria();

    let first = engine.analyze(&doc).unwrap();
    let fingerprint = first.findings[0].fingerprint.clone();
    engine.record_feedback(fingerprint.clone(), false).unwrap();

    let second = engine.analyze(&doc).unwrap();
    engine.record_feedback(fingerprint.clone(), false).unwrap();

    let third = engine.analyze(&doc).unwrap();
    assert!(second.findings.iter().all(|f| f.fingerprint != fingerprint));
    assert!(third.findings.iter().all(|f| f.fingerprint != fingerprint));
    assert_eq!(engine.false_positive_rate("antonym"), Some(1.0));
    assert!(third.weights.get(cotejo::Task::Consistency, "antonym").unwrap() < 1.0 / 3.0);
}

// =============================================================================
// Degradation and run control
// =============================================================================

#[test]
fn test_unavailable_signals_degrade_without_failing() {
    let baseline = engine().analyze(&maria()).unwrap();
    let degraded = Engine::builder()
        .generator(Arc::new(UnavailableGenerator))
        .embedder(Arc::new(UnavailableEmbedder))
        .tagger(Arc::new(UnavailableTagger))
        .build()
        .unwrap()
        .analyze(&maria())
        .unwrap();

    assert_eq!(degraded.outcome, RunOutcome::Completed);
    let unavailable: Vec<&str> = degraded
        .issues()
        .filter_map(|i| match &i.kind {
            IssueKind::VoterUnavailable { voter } => Some(voter.as_str()),
            _ => None,
        })
        .collect();
    assert!(unavailable.contains(&"llm"), "issues: {unavailable:?}");
    assert!(unavailable.contains(&"transformer"), "issues: {unavailable:?}");

    let fingerprints = |r: &cotejo::RunResult| r.findings.iter().map(|f| f.fingerprint.clone()).collect::<Vec<_>>();
    assert_eq!(fingerprints(&degraded), fingerprints(&baseline));
}

/// Extractor that cancels the run the first time it is called.
struct CancelOnCall(CancellationToken);

impl AttributeExtractor for CancelOnCall {
    fn name(&self) -> &str {
        "canceller"
    }

    fn extract(&self, _doc: &Document, _chapter: &Chapter) -> cotejo::Result<Vec<Candidate>> {
        self.0.cancel();
        Ok(Vec::new())
    }
}

#[test]
fn test_cancellation_keeps_completed_phases() {
    let cancel = CancellationToken::new();
    let mut registry = VoterRegistry::standard(&Signals::default(), Gazetteer::new());
    registry.register_attribute(Arc::new(CancelOnCall(cancel.clone())));
    let engine = Engine::builder().registry(registry).build().unwrap();

    let result = engine.analyze_with_cancel(&maria(), &cancel).unwrap();
    assert_eq!(result.outcome, RunOutcome::Cancelled { phase: Phase::Attributes });
    assert_eq!(result.report(Phase::Fusion).unwrap().status, PhaseStatus::Completed);
    assert_eq!(result.report(Phase::Attributes).unwrap().status, PhaseStatus::Cancelled);
    assert_eq!(result.report(Phase::Consistency).unwrap().status, PhaseStatus::Skipped);
    assert_eq!(result.store.len(), 1);
    assert_eq!(result.store.assertions().count(), 0);
    assert!(result.findings.is_empty());
}

#[test]
fn test_empty_document_is_distinguishable_from_clean_run() {
    let engine = engine();
    let empty = engine.analyze(&parse_conllu("").unwrap()).unwrap();
    assert!(matches!(empty.outcome, RunOutcome::PreconditionFailed { phase: Phase::Ner, .. }));

    let clean = engine.analyze(&isabel()).unwrap();
    assert!(clean.is_completed());
    assert!(clean.findings.is_empty());
}

#[test]
fn test_weights_are_locked_only_during_runs() {
    let engine = engine();
    let result = engine.analyze(&maria()).unwrap();
    assert_eq!(engine.adjust_weights().unwrap(), 0);
    engine
        .record_feedback(result.findings[0].fingerprint.clone(), true)
        .unwrap();
    let after = engine.weights();
    assert!(after.get(cotejo::Task::Consistency, "antonym").unwrap() > 1.0 / 3.0);
}
