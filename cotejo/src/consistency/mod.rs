//! Consistency checking over the current assertions of each entity.
//!
//! For every entity and key with at least two current assertions, every pair
//! is compared by the comparator family of the key:
//!
//! | Family | Keys | Module |
//! |--------|------|--------|
//! | categorical | eye/hair colour, hair type, build, skin, facial hair | [`categorical`] |
//! | numeric range | age, height | [`numeric`] |
//! | semantic distance | personality, profession, nationality, features, other | [`semantic`] |
//!
//! A finding's confidence is
//!
//! ```text
//! conflict · √(conf_a · conf_b) · modality_a · modality_b · detector_factor
//! ```
//!
//! where the detector factor is the detector's share of the consistency
//! weights times the number of detectors (1.0 with uniform weights).
//! The report threshold is applied before the modality factors, so
//! metaphorical, hypothetical and past assertions still produce findings,
//! only weaker ones.

pub mod categorical;
pub mod numeric;
pub mod semantic;
mod tables;

use crate::pipeline::{CancellationToken, Issue, Phase, RunLimits};
use crate::signals::Embedder;
use crate::{Error, Result};
use cotejo_core::{
    AttributeAssertion, AttributeKey, Document, Entity, EntityStore, Excerpt, Fingerprint,
    Inconsistency, InconsistencyKind, Severity, Task, VotingWeights,
};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Detector names, as used in the consistency weights.
pub const DETECTORS: [&str; 3] = ["antonym", "numeric_range", "semantic_distance"];

/// A comparator's verdict on one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: InconsistencyKind,
    /// Raw conflict strength in [0, 1].
    pub score: f64,
    /// Spanish phrase completing the explanation.
    pub reason: String,
}

/// Case-insensitive shell wildcard (`*`, `?`, `[...]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wildcard {
    source: String,
    pattern: Pattern,
}

impl Wildcard {
    /// Compile a pattern; malformed patterns are rejected.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let pattern = Pattern::new(&source.to_lowercase())
            .map_err(|e| Error::invalid_input(format!("bad pattern '{source}': {e}")))?;
        Ok(Self { source, pattern })
    }

    /// Wildcard matching everything.
    #[must_use]
    pub fn any() -> Self {
        Self {
            source: "*".to_string(),
            pattern: Pattern::new("*").unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        self.pattern.matches_with(&text.to_lowercase(), options)
    }
}

impl TryFrom<String> for Wildcard {
    type Error = Error;

    fn try_from(source: String) -> Result<Self> {
        Self::new(source)
    }
}

impl From<Wildcard> for String {
    fn from(w: Wildcard) -> Self {
        w.source
    }
}

/// User rule hiding findings. Each field is a [`Wildcard`] over the
/// attribute key, the entity name and the detector.
///
/// ```rust
/// use cotejo::SuppressionRule;
///
/// let rule = SuppressionRule::new().with_key("eye_*")?.with_entity("mar?a")?;
/// assert_eq!(rule.key.as_str(), "eye_*");
/// assert!(SuppressionRule::new().with_key("[eye").is_err());
/// # Ok::<(), cotejo::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionRule {
    #[serde(default = "Wildcard::any")]
    pub key: Wildcard,
    #[serde(default = "Wildcard::any")]
    pub entity: Wildcard,
    #[serde(default = "Wildcard::any")]
    pub detector: Wildcard,
}

impl SuppressionRule {
    /// Rule matching everything; narrow it with the `with_*` methods.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: Wildcard::any(),
            entity: Wildcard::any(),
            detector: Wildcard::any(),
        }
    }

    pub fn with_key(mut self, pattern: impl Into<String>) -> Result<Self> {
        self.key = Wildcard::new(pattern)?;
        Ok(self)
    }

    pub fn with_entity(mut self, pattern: impl Into<String>) -> Result<Self> {
        self.entity = Wildcard::new(pattern)?;
        Ok(self)
    }

    pub fn with_detector(mut self, pattern: impl Into<String>) -> Result<Self> {
        self.detector = Wildcard::new(pattern)?;
        Ok(self)
    }

    /// True if the rule hides `finding`.
    #[must_use]
    pub fn matches(&self, finding: &Inconsistency) -> bool {
        self.key.matches(finding.key.as_str())
            && self.entity.matches(&finding.entity_name)
            && self.detector.matches(finding.detector())
    }
}

impl Default for SuppressionRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Findings the editor does not want to see again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suppressions {
    pub dismissed: BTreeSet<Fingerprint>,
    pub rules: Vec<SuppressionRule>,
}

impl Suppressions {
    /// True if the finding was dismissed or matches a rule.
    #[must_use]
    pub fn hides(&self, finding: &Inconsistency) -> bool {
        self.dismissed.contains(&finding.fingerprint) || self.rules.iter().any(|r| r.matches(finding))
    }
}

/// Consistency phase settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Findings below this confidence are not reported.
    pub report_threshold: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            report_threshold: 0.5,
        }
    }
}

/// Result of the consistency phase.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyOutcome {
    pub findings: Vec<Inconsistency>,
    pub issues: Vec<Issue>,
    /// Pairs compared.
    pub compared: usize,
    /// Findings hidden by dismissals or rules.
    pub suppressed: usize,
    /// Findings below the report threshold.
    pub below_threshold: usize,
}

/// Pairwise attribute comparison per entity.
#[derive(Clone, Default)]
pub struct ConsistencyChecker {
    config: ConsistencyConfig,
    embedder: Option<Arc<dyn Embedder>>,
}

impl ConsistencyChecker {
    #[must_use]
    pub fn new(config: ConsistencyConfig) -> Self {
        Self {
            config,
            embedder: None,
        }
    }

    /// Use an embedder for the semantic-distance family.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Compare every pair of current assertions of every entity.
    pub fn check(
        &self,
        doc: &Document,
        store: &EntityStore,
        weights: &VotingWeights,
        suppress: &Suppressions,
        cancel: &CancellationToken,
        limits: RunLimits,
    ) -> Result<ConsistencyOutcome> {
        let mut outcome = ConsistencyOutcome::default();
        let factors = detector_factors(weights);
        let mut embedder = self.embedder.as_deref();

        for entity in store.iter() {
            cancel.check(Phase::Consistency)?;
            for key in entity.attributes.keys().copied() {
                let mut current: Vec<&AttributeAssertion> = entity.current(key).collect();
                if current.len() < 2 {
                    continue;
                }
                current.sort_by_key(|a| (a.chapter, a.span.start, a.id));
                for i in 0..current.len() {
                    for j in (i + 1)..current.len() {
                        cancel.check_every(Phase::Consistency, outcome.compared, limits.cancel_check_interval)?;
                        outcome.compared += 1;
                        let (a, b) = (current[i], current[j]);
                        if a.normalized == b.normalized {
                            continue;
                        }
                        let conflict = match self.compare(doc, key, a, b, embedder) {
                            Ok(c) => c,
                            Err(e) if e.is_fatal() => return Err(e),
                            Err(e) => {
                                let name = embedder.map_or("embedder", |emb| emb.name()).to_string();
                                log::warn!("[consistency] {name} dropped: {e}");
                                outcome
                                    .issues
                                    .push(Issue::from_error(Phase::Consistency, &e.attributed_to(&name)));
                                embedder = None;
                                self.compare(doc, key, a, b, None)?
                            }
                        };
                        let Some(conflict) = conflict else { continue };
                        let strength = evidence_strength(a, b, &conflict, &factors);
                        if strength < self.config.report_threshold {
                            outcome.below_threshold += 1;
                            continue;
                        }
                        let finding = build(entity, key, a, b, conflict, strength);
                        if suppress.hides(&finding) {
                            log::debug!("[consistency] suppressed {}", finding.fingerprint);
                            outcome.suppressed += 1;
                            continue;
                        }
                        outcome.findings.push(finding);
                    }
                }
            }
        }
        log::info!(
            "[consistency] {} findings from {} pairs ({} suppressed)",
            outcome.findings.len(),
            outcome.compared,
            outcome.suppressed
        );
        Ok(outcome)
    }

    fn compare(
        &self,
        doc: &Document,
        key: AttributeKey,
        a: &AttributeAssertion,
        b: &AttributeAssertion,
        embedder: Option<&dyn Embedder>,
    ) -> Result<Option<Conflict>> {
        Ok(match key {
            AttributeKey::Age | AttributeKey::Height => {
                numeric::compare(key, &a.normalized, &b.normalized, elapsed(doc, a.chapter, b.chapter))
                    .or_else(|| categorical::compare(key, &a.normalized, &b.normalized))
            }
            AttributeKey::EyeColor
            | AttributeKey::HairColor
            | AttributeKey::HairType
            | AttributeKey::Build
            | AttributeKey::Skin
            | AttributeKey::FacialHair => categorical::compare(key, &a.normalized, &b.normalized),
            AttributeKey::Personality
            | AttributeKey::Profession
            | AttributeKey::Nationality
            | AttributeKey::DistinctiveFeature
            | AttributeKey::Other => semantic::compare(doc, a, b, embedder)?,
        })
    }
}

/// Story years between the starts of two chapters; 0 when unknown.
fn elapsed(doc: &Document, from: u32, to: u32) -> f64 {
    let years = |n: u32| doc.chapter(n).and_then(|c| c.elapsed_years);
    match (years(from), years(to)) {
        (Some(a), Some(b)) => b - a,
        _ => 0.0,
    }
}

fn detector_factors(weights: &VotingWeights) -> BTreeMap<&'static str, f64> {
    let shares = weights.normalized(Task::Consistency, &DETECTORS);
    DETECTORS
        .iter()
        .map(|d| (*d, shares.get(d).copied().unwrap_or(0.0) * DETECTORS.len() as f64))
        .collect()
}

/// Confidence of a finding before modality.
fn evidence_strength(
    a: &AttributeAssertion,
    b: &AttributeAssertion,
    conflict: &Conflict,
    factors: &BTreeMap<&'static str, f64>,
) -> f64 {
    let factor = factors.get(conflict.kind.detector()).copied().unwrap_or(1.0);
    (conflict.score * (a.confidence * b.confidence).sqrt() * factor).clamp(0.0, 1.0)
}

fn build(
    entity: &Entity,
    key: AttributeKey,
    a: &AttributeAssertion,
    b: &AttributeAssertion,
    conflict: Conflict,
    strength: f64,
) -> Inconsistency {
    let confidence = strength * a.modality.weight() * b.modality.weight();
    let explanation = format!(
        "{}: {} «{}» (capítulo {}) y «{}» (capítulo {}) {}.",
        entity.name,
        key.label_es(),
        a.value,
        a.chapter,
        b.value,
        b.chapter,
        conflict.reason
    );
    let methods: BTreeSet<&str> = a.methods.iter().chain(&b.methods).map(String::as_str).collect();
    Inconsistency {
        entity: entity.id,
        entity_name: entity.name.clone(),
        key,
        kind: conflict.kind,
        severity: Severity::from_confidence(confidence),
        confidence,
        explanation,
        first: Excerpt::from(a),
        second: Excerpt::from(b),
        methods: methods.into_iter().map(str::to_string).collect(),
        fingerprint: Inconsistency::fingerprint_for(
            conflict.kind,
            &entity.name,
            key,
            &a.normalized,
            &b.normalized,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::fake::UnavailableEmbedder;
    use cotejo_core::{
        parse_conllu, AssertionId, AssignmentSource, EntityKind, MentionId, Modality, Span,
    };

    const DOC: &str = "\
# chapter = 1
# elapsed_years = 0
1\tAna\tAna\tPROPN\t_\t_\t0\troot\t_\tSpaceAfter=No
2\t.\t.\tPUNCT\t_\t_\t1\tpunct\t_\t_

# chapter = 2
# elapsed_years = 10
1\tAna\tAna\tPROPN\t_\t_\t0\troot\t_\tSpaceAfter=No
2\t.\t.\tPUNCT\t_\t_\t1\tpunct\t_\t_
";

    fn assertion(key: AttributeKey, value: &str, chapter: u32, start: usize) -> AttributeAssertion {
        AttributeAssertion {
            id: AssertionId(0),
            key,
            value: value.into(),
            normalized: crate::attributes::lexicon::normalize_value(key, value),
            entity: cotejo_core::EntityId(0),
            source_mention: Some(MentionId(0)),
            scope: Span::new(start, start + 3),
            span: Span::new(start, start + value.len()),
            excerpt: format!("Ana ... {value}"),
            confidence: 0.8,
            chapter,
            sentence: 0,
            paragraph: 0,
            modality: Modality::Asserted,
            source: AssignmentSource::Subject,
            methods: vec!["dependency".into()],
            superseded_by: None,
        }
    }

    fn store_with(assertions: Vec<AttributeAssertion>) -> EntityStore {
        let mut store = EntityStore::new();
        let id = store.create("Ana", EntityKind::Person);
        for mut a in assertions {
            a.entity = id;
            store.add_assertion(a).unwrap();
        }
        store
    }

    fn check(store: &EntityStore, suppress: &Suppressions) -> ConsistencyOutcome {
        let doc = parse_conllu(DOC).unwrap();
        ConsistencyChecker::default()
            .check(
                &doc,
                store,
                &VotingWeights::default(),
                suppress,
                &CancellationToken::new(),
                RunLimits::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_one_finding_per_conflicting_pair() {
        let store = store_with(vec![
            assertion(AttributeKey::EyeColor, "azules", 1, 0),
            assertion(AttributeKey::EyeColor, "azul oscuro", 1, 10),
            assertion(AttributeKey::EyeColor, "verdes", 2, 20),
        ]);
        let out = check(&store, &Suppressions::default());
        assert_eq!(out.compared, 3);
        assert_eq!(out.findings.len(), 2);
        let f = &out.findings[0];
        assert_eq!(f.kind, InconsistencyKind::Antonym);
        assert!((f.confidence - 0.95 * 0.8).abs() < 1e-9);
        assert_eq!(f.severity, Severity::Medium);
        assert!(f.explanation.starts_with("Ana:"));
        assert!(f.explanation.contains("«azules» (capítulo 1)"));
        // Both pairs compare the same normalized values.
        assert_eq!(out.findings[0].fingerprint, out.findings[1].fingerprint);
    }

    #[test]
    fn test_modality_lowers_confidence() {
        let mut metaphor = assertion(AttributeKey::EyeColor, "verdes", 2, 20);
        metaphor.modality = Modality::Metaphorical;
        let store = store_with(vec![assertion(AttributeKey::EyeColor, "azules", 1, 0), metaphor]);
        let out = check(&store, &Suppressions::default());
        assert_eq!(out.below_threshold, 0);
        assert_eq!(out.findings.len(), 1);
        let f = &out.findings[0];
        assert!((f.confidence - 0.95 * 0.8 * 0.5).abs() < 1e-9);
        assert_eq!(f.severity, Severity::Low);

        let mut hypothetical = assertion(AttributeKey::EyeColor, "verdes", 2, 20);
        hypothetical.modality = Modality::Hypothetical;
        let store = store_with(vec![assertion(AttributeKey::EyeColor, "azules", 1, 0), hypothetical]);
        let out = check(&store, &Suppressions::default());
        assert!((out.findings[0].confidence - 0.95 * 0.8 * 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_weak_evidence_stays_below_threshold() {
        let mut a = assertion(AttributeKey::EyeColor, "azules", 1, 0);
        let mut b = assertion(AttributeKey::EyeColor, "verdes", 2, 20);
        a.confidence = 0.4;
        b.confidence = 0.4;
        let out = check(&store_with(vec![a, b]), &Suppressions::default());
        assert!(out.findings.is_empty());
        assert_eq!(out.below_threshold, 1);
    }

    #[test]
    fn test_age_accounts_for_elapsed_time() {
        let store = store_with(vec![
            assertion(AttributeKey::Age, "30", 1, 0),
            assertion(AttributeKey::Age, "40", 2, 20),
        ]);
        assert!(check(&store, &Suppressions::default()).findings.is_empty());

        let store = store_with(vec![
            assertion(AttributeKey::Age, "30", 1, 0),
            assertion(AttributeKey::Age, "70", 2, 20),
        ]);
        let out = check(&store, &Suppressions::default());
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].kind, InconsistencyKind::NumericRange);
    }

    #[test]
    fn test_suppression() {
        let store = store_with(vec![
            assertion(AttributeKey::EyeColor, "azules", 1, 0),
            assertion(AttributeKey::EyeColor, "verdes", 2, 20),
        ]);
        let first = check(&store, &Suppressions::default());
        let mut dismissed = Suppressions::default();
        dismissed.dismissed.insert(first.findings[0].fingerprint.clone());
        let out = check(&store, &dismissed);
        assert!(out.findings.is_empty());
        assert_eq!(out.suppressed, 1);

        let rules = Suppressions {
            dismissed: BTreeSet::new(),
            rules: vec![SuppressionRule::new()
                .with_key("eye_*")
                .unwrap()
                .with_entity("ANA")
                .unwrap()],
        };
        assert!(check(&store, &rules).findings.is_empty());
    }

    #[test]
    fn test_failing_embedder_falls_back() {
        let store = store_with(vec![
            assertion(AttributeKey::Personality, "valiente", 1, 0),
            assertion(AttributeKey::Profession, "médico", 1, 5),
            assertion(AttributeKey::Profession, "sastre", 2, 20),
        ]);
        let doc = parse_conllu(DOC).unwrap();
        let out = ConsistencyChecker::new(ConsistencyConfig {
            report_threshold: 0.3,
        })
        .with_embedder(Arc::new(UnavailableEmbedder))
        .check(
            &doc,
            &store,
            &VotingWeights::default(),
            &Suppressions::default(),
            &CancellationToken::new(),
            RunLimits::default(),
        )
        .unwrap();
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].kind, InconsistencyKind::SemanticDistance);
        assert!((out.findings[0].confidence - 0.6 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_wildcards() {
        let w = |p: &str| Wildcard::new(p).unwrap();
        assert!(Wildcard::any().matches("anything"));
        assert!(w("eye_*").matches("eye_color"));
        assert!(w("eye_colo?").matches("eye_color"));
        assert!(w("*RÍA*").matches("María Sánchez"));
        assert!(w("[ae]na").matches("Ana"));
        assert!(!w("hair_*").matches("eye_color"));
        assert!(matches!(Wildcard::new("[eye"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rule_json_rejects_bad_pattern() {
        let rule: SuppressionRule = serde_json::from_str(r#"{"detector": "anto?ym"}"#).unwrap();
        assert_eq!(rule.key.as_str(), "*");
        assert!(rule.detector.matches("antonym"));
        assert!(serde_json::from_str::<SuppressionRule>(r#"{"key": "[a-"}"#).is_err());
    }
}
