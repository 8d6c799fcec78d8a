//! Editor feedback and adaptive weights.
//!
//! [`FeedbackTracker`] keeps the append-only stream of accept/dismiss
//! decisions, per-detector false-positive rates and the suppression set.
//! [`FeedbackTracker::adjust_weights`] turns decisions not yet applied into
//! weight nudges:
//!
//! - dismissed: the detector's consistency weight and every contributing
//!   attribute method's weight drop by the learning rate;
//! - accepted: they rise by half the learning rate.
//!
//! Weights are floored at 0, capped at [`FeedbackConfig::max_share`] once a
//! task has two or more methods, and renormalized to sum to 1.
//!
//! [`WeightTable`] is the shared copy read at the start of each run. It
//! refuses writes while a run holds a [`RunGuard`].

use crate::consistency::{SuppressionRule, Suppressions, DETECTORS};
use crate::error::{Error, Result};
use crate::sync::{lock, try_lock, Mutex};
use cotejo_core::{Decision, FeedbackRecord, Fingerprint, Inconsistency, Task, VotingWeights};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Learning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub learning_rate: f64,
    /// Largest share any one method may hold after renormalization.
    pub max_share: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            max_share: 0.7,
        }
    }
}

/// Accept/dismiss counts of one detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub accepted: u32,
    pub dismissed: u32,
}

impl DetectorStats {
    /// Share of decisions that were dismissals; `None` before any decision.
    #[must_use]
    pub fn false_positive_rate(&self) -> Option<f64> {
        let total = self.accepted + self.dismissed;
        (total > 0).then(|| f64::from(self.dismissed) / f64::from(total))
    }
}

/// Persisted form of the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSnapshot {
    pub records: Vec<FeedbackRecord>,
    #[serde(default)]
    pub rules: Vec<SuppressionRule>,
    /// Findings observed but not yet decided on.
    #[serde(default)]
    pub seen: Vec<SeenFinding>,
}

/// Who produced a finding, kept so feedback can be attributed across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenFinding {
    pub fingerprint: Fingerprint,
    pub detector: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Decision stream, per-detector statistics and suppressions.
#[derive(Debug, Clone, Default)]
pub struct FeedbackTracker {
    config: FeedbackConfig,
    records: Vec<FeedbackRecord>,
    /// Index of the first record not yet applied to the weights.
    applied: usize,
    stats: BTreeMap<String, DetectorStats>,
    suppressions: Suppressions,
    /// Detector and methods of findings seen in recent runs.
    known: HashMap<Fingerprint, (String, Vec<String>)>,
}

impl FeedbackTracker {
    #[must_use]
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Remember who produced each finding so later feedback can be
    /// attributed to it.
    pub fn observe(&mut self, findings: &[Inconsistency]) {
        for f in findings {
            self.known
                .insert(f.fingerprint.clone(), (f.detector().to_string(), f.methods.clone()));
        }
    }

    /// Record a decision on a finding.
    ///
    /// The detector and methods are filled in when the fingerprint was
    /// observed; unknown fingerprints are still recorded and suppressed.
    pub fn record_feedback(&mut self, fingerprint: Fingerprint, accepted: bool) -> &FeedbackRecord {
        let mut record = FeedbackRecord::now(fingerprint, Decision::from_accepted(accepted));
        if let Some((detector, methods)) = self.known.get(&record.fingerprint) {
            record.detector = Some(detector.clone());
            record.methods = methods.clone();
        } else {
            log::debug!("[feedback] no finding known for {}", record.fingerprint);
        }
        self.account(&record);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    fn account(&mut self, record: &FeedbackRecord) {
        if let Some(detector) = &record.detector {
            let stats = self.stats.entry(detector.clone()).or_default();
            match record.decision {
                Decision::Accepted => stats.accepted += 1,
                Decision::Dismissed => stats.dismissed += 1,
            }
        }
        match record.decision {
            Decision::Dismissed => {
                self.suppressions.dismissed.insert(record.fingerprint.clone());
            }
            Decision::Accepted => {
                self.suppressions.dismissed.remove(&record.fingerprint);
            }
        }
    }

    /// Apply every decision recorded since the last call. Returns how many
    /// were applied.
    pub fn adjust_weights(&mut self, weights: &mut VotingWeights) -> usize {
        let pending = &self.records[self.applied..];
        if pending.is_empty() {
            return 0;
        }
        let lr = self.config.learning_rate;
        let mut touched: BTreeSet<Task> = BTreeSet::new();
        for record in pending {
            let delta = match record.decision {
                Decision::Dismissed => -lr,
                Decision::Accepted => lr / 2.0,
            };
            if let Some(detector) = &record.detector {
                nudge(weights, Task::Consistency, detector, delta);
                touched.insert(Task::Consistency);
            }
            for method in &record.methods {
                nudge(weights, Task::Attribute, method, delta);
                touched.insert(Task::Attribute);
            }
        }
        for task in touched {
            rebalance(weights, task, self.config.max_share);
        }
        let n = pending.len();
        self.applied = self.records.len();
        log::info!("[feedback] applied {n} decisions to the voting weights");
        n
    }

    /// Decisions not yet applied to the weights.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.records.len() - self.applied
    }

    #[must_use]
    pub fn records(&self) -> &[FeedbackRecord] {
        &self.records
    }

    #[must_use]
    pub fn stats(&self, detector: &str) -> DetectorStats {
        self.stats.get(detector).copied().unwrap_or_default()
    }

    /// False-positive rate of a detector, if it has feedback.
    #[must_use]
    pub fn false_positive_rate(&self, detector: &str) -> Option<f64> {
        self.stats.get(detector).and_then(DetectorStats::false_positive_rate)
    }

    /// Dismissed fingerprints and rules, as the consistency phase needs them.
    #[must_use]
    pub fn suppressions(&self) -> &Suppressions {
        &self.suppressions
    }

    pub fn add_rule(&mut self, rule: SuppressionRule) {
        if !self.suppressions.rules.contains(&rule) {
            self.suppressions.rules.push(rule);
        }
    }

    /// Serialize the decision stream, rules and observed findings.
    pub fn to_json(&self) -> Result<String> {
        let mut seen: Vec<SeenFinding> = self
            .known
            .iter()
            .map(|(fingerprint, (detector, methods))| SeenFinding {
                fingerprint: fingerprint.clone(),
                detector: detector.clone(),
                methods: methods.clone(),
            })
            .collect();
        seen.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        let snapshot = FeedbackSnapshot {
            records: self.records.clone(),
            rules: self.suppressions.rules.clone(),
            seen,
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Rebuild a tracker from [`to_json`](Self::to_json) output.
    ///
    /// Restored records count as already applied; the weights they produced
    /// are persisted separately. Attribution of observed findings survives,
    /// both from the saved `seen` list and from attributed records.
    pub fn from_json(json: &str, config: FeedbackConfig) -> Result<Self> {
        let snapshot: FeedbackSnapshot = serde_json::from_str(json)?;
        let mut tracker = Self::new(config);
        for record in &snapshot.records {
            tracker.account(record);
            if let Some(detector) = &record.detector {
                tracker
                    .known
                    .insert(record.fingerprint.clone(), (detector.clone(), record.methods.clone()));
            }
        }
        for seen in snapshot.seen {
            tracker.known.insert(seen.fingerprint, (seen.detector, seen.methods));
        }
        tracker.applied = snapshot.records.len();
        tracker.records = snapshot.records;
        tracker.suppressions.rules = snapshot.rules;
        Ok(tracker)
    }
}

fn nudge(weights: &mut VotingWeights, task: Task, method: &str, delta: f64) {
    let current = weights.get(task, method).unwrap_or_else(|| {
        let n = weights.methods(task).count();
        if n == 0 {
            1.0 / DETECTORS.len() as f64
        } else {
            weights.total(task) / n as f64
        }
    });
    weights.set(task, method, (current + delta).max(0.0));
}

/// Renormalize a task to 1 with no method above `max_share`.
///
/// Capped methods are pinned at the cap and the remainder is shared among
/// the others in proportion to their weights.
fn rebalance(weights: &mut VotingWeights, task: Task, max_share: f64) {
    weights.renormalize(task);
    let entries: Vec<(String, f64)> = weights.methods(task).map(|(m, w)| (m.to_string(), w)).collect();
    if entries.len() < 2 || max_share * entries.len() as f64 <= 1.0 {
        return;
    }
    let mut capped: BTreeSet<&str> = BTreeSet::new();
    loop {
        let free: Vec<&(String, f64)> = entries.iter().filter(|(m, _)| !capped.contains(m.as_str())).collect();
        let free_total: f64 = free.iter().map(|(_, w)| w).sum();
        let budget = 1.0 - max_share * capped.len() as f64;
        let share = |w: f64| {
            if free_total > 0.0 {
                w / free_total * budget
            } else {
                budget / free.len() as f64
            }
        };
        let over: Vec<&str> = free
            .iter()
            .filter(|(_, w)| share(*w) > max_share + 1e-12)
            .map(|(m, _)| m.as_str())
            .collect();
        if over.is_empty() {
            for (m, w) in &free {
                weights.set(task, m, share(*w));
            }
            for m in &capped {
                weights.set(task, m, max_share);
            }
            return;
        }
        capped.extend(over);
    }
}

/// The weights shared between runs and the feedback loop.
#[derive(Debug, Default)]
pub struct WeightTable {
    weights: Mutex<VotingWeights>,
    running: AtomicBool,
}

/// Held for the duration of an analysis run; writes are refused meanwhile.
#[derive(Debug)]
pub struct RunGuard<'a> {
    table: &'a WeightTable,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.table.running.store(false, Ordering::SeqCst);
    }
}

impl WeightTable {
    #[must_use]
    pub fn new(weights: VotingWeights) -> Self {
        Self {
            weights: Mutex::new(weights),
            running: AtomicBool::new(false),
        }
    }

    /// Copy of the current weights.
    #[must_use]
    pub fn snapshot(&self) -> VotingWeights {
        lock(&self.weights).clone()
    }

    /// Mark a run as in flight. Fails if one already is.
    pub fn begin_run(&self) -> Result<RunGuard<'_>> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::WeightsLocked("an analysis run is in flight".into()));
        }
        Ok(RunGuard { table: self })
    }

    /// True while a run holds the table.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Change the weights. Refused while a run is in flight.
    pub fn update<T>(&self, f: impl FnOnce(&mut VotingWeights) -> T) -> Result<T> {
        if self.is_running() {
            return Err(Error::WeightsLocked("an analysis run is in flight".into()));
        }
        let mut weights = try_lock(&self.weights)?;
        Ok(f(&mut weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::{
        AssertionId, AttributeKey, EntityId, Excerpt, InconsistencyKind, Severity, Span,
    };
    use proptest::prelude::*;

    fn finding(kind: InconsistencyKind, methods: &[&str]) -> Inconsistency {
        let excerpt = |v: &str| Excerpt {
            assertion: AssertionId(0),
            value: v.into(),
            text: v.into(),
            span: Span::new(0, 1),
            chapter: 1,
            confidence: 0.9,
        };
        Inconsistency {
            entity: EntityId(0),
            entity_name: "María".into(),
            key: AttributeKey::EyeColor,
            kind,
            severity: Severity::High,
            confidence: 0.9,
            explanation: String::new(),
            first: excerpt("azul"),
            second: excerpt("verde"),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            fingerprint: Inconsistency::fingerprint_for(kind, "María", AttributeKey::EyeColor, "azul", "verde"),
        }
    }

    fn sum(w: &VotingWeights, task: Task) -> f64 {
        w.methods(task).map(|(_, v)| v).sum()
    }

    #[test]
    fn test_dismissal_lowers_detector_and_methods() {
        let f = finding(InconsistencyKind::Antonym, &["patterns"]);
        let mut tracker = FeedbackTracker::default();
        tracker.observe(std::slice::from_ref(&f));
        let record = tracker.record_feedback(f.fingerprint.clone(), false);
        assert_eq!(record.detector.as_deref(), Some("antonym"));

        let mut weights = VotingWeights::default();
        let before_detector = weights.normalized(Task::Consistency, &DETECTORS)["antonym"];
        let before_method = weights.get(Task::Attribute, "patterns").unwrap();
        assert_eq!(tracker.adjust_weights(&mut weights), 1);
        assert!(weights.get(Task::Consistency, "antonym").unwrap() < before_detector);
        assert!(weights.get(Task::Attribute, "patterns").unwrap() < before_method);
        assert!((sum(&weights, Task::Consistency) - 1.0).abs() < 1e-9);
        assert!((sum(&weights, Task::Attribute) - 1.0).abs() < 1e-9);
        assert_eq!(tracker.adjust_weights(&mut weights), 0);
    }

    #[test]
    fn test_stats_and_suppression() {
        let f = finding(InconsistencyKind::NumericRange, &[]);
        let mut tracker = FeedbackTracker::default();
        tracker.observe(std::slice::from_ref(&f));
        tracker.record_feedback(f.fingerprint.clone(), false);
        tracker.record_feedback(f.fingerprint.clone(), true);
        tracker.record_feedback(f.fingerprint.clone(), false);
        assert_eq!(tracker.false_positive_rate("numeric_range"), Some(2.0 / 3.0));
        assert_eq!(tracker.false_positive_rate("antonym"), None);
        assert!(tracker.suppressions().dismissed.contains(&f.fingerprint));
        assert_eq!(tracker.pending(), 3);
    }

    #[test]
    fn test_snapshot_restores_state() {
        let f = finding(InconsistencyKind::Antonym, &["llm"]);
        let mut tracker = FeedbackTracker::default();
        tracker.observe(std::slice::from_ref(&f));
        tracker.record_feedback(f.fingerprint.clone(), false);
        tracker.add_rule(SuppressionRule::new().with_key("age").unwrap());
        let json = tracker.to_json().unwrap();

        let restored = FeedbackTracker::from_json(&json, FeedbackConfig::default()).unwrap();
        assert_eq!(restored.records(), tracker.records());
        assert_eq!(restored.suppressions(), tracker.suppressions());
        assert_eq!(restored.pending(), 0);
        assert_eq!(restored.stats("antonym").dismissed, 1);
    }

    #[test]
    fn test_feedback_after_restore_still_adjusts_weights() {
        let decided = finding(InconsistencyKind::Antonym, &["llm"]);
        let undecided = finding(InconsistencyKind::NumericRange, &["patterns"]);
        let mut tracker = FeedbackTracker::default();
        tracker.observe(&[decided.clone(), undecided.clone()]);
        tracker.record_feedback(decided.fingerprint.clone(), false);
        let json = tracker.to_json().unwrap();

        let mut restored = FeedbackTracker::from_json(&json, FeedbackConfig::default()).unwrap();
        let record = restored.record_feedback(undecided.fingerprint.clone(), false);
        assert_eq!(record.detector.as_deref(), Some("numeric_range"));
        assert_eq!(record.methods, vec!["patterns".to_string()]);
        let record = restored.record_feedback(decided.fingerprint.clone(), true);
        assert_eq!(record.detector.as_deref(), Some("antonym"));

        let mut weights = VotingWeights::default();
        let before = weights.clone();
        assert_eq!(restored.adjust_weights(&mut weights), 2);
        assert_ne!(weights.get(Task::Consistency, "numeric_range"), before.get(Task::Consistency, "numeric_range"));
        assert!(weights.get(Task::Attribute, "patterns").unwrap() < before.get(Task::Attribute, "patterns").unwrap());
    }

    #[test]
    fn test_no_method_dominates() {
        let mut weights = VotingWeights::default();
        weights.set(Task::Consistency, "antonym", 5.0);
        rebalance(&mut weights, Task::Consistency, 0.7);
        let antonym = weights.get(Task::Consistency, "antonym").unwrap();
        assert!((antonym - 0.7).abs() < 1e-9);
        assert!((sum(&weights, Task::Consistency) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_table_refuses_writes_during_run() {
        let table = WeightTable::new(VotingWeights::default());
        {
            let _guard = table.begin_run().unwrap();
            assert!(table.begin_run().is_err());
            let err = table.update(|w| w.set(Task::Ner, "llm", 0.0)).unwrap_err();
            assert!(matches!(err, Error::WeightsLocked(_)));
        }
        table.update(|w| w.set(Task::Ner, "llm", 0.0)).unwrap();
        assert_eq!(table.snapshot().get(Task::Ner, "llm"), Some(0.0));
    }

    proptest! {
        #[test]
        fn weights_stay_normalized(decisions in prop::collection::vec((0usize..3, any::<bool>(), 0usize..4), 1..40)) {
            let kinds = [InconsistencyKind::Antonym, InconsistencyKind::NumericRange, InconsistencyKind::SemanticDistance];
            let methods = ["patterns", "dependency", "embeddings", "llm"];
            let mut tracker = FeedbackTracker::default();
            let mut weights = VotingWeights::default();
            for (k, accepted, m) in decisions {
                let f = finding(kinds[k], &methods[..=m]);
                tracker.observe(std::slice::from_ref(&f));
                tracker.record_feedback(f.fingerprint.clone(), accepted);
                tracker.adjust_weights(&mut weights);
                for task in [Task::Consistency, Task::Attribute] {
                    prop_assert!(weights.methods(task).all(|(_, w)| w >= 0.0 && w <= 0.7 + 1e-9));
                    prop_assert!((sum(&weights, task) - 1.0).abs() < 1e-9);
                }
            }
        }
    }
}
