//! Voting weights per (task, method).
//!
//! Weights for a task are kept close to summing to 1.0, but nothing relies on
//! that: consumers call [`VotingWeights::normalized`] at decision time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Resolution task a weight applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Ner,
    Coreference,
    Attribute,
    Consistency,
}

impl Task {
    /// All tasks.
    pub const ALL: [Task; 4] = [Task::Ner, Task::Coreference, Task::Attribute, Task::Consistency];
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Task::Ner => "ner",
            Task::Coreference => "coreference",
            Task::Attribute => "attribute",
            Task::Consistency => "consistency",
        };
        f.write_str(s)
    }
}

/// Weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingWeights {
    table: BTreeMap<Task, BTreeMap<String, f64>>,
}

impl Default for VotingWeights {
    fn default() -> Self {
        let mut w = Self::empty();
        // NER defaults intentionally sum above 1.0; decisions renormalize.
        w.set(Task::Ner, "transformer", 0.50);
        w.set(Task::Ner, "llm", 0.30);
        w.set(Task::Ner, "statistical", 0.20);
        w.set(Task::Ner, "gazetteer", 0.10);
        w.set(Task::Ner, "heuristic", 0.10);

        w.set(Task::Coreference, "embeddings", 0.30);
        w.set(Task::Coreference, "llm", 0.35);
        w.set(Task::Coreference, "morpho", 0.20);
        w.set(Task::Coreference, "heuristics", 0.15);

        w.set(Task::Attribute, "llm", 0.40);
        w.set(Task::Attribute, "embeddings", 0.25);
        w.set(Task::Attribute, "dependency", 0.20);
        w.set(Task::Attribute, "patterns", 0.15);

        let third = 1.0 / 3.0;
        w.set(Task::Consistency, "antonym", third);
        w.set(Task::Consistency, "numeric_range", third);
        w.set(Task::Consistency, "semantic_distance", third);
        w
    }
}

impl VotingWeights {
    /// A table with no weights.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Raw weight, if set.
    #[must_use]
    pub fn get(&self, task: Task, method: &str) -> Option<f64> {
        self.table.get(&task).and_then(|m| m.get(method)).copied()
    }

    /// Set a raw weight. Negative and non-finite values are clamped to 0.
    pub fn set(&mut self, task: Task, method: &str, weight: f64) {
        let w = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        self.table
            .entry(task)
            .or_default()
            .insert(method.to_string(), w);
    }

    /// Methods with a weight for this task.
    pub fn methods(&self, task: Task) -> impl Iterator<Item = (&str, f64)> {
        self.table
            .get(&task)
            .into_iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Weights of `methods` for `task`, renormalized to sum to 1.
    ///
    /// Methods without an entry get the mean weight of the task (or 1.0 if
    /// the task has none). If all weights are zero the split is uniform.
    #[must_use]
    pub fn normalized<'a>(&self, task: Task, methods: &[&'a str]) -> BTreeMap<&'a str, f64> {
        let mut out = BTreeMap::new();
        if methods.is_empty() {
            return out;
        }
        let known: Vec<f64> = self.methods(task).map(|(_, w)| w).collect();
        let fallback = if known.is_empty() {
            1.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        };
        let raw: Vec<f64> = methods
            .iter()
            .map(|m| self.get(task, m).unwrap_or(fallback))
            .collect();
        let total: f64 = raw.iter().sum();
        for (m, w) in methods.iter().zip(raw) {
            let v = if total > 0.0 {
                w / total
            } else {
                1.0 / methods.len() as f64
            };
            out.insert(*m, v);
        }
        out
    }

    /// Rescale all weights of a task so they sum to 1.
    pub fn renormalize(&mut self, task: Task) {
        let Some(map) = self.table.get_mut(&task) else {
            return;
        };
        let total: f64 = map.values().sum();
        let n = map.len() as f64;
        for w in map.values_mut() {
            *w = if total > 0.0 { *w / total } else { 1.0 / n };
        }
    }

    /// Sum of raw weights for a task.
    #[must_use]
    pub fn total(&self, task: Task) -> f64 {
        self.methods(task).map(|(_, w)| w).sum()
    }

    /// Serialize to JSON for the persistence layer.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore from JSON; rejects negative or non-finite weights.
    pub fn from_json(json: &str) -> Result<Self> {
        let weights: Self = serde_json::from_str(json)?;
        for (task, map) in &weights.table {
            for (method, w) in map {
                if !w.is_finite() || *w < 0.0 {
                    return Err(Error::invalid_input(format!(
                        "weight {task}/{method} = {w} is not a finite non-negative number"
                    )));
                }
            }
        }
        Ok(weights)
    }
}
