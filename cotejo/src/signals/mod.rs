//! Narrow interfaces to the external signal providers.
//!
//! The engine never loads models itself. Callers inject implementations of
//! these traits; [`fake`] has deterministic stand-ins for tests and offline
//! runs. Every call returns a `Result` so that a backend failure is told apart
//! from a backend that simply had nothing to say (`Ok(None)` / empty).

pub mod fake;

use crate::Result;
use cotejo_core::{Document, EntityKind, Sentence, Span};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sentence embedding model.
pub trait Embedder: Send + Sync {
    /// Name used in logs and issues.
    fn name(&self) -> &str {
        "embedder"
    }

    /// Embed a text span.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local text-generation model returning structured answers.
pub trait TextGenerator: Send + Sync {
    /// Name used in logs and issues.
    fn name(&self) -> &str {
        "generator"
    }

    /// Complete a prompt. `Ok(None)` means the model declined or timed out.
    fn complete(&self, prompt: &str) -> Result<Option<serde_json::Value>>;
}

/// A span proposed by an external sequence tagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSpan {
    /// Character span in the document.
    pub span: Span,
    pub kind: EntityKind,
    pub confidence: f64,
}

/// Transformer-style NER tagger working sentence by sentence.
pub trait SpanTagger: Send + Sync {
    /// Name used in logs and issues.
    fn name(&self) -> &str {
        "tagger"
    }

    /// Tag one sentence.
    fn tag(&self, doc: &Document, sentence: &Sentence) -> Result<Vec<TaggedSpan>>;
}

/// The optional providers an engine was built with.
#[derive(Clone, Default)]
pub struct Signals {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub tagger: Option<Arc<dyn SpanTagger>>,
}

impl std::fmt::Debug for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signals")
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .field("generator", &self.generator.as_ref().map(|g| g.name().to_string()))
            .field("tagger", &self.tagger.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

/// Raw cosine similarity in [-1, 1]; 0 for mismatched or zero vectors.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(-1.0, 1.0)
    }
}

/// Pull the first JSON value out of a model answer that may wrap it in prose
/// or a code fence.
#[must_use]
pub fn extract_json(raw: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str(raw.trim()) {
        return Some(v);
    }
    let start = raw.find(|c| c == '{' || c == '[')?;
    let end = raw.rfind(|c| c == '}' || c == ']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
