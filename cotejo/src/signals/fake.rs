//! Deterministic signal providers for tests and offline runs.

use super::{Embedder, SpanTagger, TaggedSpan, TextGenerator};
use crate::{Error, Result};
use cotejo_coalesce::strip_accents;
use cotejo_core::{Document, EntityKind, Sentence, Span};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}

/// Bag-of-words and character-trigram hashing embedder.
///
/// Texts sharing words or word fragments get similar vectors, which is
/// enough to exercise similarity thresholds without a model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    overrides: HashMap<String, Vec<f32>>,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl HashEmbedder {
    /// Embedder producing `dim`-dimensional vectors.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.max(1),
            overrides: HashMap::new(),
        }
    }

    /// Return a fixed vector for an exact text.
    #[must_use]
    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.to_string(), vector);
        self
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(v) = self.overrides.get(text) {
            return Ok(v.clone());
        }
        let mut v = vec![0.0f32; self.dim];
        let plain = strip_accents(&text.to_lowercase());
        for word in plain.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let idx = (fnv1a(word.as_bytes()) % self.dim as u64) as usize;
            v[idx] += 1.0;
            let chars: Vec<char> = format!("#{word}#").chars().collect();
            for tri in chars.windows(3) {
                let s: String = tri.iter().collect();
                let idx = (fnv1a(s.as_bytes()) % self.dim as u64) as usize;
                v[idx] += 0.5;
            }
        }
        Ok(v)
    }
}

/// Embedder whose backend is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableEmbedder;

impl Embedder for UnavailableEmbedder {
    fn name(&self) -> &str {
        "unavailable-embedder"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::voter_unavailable("embeddings", "embedding backend offline"))
    }
}

/// Generator answering from a script of `(prompt substring, answer)` rules.
///
/// The first rule whose needle occurs in the prompt wins; prompts matching
/// no rule get `Ok(None)`.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    rules: Vec<(String, serde_json::Value)>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `value` to prompts containing `needle`.
    #[must_use]
    pub fn respond(mut self, needle: impl Into<String>, value: serde_json::Value) -> Self {
        self.rules.push((needle.into(), value));
        self
    }

    /// Number of prompts received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, prompt: &str) -> Result<Option<serde_json::Value>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, v)| v.clone()))
    }
}

/// Generator whose backend is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGenerator;

impl TextGenerator for UnavailableGenerator {
    fn name(&self) -> &str {
        "unavailable-generator"
    }

    fn complete(&self, _prompt: &str) -> Result<Option<serde_json::Value>> {
        Err(Error::voter_unavailable("llm", "generation backend offline"))
    }
}

/// Tagger that recognizes a fixed list of names.
#[derive(Debug, Clone, Default)]
pub struct LexiconTagger {
    entries: Vec<(Vec<String>, EntityKind)>,
    confidence: f64,
}

impl LexiconTagger {
    /// Empty lexicon.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            confidence: 0.9,
        }
    }

    /// Add a (possibly multi-word) name.
    #[must_use]
    pub fn with(mut self, name: &str, kind: EntityKind) -> Self {
        let words = name.split_whitespace().map(str::to_lowercase).collect();
        self.entries.push((words, kind));
        self
    }
}

impl SpanTagger for LexiconTagger {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn tag(&self, _doc: &Document, sentence: &Sentence) -> Result<Vec<TaggedSpan>> {
        let lowered: Vec<String> = sentence.tokens.iter().map(|t| t.lower()).collect();
        let mut out = Vec::new();
        for (words, kind) in &self.entries {
            if words.is_empty() || words.len() > lowered.len() {
                continue;
            }
            for start in 0..=(lowered.len() - words.len()) {
                if lowered[start..start + words.len()] == words[..] {
                    let first = &sentence.tokens[start];
                    let last = &sentence.tokens[start + words.len() - 1];
                    out.push(TaggedSpan {
                        span: Span::new(first.span.start, last.span.end),
                        kind: *kind,
                        confidence: self.confidence,
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Tagger whose backend is down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTagger;

impl SpanTagger for UnavailableTagger {
    fn name(&self) -> &str {
        "unavailable-tagger"
    }

    fn tag(&self, _doc: &Document, _sentence: &Sentence) -> Result<Vec<TaggedSpan>> {
        Err(Error::voter_unavailable("transformer", "tagger model not loaded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::cosine;

    #[test]
    fn test_hash_embedder_is_deterministic() {
        let e = HashEmbedder::default();
        assert_eq!(e.embed("ojos azules").unwrap(), e.embed("ojos azules").unwrap());
    }

    #[test]
    fn test_hash_embedder_similarity_tracks_overlap() {
        let e = HashEmbedder::default();
        let a = e.embed("valiente y audaz").unwrap();
        let b = e.embed("valiente").unwrap();
        let c = e.embed("perezoso").unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }

    #[test]
    fn test_scripted_generator() {
        let g = ScriptedGenerator::new().respond("Isabel", serde_json::json!({"ok": true}));
        assert!(g.complete("¿Quién es Isabel?").unwrap().is_some());
        assert!(g.complete("nada").unwrap().is_none());
        assert_eq!(g.calls(), 2);
    }

    #[test]
    fn test_unavailable_generator_errors() {
        let err = UnavailableGenerator.complete("x").unwrap_err();
        assert!(matches!(err, Error::VoterUnavailable { .. }));
    }
}
