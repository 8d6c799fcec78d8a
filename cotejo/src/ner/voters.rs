//! The five NER voters.

use super::{SpanVote, SpanVoter};
use crate::lang;
use crate::signals::{extract_json, SpanTagger, TextGenerator};
use crate::Result;
use cotejo_coalesce::strip_accents;
use cotejo_core::{BioTag, Chapter, Document, EntityKind, Pos, Sentence, Span};
use std::sync::Arc;

fn chapter_span(doc: &Document, chapter: &Chapter) -> Option<Span> {
    let sentences = doc.chapter_sentences(chapter);
    let first = sentences.first()?;
    let last = sentences.last()?;
    Some(first.span.cover(&last.span))
}

// =============================================================================
// Statistical
// =============================================================================

/// Reads the BIO tags the external statistical tagger left on tokens.
///
/// Tags are read across sentence breaks, so an `I-` tag at the start of a
/// sentence continues the open span; the boundary filter decides later
/// whether the break was real.
#[derive(Debug, Clone)]
pub struct StatisticalVoter {
    confidence: f64,
}

impl Default for StatisticalVoter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticalVoter {
    /// Voter with the default confidence (0.8).
    #[must_use]
    pub fn new() -> Self {
        Self { confidence: 0.8 }
    }
}

impl SpanVoter for StatisticalVoter {
    fn name(&self) -> &str {
        "statistical"
    }

    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>> {
        let mut out = Vec::new();
        let mut open: Option<(Span, EntityKind)> = None;
        for sentence in doc.chapter_sentences(chapter) {
            for tok in &sentence.tokens {
                match (tok.ner, open) {
                    (Some(BioTag::Inside(k)), Some((span, kind))) if k == kind => {
                        open = Some((span.cover(&tok.span), kind));
                    }
                    (Some(tag), _) => {
                        if let Some((span, kind)) = open.take() {
                            out.push(SpanVote::new(span, kind, self.confidence));
                        }
                        open = Some((tok.span, tag.kind()));
                    }
                    (None, _) => {
                        if let Some((span, kind)) = open.take() {
                            out.push(SpanVote::new(span, kind, self.confidence));
                        }
                    }
                }
            }
        }
        if let Some((span, kind)) = open {
            out.push(SpanVote::new(span, kind, self.confidence));
        }
        Ok(out)
    }
}

// =============================================================================
// Transformer
// =============================================================================

/// Adapter over an external sequence tagger.
pub struct TransformerVoter {
    tagger: Arc<dyn SpanTagger>,
}

impl TransformerVoter {
    /// Wrap a tagger.
    #[must_use]
    pub fn new(tagger: Arc<dyn SpanTagger>) -> Self {
        Self { tagger }
    }
}

impl SpanVoter for TransformerVoter {
    fn name(&self) -> &str {
        "transformer"
    }

    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>> {
        let mut out = Vec::new();
        for sentence in doc.chapter_sentences(chapter) {
            for tagged in self.tagger.tag(doc, sentence)? {
                out.push(SpanVote::new(tagged.span, tagged.kind, tagged.confidence));
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Gazetteer
// =============================================================================

/// Project lexicon of known character names and fictional places.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: Vec<(Vec<String>, EntityKind)>,
}

impl Gazetteer {
    /// Empty lexicon.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a (possibly multi-word) name.
    #[must_use]
    pub fn with(mut self, name: &str, kind: EntityKind) -> Self {
        self.insert(name, kind);
        self
    }

    /// Add a name in place.
    pub fn insert(&mut self, name: &str, kind: EntityKind) {
        let words: Vec<String> = name.split_whitespace().map(fold).collect();
        if !words.is_empty() {
            self.entries.push((words, kind));
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn fold(word: &str) -> String {
    strip_accents(&word.to_lowercase())
}

/// Exact, accent-insensitive lookup of gazetteer names.
#[derive(Debug, Clone)]
pub struct GazetteerVoter {
    gazetteer: Gazetteer,
    confidence: f64,
}

impl GazetteerVoter {
    /// Voter over a lexicon.
    #[must_use]
    pub fn new(gazetteer: Gazetteer) -> Self {
        Self {
            gazetteer,
            confidence: 0.85,
        }
    }
}

impl SpanVoter for GazetteerVoter {
    fn name(&self) -> &str {
        "gazetteer"
    }

    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>> {
        let mut out = Vec::new();
        for sentence in doc.chapter_sentences(chapter) {
            let folded: Vec<String> = sentence.tokens.iter().map(|t| fold(&t.text)).collect();
            for (words, kind) in &self.gazetteer.entries {
                if words.len() > folded.len() {
                    continue;
                }
                for start in 0..=(folded.len() - words.len()) {
                    if folded[start..start + words.len()] == words[..] {
                        let span = sentence.tokens[start]
                            .span
                            .cover(&sentence.tokens[start + words.len() - 1].span);
                        out.push(SpanVote::new(span, *kind, self.confidence));
                    }
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Heuristic
// =============================================================================

const HONORIFICS: &[&str] = &[
    "don", "doña", "señor", "señora", "señorita", "sr.", "sra.", "srta.", "dr.", "dra.", "d.",
    "dña.", "fray", "sor", "padre", "capitán", "tío", "tía",
];

const LOCATIVE_PREPOSITIONS: &[&str] = &["en", "hacia", "desde", "hasta", "por"];

/// Runs of proper nouns, typed by their context.
///
/// Runs may contain the particles "de", "del" and "la" between proper nouns
/// ("Juan de la Cruz").
#[derive(Debug, Clone, Default)]
pub struct HeuristicVoter;

impl HeuristicVoter {
    /// New voter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn classify(sentence: &Sentence, start: usize, end: usize, text: &str) -> (EntityKind, f64) {
        let prev = start.checked_sub(1).map(|i| sentence.tokens[i].lower());
        if prev.as_deref().is_some_and(|p| HONORIFICS.contains(&p)) {
            return (EntityKind::Person, 0.75);
        }
        if lang::is_person_name(text) {
            return (EntityKind::Person, 0.7);
        }
        let range = start..end;
        if let Some(head) = sentence.head_of(range) {
            let tok = &sentence.tokens[head];
            let gov = tok.head.map(|h| &sentence.tokens[h]);
            if tok.dep.is_subject() && gov.is_some_and(|g| lang::selects_animate_subject(&g.lemma)) {
                return (EntityKind::Person, 0.6);
            }
        }
        if prev.as_deref().is_some_and(|p| LOCATIVE_PREPOSITIONS.contains(&p)) {
            return (EntityKind::Location, 0.6);
        }
        (EntityKind::Misc, 0.5)
    }
}

impl SpanVoter for HeuristicVoter {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>> {
        let mut out = Vec::new();
        for sentence in doc.chapter_sentences(chapter) {
            let toks = &sentence.tokens;
            let mut i = 0;
            while i < toks.len() {
                if toks[i].pos != Pos::Propn || !toks[i].is_capitalized() {
                    i += 1;
                    continue;
                }
                let start = i;
                let mut end = i + 1;
                loop {
                    let mut j = end;
                    while j < toks.len() && matches!(toks[j].lower().as_str(), "de" | "del" | "la") {
                        j += 1;
                    }
                    if j < toks.len() && toks[j].pos == Pos::Propn && toks[j].is_capitalized() {
                        end = j + 1;
                    } else {
                        break;
                    }
                }
                let span = toks[start].span.cover(&toks[end - 1].span);
                let text = doc.slice(span);
                let (kind, confidence) = Self::classify(sentence, start, end, text);
                out.push(SpanVote::new(span, kind, confidence));
                i = end;
            }
        }
        Ok(out)
    }
}

// =============================================================================
// LLM
// =============================================================================

/// Asks the text generator for a JSON list of entities and locates them.
///
/// Expected answer: `{"entities": [{"text": "...", "type": "PER", "confidence": 0.9}]}`.
pub struct LlmVoter {
    generator: Arc<dyn TextGenerator>,
    default_confidence: f64,
}

impl LlmVoter {
    /// Wrap a generator.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            default_confidence: 0.7,
        }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Extrae las entidades nombradas (personajes, lugares, objetos) del siguiente \
             fragmento de novela. Responde solo con JSON: \
             {{\"entities\": [{{\"text\": \"...\", \"type\": \"PER|LOC|OBJ|MISC\", \"confidence\": 0.0}}]}}\n\n\
             Texto:\n{text}"
        )
    }
}

impl SpanVoter for LlmVoter {
    fn name(&self) -> &str {
        "llm"
    }

    fn propose(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<SpanVote>> {
        let Some(cspan) = chapter_span(doc, chapter) else {
            return Ok(Vec::new());
        };
        let text = doc.slice(cspan);
        let Some(answer) = self.generator.complete(&Self::prompt(text))? else {
            log::debug!("[ner] llm abstained on chapter {}", chapter.number);
            return Ok(Vec::new());
        };
        let answer = match answer {
            serde_json::Value::String(raw) => extract_json(&raw).unwrap_or_default(),
            other => other,
        };
        let Some(entities) = answer.get("entities").and_then(|e| e.as_array()) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for entity in entities {
            let Some(surface) = entity.get("text").and_then(|t| t.as_str()) else {
                continue;
            };
            let kind = entity
                .get("type")
                .and_then(|t| t.as_str())
                .and_then(EntityKind::from_label)
                .unwrap_or(EntityKind::Misc);
            let confidence = entity
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(self.default_confidence);
            for span in lang::find_words(text, surface) {
                out.push(SpanVote::new(
                    Span::new(cspan.start + span.start, cspan.start + span.end),
                    kind,
                    confidence,
                ));
            }
        }
        Ok(out)
    }
}
