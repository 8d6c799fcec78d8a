//! Attribute extractors.
//!
//! Each extractor reads one chapter and proposes [`Candidate`]s anchored on a
//! token. Binding a candidate to an entity is left to the scope resolver.

use super::lexicon;
use crate::lang;
use crate::signals::{cosine, extract_json, Embedder, TextGenerator};
use crate::Result;
use cotejo_core::{AttributeKey, Chapter, DepRel, Document, Pos, Sentence, Span};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::sync::Arc;

/// An attribute value proposed by one extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub key: AttributeKey,
    /// Surface value as written.
    pub value: String,
    pub normalized: String,
    /// Document sentence index.
    pub sentence: usize,
    /// Anchor token inside the sentence.
    pub token: usize,
    /// Character span of the value.
    pub span: Span,
    pub confidence: f64,
}

impl Candidate {
    fn at(s: &Sentence, token: usize, key: AttributeKey, value: &str, confidence: f64) -> Self {
        Self {
            key,
            value: value.to_string(),
            normalized: lexicon::normalize_value(key, value),
            sentence: s.index,
            token,
            span: s.tokens[token].span,
            confidence,
        }
    }
}

/// An independent attribute extraction method.
pub trait AttributeExtractor: Send + Sync {
    /// Method name; must match a key of the attribute voting weights.
    fn name(&self) -> &str;

    /// Propose candidates for one chapter.
    fn extract(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<Candidate>>;
}

// =============================================================================
// Patterns
// =============================================================================

static BODY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(ojos|ojo|mirada|iris|pelo|cabello|melena|cabellera|barba|bigote|perilla|piel|tez|cutis)\s+(?:de\s+(?:color\s+)?)?(\w+)",
    )
    .expect("valid regex")
});

static AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}|[a-záéíóúñ]+(?:\s+y\s+[a-záéíóúñ]+)?)\s+años\b").expect("valid regex")
});

static HEIGHT_METRES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bmed[íi]a\s+(\d[.,]\d{1,2})(?:\s*m(?:etros)?)?\b").expect("valid regex")
});

static DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:era|es|fue|parecía)\s+(?:un|una)?\s*(?:muy|bastante|algo)?\s*(\w+)").expect("valid regex")
});

/// Regex patterns over sentence text.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    confidence: f64,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self { confidence: 0.7 }
    }
}

impl PatternExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sentence(&self, doc: &Document, s: &Sentence, out: &mut Vec<Candidate>) {
        let text = doc.slice(s.span);
        let token_for = |byte: usize| s.token_at(text[..byte].chars().count() + s.span.start);

        for caps in BODY_VALUE.captures_iter(text) {
            let (Some(part), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(body_key) = token_for(part.start()).and_then(|t| lang::body_part(&s.tokens[t].lemma)) else {
                continue;
            };
            let value_lemma = lexicon::lemma(value.as_str());
            let key = if body_key == AttributeKey::HairColor {
                lexicon::hair_key(&value_lemma)
            } else {
                body_key
            };
            if !lexicon::fits_body_part(body_key, &value_lemma) {
                continue;
            }
            if let Some(t) = token_for(value.start()) {
                out.push(Candidate::at(s, t, key, value.as_str(), self.confidence));
            }
        }

        for caps in AGE.captures_iter(text) {
            let Some(num) = caps.get(1) else { continue };
            if lang::parse_number(num.as_str()).is_none() {
                continue;
            }
            if let Some(t) = token_for(num.start()) {
                out.push(Candidate::at(s, t, AttributeKey::Age, num.as_str(), self.confidence));
            }
        }

        for caps in HEIGHT_METRES.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            if let Some(t) = token_for(m.start()) {
                out.push(Candidate::at(s, t, AttributeKey::Height, m.as_str(), self.confidence));
            }
        }

        for caps in DESCRIPTION.captures_iter(text) {
            let Some(word) = caps.get(1) else { continue };
            let lemma = lexicon::lemma(word.as_str());
            let Some(key) = lexicon::classify(&lemma) else {
                continue;
            };
            if let Some(t) = token_for(word.start()) {
                out.push(Candidate::at(s, t, key, word.as_str(), self.confidence));
            }
        }
    }
}

impl AttributeExtractor for PatternExtractor {
    fn name(&self) -> &str {
        "patterns"
    }

    fn extract(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<Candidate>> {
        let mut out = Vec::new();
        for s in doc.chapter_sentences(chapter) {
            self.sentence(doc, s, &mut out);
        }
        Ok(out)
    }
}

// =============================================================================
// Dependency
// =============================================================================

/// Reads attribute relations off the dependency tree.
///
/// | Construction | Key |
/// |--------------|-----|
/// | adjective modifying a body part ("ojos verdes") | from the body part |
/// | copular predicate with a body-part subject ("sus ojos eran verdes") | from the body part |
/// | copular predicate with `ser` ("era alto") | from the lexicon |
/// | `tener` + N `años` | age |
/// | appositive profession ("Juan, el herrero") | profession |
///
/// `estar` with a transient state adjective ("estaba cansada") is skipped.
#[derive(Debug, Clone)]
pub struct DependencyExtractor {
    confidence: f64,
}

impl Default for DependencyExtractor {
    fn default() -> Self {
        Self { confidence: 0.75 }
    }
}

impl DependencyExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn token(&self, s: &Sentence, i: usize) -> Option<Candidate> {
        let tok = &s.tokens[i];
        let lemma = lexicon::lemma(&tok.lemma);

        if tok.pos == Pos::Num || (tok.dep == DepRel::Nummod && lang::parse_number(&tok.text).is_some()) {
            let head = tok.head?;
            let years = &s.tokens[head];
            if years.lemma == "año" && years.head.is_some_and(|h| s.tokens[h].lemma == "tener") {
                return Some(Candidate::at(s, i, AttributeKey::Age, &tok.text, self.confidence));
            }
            return None;
        }

        if !matches!(tok.pos, Pos::Adj | Pos::Noun) {
            return None;
        }

        if tok.dep == DepRel::Amod {
            let head = tok.head?;
            let body_key = lang::body_part(&s.tokens[head].lemma)?;
            return self.body_candidate(s, i, body_key, &lemma);
        }

        if let Some(cop) = s.child_where(i, |d| d == DepRel::Cop) {
            let copula = s.tokens[cop].lemma.as_str();
            if copula == "estar" && lang::is_state_adjective(&lemma) {
                return None;
            }
            if let Some(subj) = s.child_where(i, DepRel::is_subject) {
                if let Some(body_key) = lang::body_part(&s.tokens[subj].lemma) {
                    return self.body_candidate(s, i, body_key, &lemma);
                }
            }
            if copula != "ser" {
                return None;
            }
            let key = lexicon::classify(&lemma)?;
            return Some(Candidate::at(s, i, key, &tok.text, self.confidence));
        }

        if tok.dep == DepRel::Appos {
            let key = lexicon::classify(&lemma)?;
            if matches!(key, AttributeKey::Profession | AttributeKey::Nationality) {
                return Some(Candidate::at(s, i, key, &tok.text, self.confidence));
            }
        }
        None
    }

    fn body_candidate(&self, s: &Sentence, i: usize, body_key: AttributeKey, lemma: &str) -> Option<Candidate> {
        if lexicon::is_shade(lemma) || !lexicon::fits_body_part(body_key, lemma) {
            return None;
        }
        let key = if body_key == AttributeKey::HairColor {
            lexicon::hair_key(lemma)
        } else {
            body_key
        };
        Some(Candidate::at(s, i, key, &s.tokens[i].text, self.confidence))
    }
}

impl AttributeExtractor for DependencyExtractor {
    fn name(&self) -> &str {
        "dependency"
    }

    fn extract(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<Candidate>> {
        Ok(doc
            .chapter_sentences(chapter)
            .iter()
            .flat_map(|s| (0..s.tokens.len()).filter_map(move |i| self.token(s, i)))
            .collect())
    }
}

// =============================================================================
// Embeddings
// =============================================================================

const PROTOTYPES: &[(AttributeKey, &str)] = &[
    (AttributeKey::EyeColor, "ojos de color"),
    (AttributeKey::HairColor, "pelo de color"),
    (AttributeKey::HairType, "pelo liso rizado largo corto"),
    (AttributeKey::Build, "complexión del cuerpo delgado corpulento"),
    (AttributeKey::Height, "estatura alto bajo"),
    (AttributeKey::Skin, "piel de tono"),
    (AttributeKey::Personality, "carácter personalidad temperamento"),
    (AttributeKey::DistinctiveFeature, "cicatriz marca lunar en la cara"),
];

/// Nearest attribute prototype of the adjective in context.
pub struct EmbeddingsExtractor {
    embedder: Arc<dyn Embedder>,
    threshold: f64,
    prototypes: OnceCell<Vec<(AttributeKey, Vec<f32>)>>,
}

impl EmbeddingsExtractor {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            threshold: 0.5,
            prototypes: OnceCell::new(),
        }
    }

    /// Minimum cosine to a prototype.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    fn prototypes(&self) -> Result<&[(AttributeKey, Vec<f32>)]> {
        self.prototypes
            .get_or_try_init(|| {
                PROTOTYPES
                    .iter()
                    .map(|(k, text)| Ok((*k, self.embedder.embed(text)?)))
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// Text embedded for a descriptive token, if it is one.
    fn query_text(s: &Sentence, i: usize) -> Option<String> {
        let tok = &s.tokens[i];
        if tok.pos != Pos::Adj {
            return None;
        }
        if tok.dep == DepRel::Amod {
            let head = &s.tokens[tok.head?];
            return Some(format!("{} {}", head.lemma, tok.lemma));
        }
        s.child_where(i, |d| d == DepRel::Cop)?;
        match s.child_where(i, DepRel::is_subject) {
            Some(subj) if lang::body_part(&s.tokens[subj].lemma).is_some() => {
                Some(format!("{} {}", s.tokens[subj].lemma, tok.lemma))
            }
            _ => Some(tok.lemma.clone()),
        }
    }
}

impl AttributeExtractor for EmbeddingsExtractor {
    fn name(&self) -> &str {
        "embeddings"
    }

    fn extract(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<Candidate>> {
        let prototypes = self.prototypes()?;
        let mut out = Vec::new();
        for s in doc.chapter_sentences(chapter) {
            for i in 0..s.tokens.len() {
                let Some(query) = Self::query_text(s, i) else { continue };
                if lang::is_state_adjective(&s.tokens[i].lemma) {
                    continue;
                }
                let v = self.embedder.embed(&query)?;
                let best = prototypes
                    .iter()
                    .map(|(k, p)| (*k, cosine(&v, p)))
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((key, sim)) = best {
                    if sim >= self.threshold {
                        out.push(Candidate::at(s, i, key, &s.tokens[i].text, sim));
                    }
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// LLM
// =============================================================================

/// Asks a text generator for physical and character attributes.
pub struct LlmExtractor {
    generator: Arc<dyn TextGenerator>,
    default_confidence: f64,
}

impl LlmExtractor {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            default_confidence: 0.7,
        }
    }

    fn prompt(text: &str) -> String {
        let keys: Vec<&str> = AttributeKey::ALL.iter().map(|k| k.as_str()).collect();
        format!(
            "Extrae los atributos de los personajes (físicos y de carácter) del siguiente \
             fragmento de novela. Claves posibles: {}. Responde solo con JSON: \
             {{\"attributes\": [{{\"key\": \"...\", \"value\": \"palabra exacta del texto\", \"confidence\": 0.0}}]}}\n\n\
             Texto:\n{text}",
            keys.join(", ")
        )
    }
}

impl AttributeExtractor for LlmExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    fn extract(&self, doc: &Document, chapter: &Chapter) -> Result<Vec<Candidate>> {
        let sentences = doc.chapter_sentences(chapter);
        let (Some(first), Some(last)) = (sentences.first(), sentences.last()) else {
            return Ok(Vec::new());
        };
        let text = doc.slice(first.span.cover(&last.span));
        let Some(answer) = self.generator.complete(&Self::prompt(text))? else {
            log::debug!("[attributes] llm abstained on chapter {}", chapter.number);
            return Ok(Vec::new());
        };
        let answer = match answer {
            serde_json::Value::String(raw) => extract_json(&raw).unwrap_or_default(),
            other => other,
        };
        let Some(items) = answer.get("attributes").and_then(|a| a.as_array()) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for item in items {
            let key = item.get("key").and_then(|k| k.as_str()).and_then(AttributeKey::parse);
            let value = item.get("value").and_then(|v| v.as_str());
            let (Some(key), Some(value)) = (key, value) else {
                continue;
            };
            let confidence = item
                .get("confidence")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(self.default_confidence);
            for s in sentences {
                for hit in lang::find_words(doc.slice(s.span), value) {
                    let Some(t) = s.token_at(s.span.start + hit.start) else {
                        continue;
                    };
                    let mut c = Candidate::at(s, t, key, value, confidence);
                    c.span = Span::new(s.span.start + hit.start, s.span.start + hit.end);
                    out.push(c);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::fake::{HashEmbedder, ScriptedGenerator};
    use cotejo_core::parse_conllu;
    use serde_json::json;

    const EYES: &str = "\
# chapter = 1
1\tPedro\tPedro\tPROPN\t_\t_\t2\tnsubj\t_\t_
2\ttenía\ttener\tVERB\t_\tMood=Ind|VerbForm=Fin\t0\troot\t_\t_
3\tlos\tel\tDET\t_\t_\t4\tdet\t_\t_
4\tojos\tojo\tNOUN\t_\tGender=Masc|Number=Plur\t2\tobj\t_\t_
5\tverdes\tverde\tADJ\t_\tNumber=Plur\t4\tamod\t_\tSpaceAfter=No
6\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_

1\tEra\tser\tAUX\t_\tMood=Ind|VerbForm=Fin\t2\tcop\t_\t_
2\talto\talto\tADJ\t_\tGender=Masc|Number=Sing\t0\troot\t_\t_
3\ty\ty\tCCONJ\t_\t_\t4\tcc\t_\t_
4\ttenía\ttener\tVERB\t_\tMood=Ind|VerbForm=Fin\t2\tconj\t_\t_
5\ttreinta\ttreinta\tNUM\t_\t_\t6\tnummod\t_\t_
6\taños\taño\tNOUN\t_\tNumber=Plur\t4\tobj\t_\tSpaceAfter=No
7\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
";

    const TIRED: &str = "\
1\tEstaba\testar\tAUX\t_\tMood=Ind|VerbForm=Fin\t2\tcop\t_\t_
2\tcansado\tcansado\tADJ\t_\tGender=Masc|Number=Sing\t0\troot\t_\tSpaceAfter=No
3\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
";

    fn keys(c: &[Candidate]) -> Vec<(AttributeKey, String)> {
        let mut v: Vec<_> = c.iter().map(|c| (c.key, c.normalized.clone())).collect();
        v.sort();
        v
    }

    #[test]
    fn test_dependency_extractor() {
        let doc = parse_conllu(EYES).unwrap();
        let got = DependencyExtractor::new().extract(&doc, &doc.chapters[0]).unwrap();
        assert_eq!(
            keys(&got),
            vec![
                (AttributeKey::EyeColor, "verde".to_string()),
                (AttributeKey::Age, "30".to_string()),
                (AttributeKey::Height, "alto".to_string()),
            ]
        );
    }

    #[test]
    fn test_state_adjective_with_estar_is_skipped() {
        let doc = parse_conllu(TIRED).unwrap();
        let got = DependencyExtractor::new().extract(&doc, &doc.chapters[0]).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_patterns_agree_with_dependency_anchor() {
        let doc = parse_conllu(EYES).unwrap();
        let got = PatternExtractor::new().extract(&doc, &doc.chapters[0]).unwrap();
        let eyes = got.iter().find(|c| c.key == AttributeKey::EyeColor).unwrap();
        assert_eq!((eyes.sentence, eyes.token), (0, 4));
        assert!(got.iter().any(|c| c.key == AttributeKey::Age && c.token == 4 && c.sentence == 1));
        assert!(got.iter().any(|c| c.key == AttributeKey::Height && c.token == 1));
    }

    #[test]
    fn test_llm_values_are_located() {
        let doc = parse_conllu(EYES).unwrap();
        let generator = ScriptedGenerator::new().respond(
            "Pedro",
            json!({"attributes": [{"key": "eye_color", "value": "verdes", "confidence": 0.9}, {"key": "shoe", "value": "alto"}]}),
        );
        let got = LlmExtractor::new(Arc::new(generator))
            .extract(&doc, &doc.chapters[0])
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].token, 4);
        assert_eq!(doc.slice(got[0].span), "verdes");
    }

    #[test]
    fn test_embeddings_use_prototypes() {
        let doc = parse_conllu(EYES).unwrap();
        let embedder = HashEmbedder::new(4)
            .with_vector("ojos de color", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("ojo verde", vec![0.9, 0.1, 0.0, 0.0])
            .with_vector("alto", vec![0.0, 0.0, 0.0, 1.0]);
        let got = EmbeddingsExtractor::new(Arc::new(embedder))
            .with_threshold(0.8)
            .extract(&doc, &doc.chapters[0])
            .unwrap();
        let eyes: Vec<_> = got.iter().filter(|c| c.key == AttributeKey::EyeColor).collect();
        assert_eq!(eyes.len(), 1);
        assert_eq!(eyes[0].token, 4);
    }
}
