//! The four coreference voters.

use super::prodrop::{agreement, frequency, role_score, ProDropScorer};
use super::{AnaphorContext, PairVoter};
use crate::signals::{cosine, extract_json, Embedder, TextGenerator};
use crate::Result;
use cotejo_coalesce::name_similarity;
use cotejo_core::MentionForm;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Gender/number/person agreement.
#[derive(Debug, Clone, Default)]
pub struct MorphoVoter;

impl MorphoVoter {
    /// New voter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PairVoter for MorphoVoter {
    fn name(&self) -> &str {
        "morpho"
    }

    fn score(&self, ctx: &AnaphorContext<'_>) -> Result<Vec<Option<f64>>> {
        let a = ctx.anaphor;
        Ok(ctx
            .candidates
            .iter()
            .map(|c| {
                Some(
                    0.40 * agreement(a.gender, c.gender)
                        + 0.35 * agreement(a.number, c.number)
                        + 0.25 * agreement(a.person, c.person),
                )
            })
            .collect())
    }
}

/// Distance, salience and form preferences; pro-drop factors for zero
/// mentions; name similarity for nominal pairs.
#[derive(Debug, Clone)]
pub struct HeuristicsVoter {
    prodrop: ProDropScorer,
    /// Character distance at which the distance factor reaches 0.
    horizon: usize,
}

impl HeuristicsVoter {
    /// New voter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prodrop: ProDropScorer::default(),
            horizon: 1500,
        }
    }
}

impl Default for HeuristicsVoter {
    fn default() -> Self {
        Self::new()
    }
}

impl PairVoter for HeuristicsVoter {
    fn name(&self) -> &str {
        "heuristics"
    }

    fn score(&self, ctx: &AnaphorContext<'_>) -> Result<Vec<Option<f64>>> {
        let a = ctx.anaphor;
        let scores = ctx
            .candidates
            .iter()
            .map(|c| {
                let s = match a.form {
                    _ if ctx.nominal => name_similarity(&a.text, &c.text).score,
                    MentionForm::Zero => self.prodrop.score(ctx.doc, a, c, ctx.window),
                    _ => {
                        let dist = a.span.start.saturating_sub(c.span.end) as f64;
                        let distance = 1.0 - (dist / self.horizon.max(1) as f64).min(1.0);
                        let salience =
                            0.6 * role_score(ctx.doc, c) + 0.4 * frequency(c, a, ctx.window);
                        let form = match c.form {
                            MentionForm::Proper => 1.0,
                            MentionForm::DefiniteNp => 0.7,
                            _ => 0.5,
                        };
                        0.35 * distance + 0.30 * salience + 0.35 * form
                    }
                };
                Some(s.clamp(0.0, 1.0))
            })
            .collect();
        Ok(scores)
    }
}

/// Contextual similarity of the sentences around anaphor and candidate.
pub struct EmbeddingsVoter {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingsVoter {
    /// Wrap an embedder.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

impl PairVoter for EmbeddingsVoter {
    fn name(&self) -> &str {
        "embeddings"
    }

    fn score(&self, ctx: &AnaphorContext<'_>) -> Result<Vec<Option<f64>>> {
        let sentence_text = |i: usize| ctx.doc.sentence(i).map_or("", |s| ctx.doc.slice(s.span));
        let anchor = self.embedder.embed(sentence_text(ctx.anaphor.sentence))?;
        let mut cache: HashMap<usize, Vec<f32>> = HashMap::new();
        let mut out = Vec::with_capacity(ctx.candidates.len());
        for c in &ctx.candidates {
            if !cache.contains_key(&c.sentence) {
                let v = self.embedder.embed(sentence_text(c.sentence))?;
                cache.insert(c.sentence, v);
            }
            let sim = cache.get(&c.sentence).map_or(0.0, |v| cosine(&anchor, v));
            out.push(Some(sim.max(0.0)));
        }
        Ok(out)
    }
}

/// Asks the text generator to pick the antecedent from a numbered list.
///
/// Expected answer: `{"antecedent": 2, "confidence": 0.8}`; `null` or a
/// missing answer is an abstention.
pub struct LlmPairVoter {
    generator: Arc<dyn TextGenerator>,
}

impl LlmPairVoter {
    /// Wrap a generator.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn prompt(ctx: &AnaphorContext<'_>) -> String {
        let first = ctx
            .candidates
            .iter()
            .map(|c| c.sentence)
            .min()
            .unwrap_or(ctx.anaphor.sentence);
        let span = ctx
            .doc
            .sentence(first)
            .zip(ctx.doc.sentence(ctx.anaphor.sentence))
            .map_or(ctx.anaphor.span, |(a, b)| a.span.cover(&b.span));
        let mut prompt = format!(
            "Texto:\n{}\n\n¿A quién se refiere \"{}\"{}? Candidatos:\n",
            ctx.doc.slice(span),
            ctx.anaphor.text,
            if ctx.anaphor.form == MentionForm::Zero {
                " (sujeto omitido)"
            } else {
                ""
            }
        );
        for (i, c) in ctx.candidates.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, c.text);
        }
        prompt.push_str(
            "Responde solo con JSON: {\"antecedent\": <número o null>, \"confidence\": <0-1>}",
        );
        prompt
    }
}

impl PairVoter for LlmPairVoter {
    fn name(&self) -> &str {
        "llm"
    }

    fn score(&self, ctx: &AnaphorContext<'_>) -> Result<Vec<Option<f64>>> {
        let abstain = vec![None; ctx.candidates.len()];
        if ctx.nominal || ctx.candidates.is_empty() {
            return Ok(abstain);
        }
        let Some(answer) = self.generator.complete(&Self::prompt(ctx))? else {
            return Ok(abstain);
        };
        let answer = match answer {
            serde_json::Value::String(raw) => extract_json(&raw).unwrap_or_default(),
            other => other,
        };
        let Some(choice) = answer.get("antecedent").and_then(serde_json::Value::as_u64) else {
            return Ok(abstain);
        };
        let confidence = answer
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.7)
            .clamp(0.0, 1.0);
        let pick = (choice as usize).checked_sub(1);
        if pick.map_or(true, |p| p >= ctx.candidates.len()) {
            log::debug!("[coref] llm answered out-of-range antecedent {choice}");
            return Ok(abstain);
        }
        Ok((0..ctx.candidates.len())
            .map(|i| Some(if Some(i) == pick { confidence } else { 0.0 }))
            .collect())
    }
}
