//! Annotated document model consumed from the external parser/tagger.
//!
//! A [`Document`] is the full manuscript text plus its sentences, already
//! tokenized and annotated with universal POS tags, morphological features and
//! dependency arcs. Sentences are stored flat; chapters and paragraphs are
//! ranges over them.
//!
//! All offsets are **character** offsets into [`Document::text`], not bytes.

use crate::mention::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

// =============================================================================
// Span
// =============================================================================

/// Half-open character range `[start, end)` within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a span. `end` is clamped to be at least `start`.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for a zero-width span.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// True if the two spans share at least one character.
    #[must_use]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if `other` lies entirely within `self`.
    #[must_use]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest span covering both.
    #[must_use]
    pub fn cover(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// =============================================================================
// Part of speech and dependency relations
// =============================================================================

/// Universal Dependencies part-of-speech tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pos {
    Noun,
    Propn,
    Pron,
    Verb,
    Aux,
    Adj,
    Adv,
    Det,
    Adp,
    Num,
    Cconj,
    Sconj,
    Part,
    Intj,
    Punct,
    Sym,
    #[default]
    X,
}

impl Pos {
    /// Verb or auxiliary.
    #[must_use]
    pub fn is_verbal(self) -> bool {
        matches!(self, Pos::Verb | Pos::Aux)
    }

    /// Noun, proper noun or pronoun.
    #[must_use]
    pub fn is_nominal(self) -> bool {
        matches!(self, Pos::Noun | Pos::Propn | Pos::Pron)
    }
}

impl FromStr for Pos {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "NOUN" => Pos::Noun,
            "PROPN" => Pos::Propn,
            "PRON" => Pos::Pron,
            "VERB" => Pos::Verb,
            "AUX" => Pos::Aux,
            "ADJ" => Pos::Adj,
            "ADV" => Pos::Adv,
            "DET" => Pos::Det,
            "ADP" => Pos::Adp,
            "NUM" => Pos::Num,
            "CCONJ" | "CONJ" => Pos::Cconj,
            "SCONJ" => Pos::Sconj,
            "PART" => Pos::Part,
            "INTJ" => Pos::Intj,
            "PUNCT" => Pos::Punct,
            "SYM" => Pos::Sym,
            "X" | "_" => Pos::X,
            other => return Err(format!("unknown UPOS tag '{other}'")),
        })
    }
}

/// Universal Dependencies relation, reduced to the labels the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepRel {
    Root,
    Nsubj,
    NsubjPass,
    Obj,
    Iobj,
    Obl,
    Cop,
    Amod,
    Acl,
    AclRelcl,
    Appos,
    Nmod,
    Det,
    Case,
    Conj,
    Cc,
    Advmod,
    Advcl,
    Mark,
    Xcomp,
    Ccomp,
    Aux,
    Expl,
    Flat,
    Nummod,
    Punct,
    #[default]
    Other,
}

impl DepRel {
    /// Nominal subject, active or passive.
    #[must_use]
    pub fn is_subject(self) -> bool {
        matches!(self, DepRel::Nsubj | DepRel::NsubjPass)
    }

    /// Relations that open a clause of their own (the clause head may carry
    /// its own subject).
    #[must_use]
    pub fn opens_clause(self) -> bool {
        matches!(
            self,
            DepRel::Root
                | DepRel::Conj
                | DepRel::Ccomp
                | DepRel::Advcl
                | DepRel::Acl
                | DepRel::AclRelcl
        )
    }
}

impl FromStr for DepRel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Ok(match lower.as_str() {
            "root" => DepRel::Root,
            "nsubj" => DepRel::Nsubj,
            "nsubj:pass" | "nsubjpass" => DepRel::NsubjPass,
            "obj" | "dobj" => DepRel::Obj,
            "iobj" => DepRel::Iobj,
            "cop" => DepRel::Cop,
            "amod" => DepRel::Amod,
            "acl" => DepRel::Acl,
            "acl:relcl" | "relcl" => DepRel::AclRelcl,
            "appos" => DepRel::Appos,
            "det" | "det:poss" => DepRel::Det,
            "case" => DepRel::Case,
            "cc" => DepRel::Cc,
            "advmod" => DepRel::Advmod,
            "mark" => DepRel::Mark,
            "xcomp" => DepRel::Xcomp,
            "ccomp" => DepRel::Ccomp,
            "nummod" => DepRel::Nummod,
            "punct" => DepRel::Punct,
            other => match other.split(':').next().unwrap_or(other) {
                "obl" => DepRel::Obl,
                "nmod" => DepRel::Nmod,
                "conj" => DepRel::Conj,
                "advcl" => DepRel::Advcl,
                "aux" => DepRel::Aux,
                "expl" => DepRel::Expl,
                "flat" | "fixed" | "compound" => DepRel::Flat,
                _ => DepRel::Other,
            },
        })
    }
}

// =============================================================================
// Morphology
// =============================================================================

/// Grammatical gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Masc,
    Fem,
}

/// Grammatical number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Number {
    Sing,
    Plur,
}

/// Grammatical person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Person {
    First,
    Second,
    Third,
}

/// Verbal mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Ind,
    Sub,
    Cnd,
    Imp,
}

/// Verb form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerbForm {
    Fin,
    Inf,
    Part,
    Ger,
}

/// Morphological features of a token (UD `FEATS` column).
///
/// Unknown features are ignored; absent features stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Morph {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb_form: Option<VerbForm>,
    /// `PronType=Prs` / `Dem` / `Art` etc. are collapsed to the few we use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pron_type: Option<PronType>,
    /// `Poss=Yes`.
    #[serde(default)]
    pub possessive: bool,
    /// `Definite=Def`.
    #[serde(default)]
    pub definite: bool,
}

/// Pronoun subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PronType {
    Personal,
    Demonstrative,
    Relative,
    Article,
    Other,
}

impl Morph {
    /// Parse a UD feature string such as `Gender=Fem|Number=Sing`.
    ///
    /// `_` and the empty string yield default (no features).
    #[must_use]
    pub fn parse(feats: &str) -> Self {
        let mut morph = Morph::default();
        if feats.is_empty() || feats == "_" {
            return morph;
        }
        for pair in feats.split('|') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "Gender" => {
                    morph.gender = match value {
                        "Masc" => Some(Gender::Masc),
                        "Fem" => Some(Gender::Fem),
                        _ => None,
                    }
                }
                "Number" => {
                    morph.number = match value {
                        "Sing" => Some(Number::Sing),
                        "Plur" => Some(Number::Plur),
                        _ => None,
                    }
                }
                "Person" => {
                    morph.person = match value {
                        "1" => Some(Person::First),
                        "2" => Some(Person::Second),
                        "3" => Some(Person::Third),
                        _ => None,
                    }
                }
                "Mood" => {
                    morph.mood = match value {
                        "Ind" => Some(Mood::Ind),
                        "Sub" => Some(Mood::Sub),
                        "Cnd" => Some(Mood::Cnd),
                        "Imp" => Some(Mood::Imp),
                        _ => None,
                    }
                }
                "VerbForm" => {
                    morph.verb_form = match value {
                        "Fin" => Some(VerbForm::Fin),
                        "Inf" => Some(VerbForm::Inf),
                        "Part" => Some(VerbForm::Part),
                        "Ger" => Some(VerbForm::Ger),
                        _ => None,
                    }
                }
                "PronType" => {
                    morph.pron_type = Some(match value {
                        "Prs" => PronType::Personal,
                        "Dem" => PronType::Demonstrative,
                        "Rel" | "Int,Rel" => PronType::Relative,
                        "Art" => PronType::Article,
                        _ => PronType::Other,
                    })
                }
                "Poss" => morph.possessive = value == "Yes",
                "Definite" => morph.definite = value == "Def",
                _ => {}
            }
        }
        morph
    }
}

/// BIO tag emitted by the external statistical tagger (MISC `NER=B-PER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BioTag {
    Begin(EntityKind),
    Inside(EntityKind),
}

impl BioTag {
    /// Parse `B-PER`, `I-LOC`, ... Returns `None` for `O` or unknown labels.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let (prefix, label) = tag.split_once('-')?;
        let kind = EntityKind::from_label(label)?;
        match prefix {
            "B" | "S" | "U" => Some(BioTag::Begin(kind)),
            "I" | "E" | "L" => Some(BioTag::Inside(kind)),
            _ => None,
        }
    }

    /// The entity kind carried by the tag.
    #[must_use]
    pub fn kind(self) -> EntityKind {
        match self {
            BioTag::Begin(k) | BioTag::Inside(k) => k,
        }
    }
}

// =============================================================================
// Tokens, sentences, chapters
// =============================================================================

/// One annotated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub lemma: String,
    pub pos: Pos,
    #[serde(default)]
    pub morph: Morph,
    pub dep: DepRel,
    /// Index of the syntactic head within the same sentence; `None` for root.
    pub head: Option<usize>,
    /// Character span in the document.
    pub span: Span,
    /// Statistical tagger output, if the parser ran one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ner: Option<BioTag>,
}

impl Token {
    /// Finite verb or auxiliary.
    #[must_use]
    pub fn is_finite_verb(&self) -> bool {
        self.pos.is_verbal() && self.morph.verb_form == Some(VerbForm::Fin)
    }

    /// Lower-cased surface form.
    #[must_use]
    pub fn lower(&self) -> String {
        self.text.to_lowercase()
    }

    /// Starts with an uppercase letter.
    #[must_use]
    pub fn is_capitalized(&self) -> bool {
        self.text.chars().next().is_some_and(char::is_uppercase)
    }
}

/// A sentence of annotated tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Global ordinal of the sentence in the document.
    pub index: usize,
    /// Global ordinal of the paragraph containing the sentence.
    pub paragraph: usize,
    /// Chapter number (as written in the manuscript, usually 1-based).
    pub chapter: u32,
    pub tokens: Vec<Token>,
    pub span: Span,
}

impl Sentence {
    /// Indices of the direct dependents of token `i`.
    pub fn children(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.tokens
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.head == Some(i))
            .map(|(j, _)| j)
    }

    /// First dependent of `i` whose relation satisfies `pred`.
    pub fn child_where(&self, i: usize, pred: impl Fn(DepRel) -> bool) -> Option<usize> {
        self.children(i).find(|&j| pred(self.tokens[j].dep))
    }

    /// Index of the root token.
    #[must_use]
    pub fn root(&self) -> Option<usize> {
        self.tokens.iter().position(|t| t.head.is_none())
    }

    /// Index of the token covering character offset `offset`.
    #[must_use]
    pub fn token_at(&self, offset: usize) -> Option<usize> {
        self.tokens
            .iter()
            .position(|t| t.span.start <= offset && offset < t.span.end)
    }

    /// Indices of tokens lying inside `span`.
    #[must_use]
    pub fn tokens_in(&self, span: Span) -> Range<usize> {
        let first = self
            .tokens
            .iter()
            .position(|t| t.span.end > span.start)
            .unwrap_or(self.tokens.len());
        let last = self
            .tokens
            .iter()
            .rposition(|t| t.span.start < span.end)
            .map_or(first, |i| i + 1);
        first..last.max(first)
    }

    /// Syntactic head of a token range: the token whose head lies outside the
    /// range (the first such token when there are several).
    #[must_use]
    pub fn head_of(&self, range: Range<usize>) -> Option<usize> {
        range.clone().find(|&i| match self.tokens[i].head {
            Some(h) => !range.contains(&h),
            None => true,
        })
    }

    /// Walk up the head chain from `i`, yielding each ancestor once.
    pub fn ancestors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let mut current = self.tokens.get(i).and_then(|t| t.head);
        let mut steps = 0;
        std::iter::from_fn(move || {
            let next = current?;
            steps += 1;
            if steps > self.tokens.len() {
                return None;
            }
            current = self.tokens.get(next).and_then(|t| t.head);
            Some(next)
        })
    }
}

/// A chapter: a contiguous range of sentences plus optional story time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    /// Range into [`Document::sentences`].
    pub sentences: Range<usize>,
    /// Story time elapsed at the start of the chapter, in years, when the
    /// external temporal analysis supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_years: Option<f64>,
}

/// A whole annotated manuscript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub sentences: Vec<Sentence>,
    pub chapters: Vec<Chapter>,
    #[serde(skip)]
    char_to_byte: Vec<usize>,
}

impl Document {
    /// Assemble a document. Sentence `index` fields are renumbered to match
    /// their position, and chapters must tile the sentence list in order.
    pub fn new(
        text: String,
        mut sentences: Vec<Sentence>,
        chapters: Vec<Chapter>,
    ) -> crate::Result<Self> {
        for (i, s) in sentences.iter_mut().enumerate() {
            s.index = i;
        }
        let mut expected = 0;
        for ch in &chapters {
            if ch.sentences.start != expected || ch.sentences.end < ch.sentences.start {
                return Err(crate::Error::invalid_input(format!(
                    "chapter {} covers sentences {:?}, expected to start at {}",
                    ch.number, ch.sentences, expected
                )));
            }
            expected = ch.sentences.end;
        }
        if expected != sentences.len() {
            return Err(crate::Error::invalid_input(format!(
                "chapters cover {} sentences but document has {}",
                expected,
                sentences.len()
            )));
        }
        let char_count = text.chars().count();
        for s in &sentences {
            for t in &s.tokens {
                if t.span.end > char_count {
                    return Err(crate::Error::invalid_input(format!(
                        "token '{}' at {} lies outside the text ({} chars)",
                        t.text, t.span, char_count
                    )));
                }
            }
        }
        let char_to_byte = Self::index_chars(&text);
        Ok(Self {
            text,
            sentences,
            chapters,
            char_to_byte,
        })
    }

    fn index_chars(text: &str) -> Vec<usize> {
        let mut offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        offsets.push(text.len());
        offsets
    }

    /// Rebuild the char index after deserialization.
    pub fn reindex(&mut self) {
        self.char_to_byte = Self::index_chars(&self.text);
    }

    /// Text covered by `span` (clamped to the document).
    #[must_use]
    pub fn slice(&self, span: Span) -> &str {
        if self.char_to_byte.is_empty() {
            return "";
        }
        let last = self.char_to_byte.len() - 1;
        let start = self.char_to_byte[span.start.min(last)];
        let end = self.char_to_byte[span.end.min(last)];
        &self.text[start..end]
    }

    /// Sentence by global index.
    #[must_use]
    pub fn sentence(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    /// Sentences of a chapter.
    #[must_use]
    pub fn chapter_sentences(&self, chapter: &Chapter) -> &[Sentence] {
        &self.sentences[chapter.sentences.clone()]
    }

    /// Chapter by number.
    #[must_use]
    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    /// Span covering all sentences of a paragraph.
    #[must_use]
    pub fn paragraph_span(&self, paragraph: usize) -> Option<Span> {
        let mut iter = self.sentences.iter().filter(|s| s.paragraph == paragraph);
        let first = iter.next()?;
        let span = iter.fold(first.span, |acc, s| acc.cover(&s.span));
        Some(span)
    }

    /// Total number of tokens.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.tokens.len()).sum()
    }

    /// True if there is nothing to analyse.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_ops() {
        let a = Span::new(0, 5);
        let b = Span::new(3, 8);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&Span::new(5, 9)));
        assert_eq!(a.cover(&b), Span::new(0, 8));
        assert!(Span::new(0, 10).contains(&b));
        assert_eq!(Span::new(4, 2).len(), 0);
    }

    #[test]
    fn test_morph_parse() {
        let m = Morph::parse("Gender=Fem|Number=Sing|Person=3|VerbForm=Fin|Mood=Sub");
        assert_eq!(m.gender, Some(Gender::Fem));
        assert_eq!(m.number, Some(Number::Sing));
        assert_eq!(m.person, Some(Person::Third));
        assert_eq!(m.mood, Some(Mood::Sub));
        assert_eq!(m.verb_form, Some(VerbForm::Fin));
        assert_eq!(Morph::parse("_"), Morph::default());
    }

    #[test]
    fn test_deprel_subtypes() {
        assert_eq!("acl:relcl".parse::<DepRel>().unwrap(), DepRel::AclRelcl);
        assert_eq!("obl:agent".parse::<DepRel>().unwrap(), DepRel::Obl);
        assert_eq!("nsubj:pass".parse::<DepRel>().unwrap(), DepRel::NsubjPass);
        assert_eq!("weird".parse::<DepRel>().unwrap(), DepRel::Other);
    }

    #[test]
    fn test_bio_tag() {
        assert_eq!(BioTag::parse("B-PER"), Some(BioTag::Begin(EntityKind::Person)));
        assert_eq!(BioTag::parse("I-LOC"), Some(BioTag::Inside(EntityKind::Location)));
        assert_eq!(BioTag::parse("O"), None);
    }

    #[test]
    fn test_slice_multibyte() {
        let doc = Document::new("María sonrió.".to_string(), vec![], vec![]).unwrap();
        assert_eq!(doc.slice(Span::new(0, 5)), "María");
        assert_eq!(doc.slice(Span::new(6, 12)), "sonrió");
        assert_eq!(doc.slice(Span::new(6, 100)), "sonrió.");
    }
}
