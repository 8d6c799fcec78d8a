//! Reader for parser output in CoNLL-U.
//!
//! Besides the ten standard columns, a few comment lines carry document
//! structure:
//!
//! - `# chapter = N` opens chapter `N` (and a new paragraph)
//! - `# newpar` opens a new paragraph
//! - `# elapsed_years = X` sets the story time at the start of the current chapter
//!
//! The MISC column may carry `NER=B-PER` style tags from a statistical tagger
//! and `SpaceAfter=No`. The document text is rebuilt from the token forms.
//!
//! Columns are tab-separated; lines without tabs are split on whitespace so
//! hand-written fixtures stay readable.

use crate::document::{BioTag, Chapter, DepRel, Document, Morph, Pos, Sentence, Span, Token};
use crate::error::{Error, Result};

struct RawToken {
    form: String,
    lemma: String,
    pos: Pos,
    morph: Morph,
    head: usize,
    dep: DepRel,
    space_after: bool,
    ner: Option<BioTag>,
}

#[derive(Default)]
struct Builder {
    text: String,
    chars: usize,
    sentences: Vec<Sentence>,
    chapters: Vec<Chapter>,
    chapter: Option<(u32, usize, Option<f64>)>,
    paragraph: usize,
    new_paragraph: bool,
    pending: Vec<RawToken>,
    pending_line: usize,
}

impl Builder {
    fn open_chapter(&mut self, number: u32) {
        self.close_chapter();
        self.chapter = Some((number, self.sentences.len(), None));
        self.new_paragraph = true;
    }

    fn close_chapter(&mut self) {
        if let Some((number, start, elapsed)) = self.chapter.take() {
            self.chapters.push(Chapter {
                number,
                sentences: start..self.sentences.len(),
                elapsed_years: elapsed,
            });
        }
    }

    fn flush_sentence(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.chapter.is_none() {
            let next = self.chapters.last().map_or(1, |c| c.number + 1);
            self.chapter = Some((next, self.sentences.len(), None));
            self.new_paragraph = true;
        }
        let chapter = self.chapter.map_or(1, |c| c.0);

        if !self.text.is_empty() {
            let sep = if self.new_paragraph { "\n\n" } else { " " };
            self.text.push_str(sep);
            self.chars += sep.chars().count();
        }
        if self.new_paragraph && !self.sentences.is_empty() {
            self.paragraph += 1;
        }
        self.new_paragraph = false;

        let raw = std::mem::take(&mut self.pending);
        let n = raw.len();
        let mut tokens = Vec::with_capacity(n);
        for (i, t) in raw.into_iter().enumerate() {
            if t.head > n {
                return Err(Error::parse(
                    self.pending_line,
                    format!("token {} '{}' has head {} beyond sentence length {}", i + 1, t.form, t.head, n),
                ));
            }
            let start = self.chars;
            self.text.push_str(&t.form);
            self.chars += t.form.chars().count();
            let span = Span::new(start, self.chars);
            if t.space_after && i + 1 < n {
                self.text.push(' ');
                self.chars += 1;
            }
            tokens.push(Token {
                text: t.form,
                lemma: t.lemma,
                pos: t.pos,
                morph: t.morph,
                dep: t.dep,
                head: if t.head == 0 { None } else { Some(t.head - 1) },
                span,
                ner: t.ner,
            });
        }
        let span = Span::new(
            tokens.first().map_or(self.chars, |t| t.span.start),
            tokens.last().map_or(self.chars, |t| t.span.end),
        );
        self.sentences.push(Sentence {
            index: self.sentences.len(),
            paragraph: self.paragraph,
            chapter,
            tokens,
            span,
        });
        Ok(())
    }

    fn comment(&mut self, line_no: usize, body: &str) -> Result<()> {
        let body = body.trim();
        if body == "newpar" || body.starts_with("newpar ") {
            self.new_paragraph = true;
            return Ok(());
        }
        let Some((key, value)) = body.split_once('=') else {
            return Ok(());
        };
        match key.trim() {
            "chapter" => {
                let number = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| Error::parse(line_no, format!("bad chapter number: {e}")))?;
                self.open_chapter(number);
            }
            "elapsed_years" => {
                let years = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| Error::parse(line_no, format!("bad elapsed_years: {e}")))?;
                if self.chapter.is_none() {
                    let next = self.chapters.last().map_or(1, |c| c.number + 1);
                    self.open_chapter(next);
                }
                if let Some(ch) = self.chapter.as_mut() {
                    ch.2 = Some(years);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn parse_token(line_no: usize, line: &str) -> Result<Option<RawToken>> {
    let cols: Vec<&str> = if line.contains('\t') {
        line.split('\t').collect()
    } else {
        line.split_whitespace().collect()
    };
    if cols.len() < 8 {
        return Err(Error::parse(
            line_no,
            format!("expected 10 columns, found {}", cols.len()),
        ));
    }
    // Multiword ranges (1-2) and empty nodes (1.1) are not syntactic words.
    if cols[0].contains('-') || cols[0].contains('.') {
        return Ok(None);
    }
    let pos = cols[3]
        .parse::<Pos>()
        .map_err(|e| Error::parse(line_no, e))?;
    let head = cols[6]
        .parse::<usize>()
        .map_err(|e| Error::parse(line_no, format!("bad head '{}': {e}", cols[6])))?;
    let dep = cols[7].parse::<DepRel>().unwrap_or_default();
    let misc = cols.get(9).copied().unwrap_or("_");
    let mut space_after = true;
    let mut ner = None;
    for item in misc.split('|') {
        match item.split_once('=') {
            Some(("SpaceAfter", "No")) => space_after = false,
            Some(("NER", tag)) => ner = BioTag::parse(tag),
            _ => {}
        }
    }
    let lemma = if cols[2] == "_" { cols[1] } else { cols[2] };
    Ok(Some(RawToken {
        form: cols[1].to_string(),
        lemma: lemma.to_lowercase(),
        pos,
        morph: Morph::parse(cols[5]),
        head,
        dep,
        space_after,
        ner,
    }))
}

/// Parse a CoNLL-U string into a [`Document`].
pub fn parse_conllu(input: &str) -> Result<Document> {
    let mut b = Builder::default();
    for (i, raw_line) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = raw_line.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            b.flush_sentence()?;
            continue;
        }
        if let Some(body) = trimmed.strip_prefix('#') {
            if !b.pending.is_empty() {
                b.flush_sentence()?;
            }
            b.comment(line_no, body)?;
            continue;
        }
        if b.pending.is_empty() {
            b.pending_line = line_no;
        }
        if let Some(tok) = parse_token(line_no, trimmed)? {
            b.pending.push(tok);
        }
    }
    b.flush_sentence()?;
    b.close_chapter();
    Document::new(b.text, b.sentences, b.chapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Gender;
    use crate::mention::EntityKind;

    const SAMPLE: &str = "\
# chapter = 1
# elapsed_years = 0
1 María María PROPN _ Gender=Fem|Number=Sing 2 nsubj _ NER=B-PER
2 sonrió sonreír VERB _ Mood=Ind|Number=Sing|Person=3|VerbForm=Fin 0 root _ SpaceAfter=No
3 . . PUNCT _ _ 2 punct _ _

1 Llovía llover VERB _ Mood=Ind|Number=Sing|Person=3|VerbForm=Fin 0 root _ SpaceAfter=No
2 . . PUNCT _ _ 1 punct _ _

# chapter = 2
# elapsed_years = 3.5
1 Ella él PRON _ Gender=Fem|Number=Sing|Person=3|PronType=Prs 2 nsubj _ _
2 volvió volver VERB _ Mood=Ind|Number=Sing|Person=3|VerbForm=Fin 0 root _ SpaceAfter=No
3 . . PUNCT _ _ 2 punct _ _
";

    #[test]
    fn test_parse_structure() {
        let doc = parse_conllu(SAMPLE).unwrap();
        assert_eq!(doc.sentences.len(), 3);
        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[0].sentences, 0..2);
        assert_eq!(doc.chapters[1].elapsed_years, Some(3.5));
        assert_eq!(doc.text, "María sonrió. Llovía.\n\nElla volvió.");
        assert_eq!(doc.sentences[2].chapter, 2);
        assert_ne!(doc.sentences[1].paragraph, doc.sentences[2].paragraph);
        assert_eq!(doc.sentences[0].paragraph, doc.sentences[1].paragraph);
    }

    #[test]
    fn test_parse_tokens() {
        let doc = parse_conllu(SAMPLE).unwrap();
        let maria = &doc.sentences[0].tokens[0];
        assert_eq!(maria.head, Some(1));
        assert_eq!(maria.dep, DepRel::Nsubj);
        assert_eq!(maria.morph.gender, Some(Gender::Fem));
        assert_eq!(maria.ner, Some(BioTag::Begin(EntityKind::Person)));
        assert_eq!(doc.slice(maria.span), "María");
        let root = &doc.sentences[0].tokens[1];
        assert_eq!(root.head, None);
        assert!(root.is_finite_verb());
    }

    #[test]
    fn test_bad_head_is_error() {
        let bad = "1 Hola hola INTJ _ _ 7 root _ _\n";
        let err = parse_conllu(bad).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");
    }

    #[test]
    fn test_skips_multiword_ranges() {
        let input = "\
1-2 del _ _ _ _ _ _ _ _
1 de de ADP _ _ 2 case _ _
2 el el DET _ _ 0 root _ _
";
        let doc = parse_conllu(input).unwrap();
        assert_eq!(doc.sentences[0].tokens.len(), 2);
    }
}
