//! Binding attribute tokens to the entity they describe.
//!
//! The resolver follows the dependency tree of the sentence holding the
//! attribute; only when the tree names no subject does it look back through
//! a few earlier sentences of the same paragraph for the nearest entity that
//! agrees in gender and number. Character distance is used only as a hard cap
//! on how far a binding may reach, never as evidence.
//!
//! In-sentence patterns, in order:
//!
//! | Pattern | Example | Source |
//! |---------|---------|--------|
//! | genitive owner | "los ojos azules de Pedro" | [`AssignmentSource::Genitive`] |
//! | possessive owner | "sus ojos eran azules" | [`AssignmentSource::Genitive`] |
//! | appositive / relative clause head | "María, que era rubia," | [`AssignmentSource::Appositive`] |
//! | clause subject (overt or dropped) | "Ana era alta", "Ø tenía ojos verdes" | [`AssignmentSource::Subject`] |

use crate::lang;
use cotejo_core::{
    AssignmentSource, DepRel, Document, EntityId, EntityKind, EntityStore, Gender, Mention,
    MentionId, Number, Pos, Sentence, Span,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scope resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Hard cap, in characters, on the span between an attribute and the
    /// mention it is bound to.
    pub max_chars: usize,
    /// Preceding sentences searched when the sentence itself names no subject.
    pub lookback_sentences: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            lookback_sentences: 3,
        }
    }
}

/// Agreement features carried by an attribute word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Agreement {
    pub gender: Option<Gender>,
    pub number: Option<Number>,
}

impl Agreement {
    /// True unless a feature is explicitly different on both sides.
    #[must_use]
    pub fn accepts(&self, gender: Option<Gender>, number: Option<Number>) -> bool {
        let g = !matches!((self.gender, gender), (Some(a), Some(b)) if a != b);
        let n = !matches!((self.number, number), (Some(a), Some(b)) if a != b);
        g && n
    }
}

/// Where an attribute was bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub entity: EntityId,
    pub mention: MentionId,
    pub source: AssignmentSource,
    /// Span from the bound mention to the attribute.
    pub scope: Span,
}

#[derive(Debug, Clone)]
struct Located {
    mention: MentionId,
    entity: EntityId,
    span: Span,
    gender: Option<Gender>,
    number: Option<Number>,
}

/// Outcome of the in-sentence search.
enum Local {
    Bound(Binding),
    /// The sentence names a subject that is not an agreeing entity.
    Blocked,
    /// The sentence names no subject; look back.
    Open,
}

/// Dependency-based attribute binder over one document and its entities.
pub struct ScopeResolver<'a> {
    doc: &'a Document,
    config: ScopeConfig,
    /// Person mentions per sentence, in text order.
    by_sentence: HashMap<usize, Vec<Located>>,
}

impl<'a> ScopeResolver<'a> {
    /// Index the person mentions that belong to a live entity.
    #[must_use]
    pub fn new(doc: &'a Document, mentions: &[Mention], store: &EntityStore, config: ScopeConfig) -> Self {
        let mut by_sentence: HashMap<usize, Vec<Located>> = HashMap::new();
        for m in mentions {
            let Some(id) = store.entity_of_mention(m.id) else {
                continue;
            };
            let Some(entity) = store.get(id) else {
                continue;
            };
            if !entity.kind.compatible(EntityKind::Person) {
                continue;
            }
            by_sentence.entry(m.sentence).or_default().push(Located {
                mention: m.id,
                entity: id,
                span: m.span,
                gender: entity.gender.or(m.gender),
                number: entity.number.or(m.number),
            });
        }
        for list in by_sentence.values_mut() {
            list.sort_by_key(|l| (l.span.start, std::cmp::Reverse(l.span.end)));
        }
        Self {
            doc,
            config,
            by_sentence,
        }
    }

    /// Settings in use.
    #[must_use]
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Bind the attribute word at `token` of sentence `sentence`.
    ///
    /// Returns `None` when no entity is reachable within the cap or none
    /// agrees with the attribute's gender and number.
    #[must_use]
    pub fn resolve(&self, sentence: usize, token: usize) -> Option<Binding> {
        let s = self.doc.sentence(sentence)?;
        let attr = s.tokens.get(token)?;
        let agreement = agreement_of(s, token);

        match self.in_sentence(s, token, agreement) {
            Local::Bound(b) => Some(b),
            Local::Blocked => None,
            Local::Open => self.backward(s, attr.span, agreement),
        }
    }

    fn in_sentence(&self, s: &Sentence, token: usize, agreement: Agreement) -> Local {
        let tok = &s.tokens[token];
        let attr = tok.span;

        // The noun the attribute describes, when it describes a noun directly.
        let described = match tok.dep {
            DepRel::Amod | DepRel::Acl | DepRel::Nmod | DepRel::Appos => tok.head,
            _ => None,
        };
        if let Some(noun) = described {
            if lang::body_part(&s.tokens[noun].lemma).is_some() {
                // "los ojos azules de Pedro", "sus ojos", "tenía los ojos verdes".
                return match self.owner_of(s, noun, attr, agreement) {
                    Local::Open => self.clause_subject(s, noun, attr, agreement),
                    found => found,
                };
            }
            // "María, rubia," or "una mujer rubia": the noun is the subject.
            return self.at_token(s, noun, attr, agreement, AssignmentSource::Appositive);
        }

        // Predicate of a copular clause, or predicative complement.
        if let Some(subj) = s.child_where(token, DepRel::is_subject) {
            let subj_tok = &s.tokens[subj];
            if lang::body_part(&subj_tok.lemma).is_some() {
                return match self.owner_of(s, subj, attr, agreement) {
                    Local::Open => self.clause_subject(s, token, attr, agreement),
                    found => found,
                };
            }
            if subj_tok.lemma == "que" && tok.dep == DepRel::AclRelcl {
                // "María, que era rubia": the relative's antecedent.
                return match tok.head {
                    Some(antecedent) => self.at_token(s, antecedent, attr, agreement, AssignmentSource::Appositive),
                    None => Local::Blocked,
                };
            }
            return self.at_token(s, subj, attr, agreement, AssignmentSource::Subject);
        }

        self.clause_subject(s, token, attr, agreement)
    }

    /// Genitive or possessive owner of a body-part noun.
    fn owner_of(&self, s: &Sentence, noun: usize, attr: Span, agreement: Agreement) -> Local {
        let owner = s.children(noun).find(|&child| {
            let c = &s.tokens[child];
            let genitive = c.dep == DepRel::Nmod
                && s.children(child)
                    .any(|g| s.tokens[g].dep == DepRel::Case && s.tokens[g].lower() == "de");
            let possessive = c.pos == Pos::Det && c.morph.possessive;
            genitive || possessive
        });
        match owner {
            Some(child) => self.at_token(s, child, attr, agreement, AssignmentSource::Genitive),
            None => Local::Open,
        }
    }

    /// Subject of the nearest enclosing clause of `i`, overt or dropped.
    fn clause_subject(&self, s: &Sentence, i: usize, attr: Span, agreement: Agreement) -> Local {
        let mut node = Some(i);
        while let Some(n) = node {
            let tok = &s.tokens[n];
            if let Some(subj) = s.child_where(n, DepRel::is_subject) {
                if subj != i {
                    return self.at_token(s, subj, attr, agreement, AssignmentSource::Subject);
                }
            }
            if tok.is_finite_verb() || s.child_where(n, |d| d == DepRel::Cop).is_some() {
                // A dropped subject is a zero mention on the clause head.
                if self.located_at(s, n).is_some() {
                    return self.at_token(s, n, attr, agreement, AssignmentSource::Subject);
                }
                if tok.dep.opens_clause() {
                    return Local::Open;
                }
            }
            node = tok.head;
        }
        Local::Open
    }

    fn located_at(&self, s: &Sentence, t: usize) -> Option<&Located> {
        let span = s.tokens.get(t)?.span;
        self.by_sentence
            .get(&s.index)?
            .iter()
            .find(|l| l.span.contains(&span))
    }

    /// Bind to the entity mentioned at token `t`. A token that names no
    /// entity, or one that disagrees, blocks the search.
    fn at_token(&self, s: &Sentence, t: usize, attr: Span, agreement: Agreement, source: AssignmentSource) -> Local {
        match self.located_at(s, t).and_then(|l| self.accept(l, attr, agreement, source)) {
            Some(b) => Local::Bound(b),
            None => Local::Blocked,
        }
    }

    fn accept(&self, l: &Located, attr: Span, agreement: Agreement, source: AssignmentSource) -> Option<Binding> {
        let scope = l.span.cover(&attr);
        if scope.len() > self.config.max_chars {
            log::debug!("[scope] {} is {} chars away; over the cap", l.mention, scope.len());
            return None;
        }
        if !agreement.accepts(l.gender, l.number) {
            return None;
        }
        Some(Binding {
            entity: l.entity,
            mention: l.mention,
            source,
            scope,
        })
    }

    /// Nearest agreeing mention before the attribute, in this or up to
    /// `lookback_sentences` earlier sentences of the same paragraph.
    fn backward(&self, s: &Sentence, attr: Span, agreement: Agreement) -> Option<Binding> {
        let first = s.index.saturating_sub(self.config.lookback_sentences);
        for idx in (first..=s.index).rev() {
            let Some(prev) = self.doc.sentence(idx) else {
                continue;
            };
            if prev.paragraph != s.paragraph || prev.chapter != s.chapter {
                break;
            }
            if attr.end.saturating_sub(prev.span.end) > self.config.max_chars && idx != s.index {
                break;
            }
            let Some(list) = self.by_sentence.get(&idx) else {
                continue;
            };
            let found = list
                .iter()
                .rev()
                .filter(|l| l.span.end <= attr.start)
                .find_map(|l| self.accept(l, attr, agreement, AssignmentSource::Inherited));
            if found.is_some() {
                return found;
            }
        }
        None
    }
}

/// Gender and number that the bound entity must agree with.
///
/// Adjectives describing a body part agree with the body part ("ojos
/// azules"), so they constrain nothing about the person.
#[must_use]
pub fn agreement_of(s: &Sentence, token: usize) -> Agreement {
    let Some(tok) = s.tokens.get(token) else {
        return Agreement::default();
    };
    if !matches!(tok.pos, Pos::Adj | Pos::Noun | Pos::Verb) {
        return Agreement::default();
    }
    let governed_by_body = tok
        .head
        .and_then(|h| s.tokens.get(h))
        .is_some_and(|h| lang::body_part(&h.lemma).is_some() && tok.dep != DepRel::Appos);
    let subject_is_body = s
        .child_where(token, DepRel::is_subject)
        .is_some_and(|j| lang::body_part(&s.tokens[j].lemma).is_some());
    if governed_by_body || subject_is_body || lang::body_part(&tok.lemma).is_some() {
        return Agreement::default();
    }
    Agreement {
        gender: tok.morph.gender,
        number: tok.morph.number,
    }
}
