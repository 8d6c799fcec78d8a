//! Candidate anaphora: pronouns, possessives, demonstratives, definite human
//! NPs and dropped subjects.
//!
//! Spanish omits subject pronouns freely ("Ø Sonrió."), so every finite clause
//! without a syntactic subject gets a zero mention on its head before any
//! scoring happens. Features come from the verb (person, number) and, for
//! copular clauses, from the predicate (gender).

use crate::lang;
use cotejo_core::{
    DepRel, Document, EntityKind, Gender, Mention, MentionForm, MentionId, Number, Person, Pos,
    PronType, Sentence, Span, VerbForm,
};

/// Detect anaphora in every sentence, skipping tokens already covered by an
/// anchor mention. Ids are assigned from `first_id` upwards.
#[must_use]
pub fn detect(doc: &Document, anchors: &[Mention], first_id: u32) -> Vec<Mention> {
    let mut out = Vec::new();
    let mut next = first_id;
    for sentence in &doc.sentences {
        let covered: Vec<Span> = anchors
            .iter()
            .filter(|m| m.sentence == sentence.index)
            .map(|m| m.span)
            .collect();
        let dialogue = lang::dialogue_mask(sentence);
        for i in 0..sentence.tokens.len() {
            let tok = &sentence.tokens[i];
            if covered.iter().any(|s| s.overlaps(&tok.span)) {
                continue;
            }
            let Some(found) = classify(sentence, i) else {
                continue;
            };
            if matches!(found.person, Some(Person::First | Person::Second)) && dialogue[i] {
                continue;
            }
            out.push(Mention {
                id: MentionId(next),
                span: found.span,
                text: doc.slice(found.span).to_string(),
                kind: EntityKind::Person,
                form: found.form,
                gender: found.gender,
                number: found.number,
                person: found.person,
                chapter: sentence.chapter,
                sentence: sentence.index,
                paragraph: sentence.paragraph,
                head_token: i,
                provenance: Vec::new(),
                confidence: found.confidence,
            });
            next += 1;
        }
    }
    out
}

struct Found {
    span: Span,
    form: MentionForm,
    gender: Option<Gender>,
    number: Option<Number>,
    person: Option<Person>,
    confidence: f64,
}

fn classify(sentence: &Sentence, i: usize) -> Option<Found> {
    let tok = &sentence.tokens[i];
    let lower = tok.lower();
    match tok.pos {
        Pos::Pron => {
            if let Some(f) = lang::personal_pronoun(&lower) {
                return Some(Found {
                    span: tok.span,
                    form: MentionForm::Pronoun,
                    gender: f.gender.or(tok.morph.gender),
                    number: f.number.or(tok.morph.number),
                    person: Some(f.person),
                    confidence: 0.9,
                });
            }
            if lang::is_demonstrative(&lower) || tok.morph.pron_type == Some(PronType::Demonstrative) {
                return Some(Found {
                    span: tok.span,
                    form: MentionForm::Demonstrative,
                    gender: tok.morph.gender,
                    number: tok.morph.number,
                    person: Some(Person::Third),
                    confidence: 0.6,
                });
            }
            None
        }
        // "su", "sus", "mi": agreement is with the possessed noun, not the owner.
        Pos::Det if tok.morph.possessive => Some(Found {
            span: tok.span,
            form: MentionForm::Possessive,
            gender: None,
            number: None,
            person: tok.morph.person.or(Some(Person::Third)),
            confidence: 0.7,
        }),
        Pos::Noun if lang::is_human_noun(&tok.lemma) => {
            let det = sentence.child_where(i, |d| d == DepRel::Det)?;
            let det_tok = &sentence.tokens[det];
            let demonstrative = lang::is_demonstrative(&det_tok.lower())
                || det_tok.morph.pron_type == Some(PronType::Demonstrative);
            if !demonstrative && !det_tok.morph.definite && !matches!(det_tok.lower().as_str(), "el" | "la" | "los" | "las") {
                return None;
            }
            Some(Found {
                span: det_tok.span.cover(&tok.span),
                form: if demonstrative {
                    MentionForm::Demonstrative
                } else {
                    MentionForm::DefiniteNp
                },
                gender: tok.morph.gender.or(det_tok.morph.gender),
                number: tok.morph.number.or(det_tok.morph.number),
                person: Some(Person::Third),
                confidence: 0.7,
            })
        }
        _ => zero_subject(sentence, i),
    }
}

/// Clause head that needs a dropped subject.
#[must_use]
pub fn is_subjectless_clause(sentence: &Sentence, i: usize) -> bool {
    let tok = &sentence.tokens[i];
    if !(tok.dep.opens_clause() || tok.head.is_none()) || tok.dep == DepRel::AclRelcl {
        return false;
    }
    let cop = sentence.child_where(i, |d| d == DepRel::Cop);
    if !tok.is_finite_verb() && cop.is_none() {
        return false;
    }
    if sentence.child_where(i, DepRel::is_subject).is_some() {
        return false;
    }
    if lang::is_impersonal(&tok.lemma) {
        return false;
    }
    // impersonal or passive "se"
    !sentence
        .children(i)
        .any(|j| sentence.tokens[j].lower() == "se" && sentence.tokens[j].dep == DepRel::Expl)
}

fn zero_subject(sentence: &Sentence, i: usize) -> Option<Found> {
    if !is_subjectless_clause(sentence, i) {
        return None;
    }
    let tok = &sentence.tokens[i];
    let cop = sentence.child_where(i, |d| d == DepRel::Cop);
    let verb = if tok.is_finite_verb() {
        tok
    } else {
        &sentence.tokens[cop?]
    };
    let gender = if cop.is_some() && matches!(tok.pos, Pos::Adj | Pos::Noun) {
        tok.morph.gender
    } else {
        predicate_gender(sentence, i)
    };
    Some(Found {
        span: tok.span,
        form: MentionForm::Zero,
        gender,
        number: verb.morph.number,
        person: verb.morph.person.or(Some(Person::Third)),
        confidence: 0.6,
    })
}

/// Gender carried by a participle or predicative adjective under the verb
/// ("llegó cansada").
fn predicate_gender(sentence: &Sentence, verb: usize) -> Option<Gender> {
    sentence
        .children(verb)
        .filter(|&j| {
            let t = &sentence.tokens[j];
            t.dep == DepRel::Xcomp
                || (t.pos == Pos::Adj && t.dep == DepRel::Advcl)
                || (t.pos.is_verbal() && t.morph.verb_form == Some(VerbForm::Part))
        })
        .find_map(|j| sentence.tokens[j].morph.gender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::parse_conllu;

    fn doc(s: &str) -> Document {
        parse_conllu(s).unwrap()
    }

    #[test]
    fn test_zero_subject_with_predicate_gender() {
        let d = doc("\
1\tEstaba\testar\tAUX\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t2\tcop\t_\t_
2\tcansada\tcansado\tADJ\t_\tGender=Fem|Number=Sing\t0\troot\t_\tSpaceAfter=No
3\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
");
        let found = detect(&d, &[], 0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].form, MentionForm::Zero);
        assert_eq!(found[0].gender, Some(Gender::Fem));
        assert_eq!(found[0].person, Some(Person::Third));
    }

    #[test]
    fn test_impersonal_verbs_get_no_zero() {
        let d = doc("\
1\tLlovía\tllover\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t0\troot\t_\tSpaceAfter=No
2\t.\t.\tPUNCT\t_\t_\t1\tpunct\t_\t_
");
        assert!(detect(&d, &[], 0).is_empty());
    }

    #[test]
    fn test_se_is_not_a_mention_and_impersonal_se_blocks_zero() {
        let d = doc("\
1\tSe\tse\tPRON\t_\tPerson=3\t2\texpl\t_\t_
2\tdice\tdecir\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t0\troot\t_\t_
3\tmucho\tmucho\tPRON\t_\t_\t2\tobj\t_\tSpaceAfter=No
4\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
");
        assert!(detect(&d, &[], 0).is_empty());
    }

    #[test]
    fn test_first_person_inside_dialogue_is_skipped() {
        let d = doc("\
1\t—\t—\tPUNCT\t_\t_\t3\tpunct\t_\tSpaceAfter=No
2\tYo\tyo\tPRON\t_\tNumber=Sing|Person=1|PronType=Prs\t3\tnsubj\t_\t_
3\tvoy\tir\tVERB\t_\tMood=Ind|Number=Sing|Person=1|VerbForm=Fin\t0\troot\t_\t_
4\t—\t—\tPUNCT\t_\t_\t6\tpunct\t_\t_
5\tella\tél\tPRON\t_\tGender=Fem|Number=Sing|Person=3|PronType=Prs\t6\tnsubj\t_\t_
6\tdijo\tdecir\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t3\tparataxis\t_\tSpaceAfter=No
7\t.\t.\tPUNCT\t_\t_\t3\tpunct\t_\t_
");
        let found = detect(&d, &[], 0);
        let texts: Vec<&str> = found.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["ella"]);
    }

    #[test]
    fn test_possessive_and_human_np() {
        let d = doc("\
1\tLa\tel\tDET\t_\tDefinite=Def|Gender=Fem|Number=Sing|PronType=Art\t2\tdet\t_\t_
2\tmujer\tmujer\tNOUN\t_\tGender=Fem|Number=Sing\t3\tnsubj\t_\t_
3\tcerró\tcerrar\tVERB\t_\tMood=Ind|Number=Sing|Person=3|VerbForm=Fin\t0\troot\t_\t_
4\tsus\tsu\tDET\t_\tNumber=Plur|Person=3|Poss=Yes|PronType=Prs\t5\tdet\t_\t_
5\tojos\tojo\tNOUN\t_\tGender=Masc|Number=Plur\t3\tobj\t_\tSpaceAfter=No
6\t.\t.\tPUNCT\t_\t_\t3\tpunct\t_\t_
");
        let found = detect(&d, &[], 10);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "La mujer");
        assert_eq!(found[0].form, MentionForm::DefiniteNp);
        assert_eq!(found[0].id, MentionId(10));
        assert_eq!(found[1].form, MentionForm::Possessive);
        assert_eq!(found[1].gender, None);
    }
}
