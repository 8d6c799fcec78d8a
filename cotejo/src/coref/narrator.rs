//! First-person narrator detection.
//!
//! A narrator who names themself outside dialogue ("Me llamo Lucía", "Soy
//! Lucía") becomes the antecedent of every first-person singular mention
//! outside dialogue.

use crate::lang;
use cotejo_core::{Document, EntityKind, Mention, MentionForm, MentionId, Number, Person};

/// Anchor mention naming the narrator, if any.
#[must_use]
pub fn find_narrator(doc: &Document, anchors: &[Mention]) -> Option<MentionId> {
    for sentence in &doc.sentences {
        let dialogue = lang::dialogue_mask(sentence);
        let toks = &sentence.tokens;
        for i in 0..toks.len() {
            if dialogue[i] {
                continue;
            }
            let lower = toks[i].lower();
            let name_at = if lower == "me" && toks.get(i + 1).is_some_and(|t| t.lemma == "llamar") {
                i + 2
            } else if lower == "soy" {
                i + 1
            } else {
                continue;
            };
            let Some(next) = toks.get(name_at) else {
                continue;
            };
            let named = anchors.iter().find(|m| {
                m.sentence == sentence.index
                    && m.span.start == next.span.start
                    && m.form == MentionForm::Proper
                    && m.kind.compatible(EntityKind::Person)
            });
            if let Some(m) = named {
                log::debug!("[coref] narrator is '{}'", m.text);
                return Some(m.id);
            }
        }
    }
    None
}

/// First-person singular mention that the narrator can claim.
#[must_use]
pub fn is_narrator_reference(m: &Mention) -> bool {
    m.person == Some(Person::First) && m.number != Some(Number::Plur) && m.form.is_anaphoric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::{parse_conllu, Span};

    #[test]
    fn test_me_llamo() {
        let doc = parse_conllu(
            "\
1\tMe\tyo\tPRON\t_\tNumber=Sing|Person=1|PronType=Prs\t2\tobj\t_\t_
2\tllamo\tllamar\tVERB\t_\tMood=Ind|Number=Sing|Person=1|VerbForm=Fin\t0\troot\t_\t_
3\tLucía\tLucía\tPROPN\t_\t_\t2\txcomp\t_\tSpaceAfter=No
4\t.\t.\tPUNCT\t_\t_\t2\tpunct\t_\t_
",
        )
        .unwrap();
        let lucia = Mention {
            id: MentionId(0),
            span: Span::new(9, 14),
            text: "Lucía".into(),
            kind: EntityKind::Person,
            form: MentionForm::Proper,
            gender: None,
            number: None,
            person: Some(Person::Third),
            chapter: 1,
            sentence: 0,
            paragraph: 0,
            head_token: 2,
            provenance: vec![],
            confidence: 0.9,
        };
        assert_eq!(find_narrator(&doc, &[lucia]), Some(MentionId(0)));
        assert_eq!(find_narrator(&doc, &[]), None);
    }
}
