//! Negation and modality around an attribute token.
//!
//! Negation is read off the dependency tree; modality combines a few lexical
//! cues before the token with the mood of the governing verb.

use crate::lang;
use cotejo_core::{DepRel, Modality, Mood, Sentence};
use once_cell::sync::Lazy;
use regex::Regex;

/// Comparison or simile markers ("como", "parecía"). Only count when close to
/// the attribute with no punctuation in between.
static METAPHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(como si|como|parec[íi]a|cual|semejante a|si fuera|recordaba a|evocaba|simulaba|aparentemente)\b",
    )
    .expect("valid regex")
});

static PAST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(de (joven|niñ[oa]|pequeñ[oa])|antes de|sol[íi]a (ser|tener)|en (su )?juventud|cuando era (joven|niñ[oa]|pequeñ[oa])|en (la|aquella) época|hace (muchos )?años|en el pasado)\b",
    )
    .expect("valid regex")
});

static CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(si (fuera|tuviera|hubiera)|ser[íi]a|podr[íi]a (ser|tener)|imaginaba? (que|a)|soñaba con (ser|tener)|desear[íi]a|quisiera)\b",
    )
    .expect("valid regex")
});

const METAPHOR_REACH: usize = 20;
const PAST_REACH: usize = 60;
const CONDITIONAL_REACH: usize = 50;

/// True if the token, or the clause it belongs to, is negated.
///
/// Looks for a negative adverb attached to the token or to any ancestor up
/// to the clause root, and for "sin" marking the token directly.
#[must_use]
pub fn is_negated(s: &Sentence, token: usize) -> bool {
    let negates = |i: usize| {
        s.children(i).any(|c| {
            let t = &s.tokens[c];
            let form = t.lower();
            (t.dep == DepRel::Advmod && lang::is_negation(&form)) || (t.dep == DepRel::Case && form == "sin")
        })
    };
    if negates(token) {
        return true;
    }
    for a in s.ancestors(token) {
        if negates(a) {
            return true;
        }
        if s.tokens[a].dep.opens_clause() || s.tokens[a].head.is_none() {
            break;
        }
    }
    false
}

/// Modality of an attribute at `token`.
///
/// Lexical cues are searched in a bounded window of sentence text before the
/// token; a subjunctive or conditional governing verb makes it hypothetical.
#[must_use]
pub fn modality(s: &Sentence, token: usize, sentence_text: &str) -> Modality {
    let tok = &s.tokens[token];
    let offset = tok.span.start.saturating_sub(s.span.start);
    let before: String = sentence_text.chars().take(offset).collect();

    if let Some(m) = last_match(&METAPHOR, &before) {
        let gap: String = before.chars().skip(m).collect();
        if gap.chars().count() <= METAPHOR_REACH && !gap.contains(['.', ';', ':', '!', '?']) {
            return Modality::Metaphorical;
        }
    }
    if window_has(&CONDITIONAL, &before, CONDITIONAL_REACH) || governed_by_irrealis(s, token) {
        return Modality::Hypothetical;
    }
    if window_has(&PAST, &before, PAST_REACH) {
        return Modality::Past;
    }
    Modality::Asserted
}

/// Char offset where the last match of `re` ends in `text`.
fn last_match(re: &Regex, text: &str) -> Option<usize> {
    re.find_iter(text)
        .last()
        .map(|m| text[..m.end()].chars().count())
}

fn window_has(re: &Regex, text: &str, reach: usize) -> bool {
    let n = text.chars().count();
    let tail: String = text.chars().skip(n.saturating_sub(reach)).collect();
    re.is_match(&tail)
}

fn governed_by_irrealis(s: &Sentence, token: usize) -> bool {
    let mood_of = |i: usize| s.tokens[i].morph.mood;
    let mut chain = std::iter::once(token).chain(s.ancestors(token));
    chain.any(|i| {
        matches!(mood_of(i), Some(Mood::Sub | Mood::Cnd))
            || s.child_where(i, |d| d == DepRel::Cop || d == DepRel::Aux)
                .is_some_and(|c| matches!(mood_of(c), Some(Mood::Sub | Mood::Cnd)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotejo_core::parse_conllu;

    fn sentence(conllu: &str) -> (Sentence, String) {
        let doc = parse_conllu(conllu).unwrap();
        let s = doc.sentences[0].clone();
        let text = doc.slice(s.span).to_string();
        (s, text)
    }

    const NEGATED: &str = "\
1\tPedro\tPedro\tPROPN\t_\t_\t4\tnsubj\t_\t_
2\tno\tno\tADV\t_\tPolarity=Neg\t4\tadvmod\t_\t_
3\tera\tser\tAUX\t_\tMood=Ind|VerbForm=Fin\t4\tcop\t_\t_
4\talto\talto\tADJ\t_\tGender=Masc|Number=Sing\t0\troot\t_\tSpaceAfter=No
5\t.\t.\tPUNCT\t_\t_\t4\tpunct\t_\t_
";

    const SIMILE: &str = "\
1\tSus\tsu\tDET\t_\tPoss=Yes\t2\tdet\t_\t_
2\tojos\tojo\tNOUN\t_\tGender=Masc|Number=Plur\t3\tnsubj\t_\t_
3\teran\tser\tAUX\t_\tMood=Ind|VerbForm=Fin\t6\tcop\t_\t_
4\tcomo\tcomo\tADP\t_\t_\t6\tcase\t_\t_
5\tel\tel\tDET\t_\t_\t6\tdet\t_\t_
6\tmar\tmar\tNOUN\t_\t_\t0\troot\t_\t_
7\tazul\tazul\tADJ\t_\t_\t6\tamod\t_\tSpaceAfter=No
8\t.\t.\tPUNCT\t_\t_\t6\tpunct\t_\t_
";

    const SUBJUNCTIVE: &str = "\
1\tOjalá\tojalá\tADV\t_\t_\t3\tadvmod\t_\t_
2\tfuera\tser\tAUX\t_\tMood=Sub|VerbForm=Fin\t3\tcop\t_\t_
3\trubia\trubio\tADJ\t_\tGender=Fem|Number=Sing\t0\troot\t_\tSpaceAfter=No
4\t.\t.\tPUNCT\t_\t_\t3\tpunct\t_\t_
";

    #[test]
    fn test_negation_on_clause() {
        let (s, _) = sentence(NEGATED);
        assert!(is_negated(&s, 3));
    }

    #[test]
    fn test_simile_is_metaphorical() {
        let (s, text) = sentence(SIMILE);
        assert_eq!(modality(&s, 6, &text), Modality::Metaphorical);
    }

    #[test]
    fn test_subjunctive_is_hypothetical() {
        let (s, text) = sentence(SUBJUNCTIVE);
        assert_eq!(modality(&s, 2, &text), Modality::Hypothetical);
    }

    #[test]
    fn test_plain_assertion() {
        let (s, text) = sentence(NEGATED);
        assert_eq!(modality(&s, 3, &text), Modality::Asserted);
    }
}
