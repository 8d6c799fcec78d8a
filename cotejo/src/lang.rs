//! Spanish lexical tables used by the voters, the scope resolver and the
//! attribute extractors.
//!
//! Tables hold lemmas or lower-cased forms without further normalization;
//! callers pass `Token::lemma` or `Token::lower()`.

use cotejo_core::{AttributeKey, Gender, Number, Person, Sentence, Span};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Features of a personal pronoun form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PronounFeatures {
    pub person: Person,
    pub gender: Option<Gender>,
    pub number: Option<Number>,
}

const fn pf(person: Person, gender: Option<Gender>, number: Option<Number>) -> PronounFeatures {
    PronounFeatures {
        person,
        gender,
        number,
    }
}

static PERSONAL_PRONOUNS: Lazy<HashMap<&'static str, PronounFeatures>> = Lazy::new(|| {
    use Gender::{Fem, Masc};
    use Number::{Plur, Sing};
    use Person::{First, Second, Third};
    [
        ("yo", pf(First, None, Some(Sing))),
        ("me", pf(First, None, Some(Sing))),
        ("mí", pf(First, None, Some(Sing))),
        ("conmigo", pf(First, None, Some(Sing))),
        ("tú", pf(Second, None, Some(Sing))),
        ("te", pf(Second, None, Some(Sing))),
        ("ti", pf(Second, None, Some(Sing))),
        ("contigo", pf(Second, None, Some(Sing))),
        ("él", pf(Third, Some(Masc), Some(Sing))),
        ("ella", pf(Third, Some(Fem), Some(Sing))),
        ("lo", pf(Third, Some(Masc), Some(Sing))),
        ("la", pf(Third, Some(Fem), Some(Sing))),
        ("le", pf(Third, None, Some(Sing))),
        ("nosotros", pf(First, Some(Masc), Some(Plur))),
        ("nosotras", pf(First, Some(Fem), Some(Plur))),
        ("nos", pf(First, None, Some(Plur))),
        ("ellos", pf(Third, Some(Masc), Some(Plur))),
        ("ellas", pf(Third, Some(Fem), Some(Plur))),
        ("los", pf(Third, Some(Masc), Some(Plur))),
        ("las", pf(Third, Some(Fem), Some(Plur))),
        ("les", pf(Third, None, Some(Plur))),
    ]
    .into_iter()
    .collect()
});

static DEMONSTRATIVES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "este", "esta", "estos", "estas", "ese", "esa", "esos", "esas", "aquel", "aquella",
        "aquellos", "aquellas", "éste", "ésta", "ése", "ésa", "aquél", "aquélla",
    ]
    .into_iter()
    .collect()
});

static HUMAN_NOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mujer", "hombre", "chico", "chica", "niño", "niña", "muchacho", "muchacha", "anciano",
        "anciana", "joven", "señor", "señora", "señorita", "madre", "padre", "hermano", "hermana",
        "hijo", "hija", "abuelo", "abuela", "tío", "tía", "desconocido", "desconocida", "viejo",
        "vieja", "soldado", "capitán", "médico", "médica", "doctor", "doctora", "criado", "criada",
        "marido", "esposa", "esposo", "viuda", "viudo", "forastero", "forastera", "profesor",
        "profesora", "inspector", "inspectora", "detective", "rey", "reina", "príncipe",
        "princesa", "cura", "monja",
    ]
    .into_iter()
    .collect()
});

/// Verbs whose subject is animate.
static ANIMATE_SUBJECT_VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "decir", "pensar", "sonreír", "mirar", "hablar", "responder", "contestar", "preguntar",
        "gritar", "susurrar", "murmurar", "llorar", "reír", "suspirar", "asentir", "caminar",
        "correr", "saber", "creer", "querer", "sentir", "amar", "odiar", "escribir", "leer",
        "recordar", "temer", "soñar", "dormir", "despertar", "besar", "abrazar", "saludar",
        "nacer", "morir", "casar", "trabajar", "vivir", "exclamar", "añadir", "observar",
    ]
    .into_iter()
    .collect()
});

/// Verbs whose object is animate.
static ANIMATE_OBJECT_VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "besar", "abrazar", "saludar", "amar", "odiar", "conocer", "visitar", "llamar", "ayudar",
        "matar", "herir", "acompañar", "mirar", "consolar", "despedir", "presentar", "contratar",
        "casar", "acusar", "perdonar",
    ]
    .into_iter()
    .collect()
});

/// Verbs that take no subject at all.
static IMPERSONAL_VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "llover", "nevar", "granizar", "tronar", "relampaguear", "amanecer", "anochecer",
        "atardecer", "lloviznar", "haber",
    ]
    .into_iter()
    .collect()
});

/// Common given names and surnames used to justify MISC to PERSON promotion.
static PERSON_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "maría", "josé", "juan", "pedro", "isabel", "ana", "carmen", "lucía", "antonio",
        "manuel", "francisco", "javier", "laura", "elena", "pablo", "rosa", "teresa", "luis",
        "miguel", "carlos", "marta", "sofía", "diego", "alba", "andrés", "beatriz", "fernando",
        "garcía", "sánchez", "lópez", "martínez", "gonzález", "rodríguez", "fernández", "pérez",
        "gómez", "ruiz", "díaz", "moreno", "álvarez", "romero", "navarro", "torres",
    ]
    .into_iter()
    .collect()
});

/// Abbreviations after which a sentence splitter often breaks by mistake.
static ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "sr.", "sra.", "srta.", "dr.", "dra.", "d.", "dña.", "lic.", "ing.", "prof.", "st.",
        "sto.", "sta.", "fr.", "mons.", "gral.", "cap.", "tte.", "av.", "c.", "núm.", "etc.",
    ]
    .into_iter()
    .collect()
});

/// Head nouns of body parts mapped to the attribute they carry colour or shape for.
static BODY_PARTS: Lazy<HashMap<&'static str, AttributeKey>> = Lazy::new(|| {
    [
        ("ojo", AttributeKey::EyeColor),
        ("mirada", AttributeKey::EyeColor),
        ("iris", AttributeKey::EyeColor),
        ("pelo", AttributeKey::HairColor),
        ("cabello", AttributeKey::HairColor),
        ("melena", AttributeKey::HairColor),
        ("cabellera", AttributeKey::HairColor),
        ("pelambrera", AttributeKey::HairColor),
        ("barba", AttributeKey::FacialHair),
        ("bigote", AttributeKey::FacialHair),
        ("perilla", AttributeKey::FacialHair),
        ("piel", AttributeKey::Skin),
        ("tez", AttributeKey::Skin),
        ("cutis", AttributeKey::Skin),
        ("cicatriz", AttributeKey::DistinctiveFeature),
        ("lunar", AttributeKey::DistinctiveFeature),
        ("tatuaje", AttributeKey::DistinctiveFeature),
        ("nariz", AttributeKey::DistinctiveFeature),
        ("mancha", AttributeKey::DistinctiveFeature),
    ]
    .into_iter()
    .collect()
});

/// Adjectives describing a passing state when used with "estar".
static STATE_ADJECTIVES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "nervioso", "cansado", "triste", "contento", "enfadado", "preocupado", "asustado",
        "feliz", "tranquilo", "furioso", "alegre", "harto", "agotado", "aburrido", "inquieto",
        "molesto", "sorprendido", "enojado", "ansioso",
    ]
    .into_iter()
    .collect()
});

/// Negation adverbs.
static NEGATIONS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["no", "nunca", "jamás", "tampoco", "ni"].into_iter().collect());

static NUMBER_WORDS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    [
        ("uno", 1),
        ("un", 1),
        ("una", 1),
        ("dos", 2),
        ("tres", 3),
        ("cuatro", 4),
        ("cinco", 5),
        ("seis", 6),
        ("siete", 7),
        ("ocho", 8),
        ("nueve", 9),
        ("diez", 10),
        ("once", 11),
        ("doce", 12),
        ("trece", 13),
        ("catorce", 14),
        ("quince", 15),
        ("dieciséis", 16),
        ("diecisiete", 17),
        ("dieciocho", 18),
        ("diecinueve", 19),
        ("veinte", 20),
        ("veintiuno", 21),
        ("veintiún", 21),
        ("veintidós", 22),
        ("veintitrés", 23),
        ("veinticuatro", 24),
        ("veinticinco", 25),
        ("veintiséis", 26),
        ("veintisiete", 27),
        ("veintiocho", 28),
        ("veintinueve", 29),
        ("treinta", 30),
        ("cuarenta", 40),
        ("cincuenta", 50),
        ("sesenta", 60),
        ("setenta", 70),
        ("ochenta", 80),
        ("noventa", 90),
        ("cien", 100),
    ]
    .into_iter()
    .collect()
});

/// Features of a personal pronoun, by lower-cased form.
#[must_use]
pub fn personal_pronoun(form: &str) -> Option<PronounFeatures> {
    PERSONAL_PRONOUNS.get(form).copied()
}

/// Demonstrative determiner or pronoun.
#[must_use]
pub fn is_demonstrative(form: &str) -> bool {
    DEMONSTRATIVES.contains(form)
}

/// Noun that denotes a person ("la mujer", "el capitán").
#[must_use]
pub fn is_human_noun(lemma: &str) -> bool {
    HUMAN_NOUNS.contains(lemma)
}

/// Verb selecting an animate subject.
#[must_use]
pub fn selects_animate_subject(lemma: &str) -> bool {
    ANIMATE_SUBJECT_VERBS.contains(lemma)
}

/// Verb selecting an animate object.
#[must_use]
pub fn selects_animate_object(lemma: &str) -> bool {
    ANIMATE_OBJECT_VERBS.contains(lemma)
}

/// Weather and existential verbs without a subject.
#[must_use]
pub fn is_impersonal(lemma: &str) -> bool {
    IMPERSONAL_VERBS.contains(lemma)
}

/// Every word of `surface` is a known personal name (particles allowed).
#[must_use]
pub fn is_person_name(surface: &str) -> bool {
    let mut any = false;
    for word in surface.split_whitespace() {
        let w = word.to_lowercase();
        if matches!(w.as_str(), "de" | "del" | "la" | "y") {
            continue;
        }
        if !PERSON_NAMES.contains(w.as_str()) {
            return false;
        }
        any = true;
    }
    any
}

/// Token text that ends a false sentence break: a known abbreviation or a
/// single-letter initial ("J.").
#[must_use]
pub fn is_abbreviation(text: &str) -> bool {
    let lower = text.to_lowercase();
    if ABBREVIATIONS.contains(lower.as_str()) {
        return true;
    }
    let mut chars = text.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_alphabetic()
    )
}

/// Attribute a body-part noun carries.
#[must_use]
pub fn body_part(lemma: &str) -> Option<AttributeKey> {
    BODY_PARTS.get(lemma).copied()
}

/// Adjective describing a transient state.
#[must_use]
pub fn is_state_adjective(lemma: &str) -> bool {
    STATE_ADJECTIVES.contains(lemma)
}

/// Negation adverb.
#[must_use]
pub fn is_negation(form: &str) -> bool {
    NEGATIONS.contains(form)
}

/// Parse digits or Spanish number words ("treinta y cinco").
#[must_use]
pub fn parse_number(text: &str) -> Option<u32> {
    let t = text.trim().to_lowercase();
    if let Ok(n) = t.parse::<u32>() {
        return Some(n);
    }
    let mut total = 0;
    let mut seen = false;
    for word in t.split_whitespace() {
        if word == "y" {
            continue;
        }
        total += NUMBER_WORDS.get(word)?;
        seen = true;
    }
    seen.then_some(total)
}

/// Char spans of whole-word occurrences of `needle` in `haystack`.
#[must_use]
pub fn find_words(haystack: &str, needle: &str) -> Vec<Span> {
    if needle.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (byte, _) in haystack.match_indices(needle) {
        let before = haystack[..byte].chars().next_back();
        let after = haystack[byte + needle.len()..].chars().next();
        if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
            continue;
        }
        let start = haystack[..byte].chars().count();
        out.push(Span::new(start, start + needle.chars().count()));
    }
    out
}

/// Per-token flag: inside direct speech.
///
/// Quotes (« » “ ” ") toggle speech; an em dash at the start of a sentence
/// opens it and a later em dash hands the floor back to the narrator.
#[must_use]
pub fn dialogue_mask(sentence: &Sentence) -> Vec<bool> {
    let mut mask = Vec::with_capacity(sentence.tokens.len());
    let mut inside = false;
    for (i, t) in sentence.tokens.iter().enumerate() {
        match t.text.as_str() {
            "«" | "“" => {
                inside = true;
                mask.push(true);
            }
            "»" | "”" => {
                mask.push(true);
                inside = false;
            }
            "\"" => {
                inside = !inside;
                mask.push(true);
            }
            "—" | "―" => {
                inside = i == 0 || !inside;
                mask.push(true);
            }
            _ => mask.push(inside),
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pronouns() {
        let ella = personal_pronoun("ella").unwrap();
        assert_eq!(ella.gender, Some(Gender::Fem));
        assert_eq!(ella.person, Person::Third);
        assert!(personal_pronoun("se").is_none());
    }

    #[test]
    fn test_abbreviations() {
        assert!(is_abbreviation("Sr."));
        assert!(is_abbreviation("J."));
        assert!(!is_abbreviation("casa."));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("35"), Some(35));
        assert_eq!(parse_number("treinta y cinco"), Some(35));
        assert_eq!(parse_number("veinte"), Some(20));
        assert_eq!(parse_number("muchos"), None);
    }

    #[test]
    fn test_person_names() {
        assert!(is_person_name("María Sánchez"));
        assert!(is_person_name("García"));
        assert!(!is_person_name("Taberna García"));
    }
}
