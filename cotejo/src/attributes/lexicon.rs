//! Attribute vocabularies and value normalization.

use crate::lang;
use cotejo_core::AttributeKey;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Colour lemmas shared by eyes and hair.
pub static COLORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "azul", "verde", "marrón", "castaño", "negro", "gris", "miel", "avellana", "ámbar",
        "violeta", "dorado", "plateado", "rubio", "pelirrojo", "canoso", "cana", "blanco",
        "rojo", "cobrizo", "azabache", "moreno", "pardo",
    ]
    .into_iter()
    .collect()
});

/// Colour words that only modify a shade ("azul oscuro").
static SHADES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["oscuro", "claro", "intenso", "pálido", "profundo", "vivo", "apagado", "brillante"]
        .into_iter()
        .collect()
});

static HAIR_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "liso", "rizado", "ondulado", "encrespado", "lacio", "largo", "corto", "rapado", "calvo",
        "recogido", "suelto", "trenzado",
    ]
    .into_iter()
    .collect()
});

static HEIGHT: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["alto", "bajo", "bajito", "altísimo", "menudo", "chico"]
        .into_iter()
        .collect()
});

static BUILD: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "delgado", "corpulento", "esbelto", "robusto", "musculoso", "gordo", "flaco", "atlético",
        "enclenque", "fornido", "obeso", "rollizo", "rechoncho", "escuálido", "enjuto",
        "delgadísimo",
    ]
    .into_iter()
    .collect()
});

static SKIN: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["pálido", "bronceado", "moreno", "blanco", "pecoso", "cetrino", "curtido", "sonrosado"]
        .into_iter()
        .collect()
});

static FACIAL_HAIR: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "espeso", "poblado", "cerrado", "fino", "ralo", "escaso", "incipiente", "canoso", "gris",
        "blanco", "recortado", "tupido", "largo", "corto", "cuidado", "descuidado", "negro",
        "rojizo", "rubio", "entrecano",
    ]
    .into_iter()
    .collect()
});

pub static PERSONALITY: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "amable", "cruel", "tímido", "extrovertido", "introvertido", "valiente", "cobarde", "leal",
        "traidor", "honesto", "mentiroso", "generoso", "tacaño", "paciente", "impaciente",
        "orgulloso", "humilde", "arrogante", "sabio", "ingenuo", "astuto", "torpe", "bondadoso",
        "malvado", "sincero", "reservado", "sociable", "alegre", "huraño", "despiadado",
    ]
    .into_iter()
    .collect()
});

static PROFESSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "médico", "abogado", "maestro", "profesor", "carpintero", "herrero", "panadero", "soldado",
        "capitán", "sacerdote", "cura", "enfermero", "escritor", "pintor", "marinero", "pescador",
        "campesino", "labrador", "comerciante", "tendero", "juez", "policía", "guardia", "criado",
        "cocinero", "costurero", "modista", "boticario", "notario", "alcalde", "ingeniero",
        "periodista", "músico", "actor", "zapatero", "sastre", "pastor", "minero", "obrero",
    ]
    .into_iter()
    .collect()
});

static NATIONALITIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "español", "francés", "inglés", "alemán", "italiano", "portugués", "mexicano", "argentino",
        "chileno", "colombiano", "peruano", "cubano", "venezolano", "andaluz", "gallego",
        "catalán", "vasco", "castellano", "irlandés", "ruso", "chino", "japonés", "americano",
        "norteamericano", "marroquí", "griego", "holandés", "belga", "suizo", "austriaco",
    ]
    .into_iter()
    .collect()
});

/// Age descriptors and the age range (years) they stand for.
pub static AGE_RANGES: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    [
        ("bebé", (0.0, 2.0)),
        ("niño", (0.0, 12.0)),
        ("adolescente", (13.0, 17.0)),
        ("joven", (15.0, 30.0)),
        ("veinteañero", (20.0, 29.0)),
        ("treintañero", (30.0, 39.0)),
        ("cuarentón", (40.0, 49.0)),
        ("cincuentón", (50.0, 59.0)),
        ("mediana edad", (40.0, 55.0)),
        ("maduro", (40.0, 60.0)),
        ("mayor", (55.0, 80.0)),
        ("sexagenario", (60.0, 69.0)),
        ("septuagenario", (70.0, 79.0)),
        ("octogenario", (80.0, 89.0)),
        ("nonagenario", (90.0, 99.0)),
        ("viejo", (60.0, 99.0)),
        ("anciano", (65.0, 99.0)),
    ]
    .into_iter()
    .collect()
});

/// Height descriptors and the range (metres) they stand for.
pub static HEIGHT_RANGES: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    [
        ("bajito", (1.40, 1.60)),
        ("bajo", (1.40, 1.65)),
        ("menudo", (1.40, 1.65)),
        ("chico", (1.40, 1.65)),
        ("alto", (1.75, 2.00)),
        ("altísimo", (1.90, 2.20)),
    ]
    .into_iter()
    .collect()
});

/// Irregular or ambiguous forms that suffix stripping gets wrong.
static LEMMAS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("azules", "azul"),
        ("grises", "gris"),
        ("marrones", "marrón"),
        ("canas", "cana"),
        ("canosa", "canoso"),
        ("canosos", "canoso"),
        ("canosas", "canoso"),
        ("franceses", "francés"),
        ("francesa", "francés"),
        ("inglesa", "inglés"),
        ("ingleses", "inglés"),
        ("alemana", "alemán"),
        ("alemanes", "alemán"),
        ("portuguesa", "portugués"),
        ("japonesa", "japonés"),
        ("irlandesa", "irlandés"),
        ("holandesa", "holandés"),
        ("catalana", "catalán"),
        ("andaluza", "andaluz"),
        ("cuarentona", "cuarentón"),
        ("cincuentona", "cincuentón"),
        ("capitana", "capitán"),
        ("jóvenes", "joven"),
        ("mayores", "mayor"),
        ("niña", "niño"),
        ("amables", "amable"),
        ("valientes", "valiente"),
        ("cobardes", "cobarde"),
        ("bebés", "bebé"),
    ]
    .into_iter()
    .collect()
});

fn known(word: &str) -> bool {
    COLORS.contains(word)
        || HAIR_TYPES.contains(word)
        || HEIGHT.contains(word)
        || BUILD.contains(word)
        || SKIN.contains(word)
        || FACIAL_HAIR.contains(word)
        || PERSONALITY.contains(word)
        || PROFESSIONS.contains(word)
        || NATIONALITIES.contains(word)
        || AGE_RANGES.contains_key(word)
}

/// Base form of a single adjective or noun: lower case, masculine singular.
#[must_use]
pub fn lemma(word: &str) -> String {
    let w = word.trim().to_lowercase();
    if let Some(l) = LEMMAS.get(w.as_str()) {
        return (*l).to_string();
    }
    if known(&w) {
        return w;
    }
    let mut candidates = Vec::new();
    for (suffix, repl) in [("as", "o"), ("os", "o"), ("a", "o"), ("es", ""), ("s", "")] {
        if let Some(stem) = w.strip_suffix(suffix) {
            candidates.push(format!("{stem}{repl}"));
        }
    }
    candidates
        .into_iter()
        .find(|c| known(c))
        .unwrap_or(w)
}

/// Canonical value: lemmatized words without shade modifiers or fillers.
///
/// "Azules oscuros" and "azul" both normalize to "azul".
#[must_use]
pub fn normalize_value(key: AttributeKey, raw: &str) -> String {
    match key {
        AttributeKey::Age => {
            if let Some(n) = lang::parse_number(raw) {
                return n.to_string();
            }
        }
        AttributeKey::Height => {
            let metric = raw.trim().replace(',', ".");
            if metric.parse::<f64>().is_ok() {
                return metric;
            }
        }
        _ => {}
    }
    let words: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric() && c != '.' && c != ',')
        .filter(|w| !w.is_empty())
        .map(lemma)
        .filter(|w| !matches!(w.as_str(), "de" | "color" | "un" | "una" | "muy" | "y" | "el" | "la"))
        .collect();
    let colour = matches!(key, AttributeKey::EyeColor | AttributeKey::HairColor);
    let kept: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| !(colour && words.len() > 1 && SHADES.contains(w)))
        .collect();
    kept.join(" ")
}

/// Attribute key for a predicate lemma, when the vocabulary names one.
///
/// Colour words are ambiguous without a body part, so they are not
/// classified here except "rubio", "pelirrojo" and "canoso" which only
/// describe hair.
#[must_use]
pub fn classify(lemma: &str) -> Option<AttributeKey> {
    if matches!(lemma, "rubio" | "pelirrojo" | "canoso") {
        Some(AttributeKey::HairColor)
    } else if HEIGHT.contains(lemma) {
        Some(AttributeKey::Height)
    } else if BUILD.contains(lemma) {
        Some(AttributeKey::Build)
    } else if PERSONALITY.contains(lemma) {
        Some(AttributeKey::Personality)
    } else if PROFESSIONS.contains(lemma) {
        Some(AttributeKey::Profession)
    } else if NATIONALITIES.contains(lemma) {
        Some(AttributeKey::Nationality)
    } else if AGE_RANGES.contains_key(lemma) {
        Some(AttributeKey::Age)
    } else {
        None
    }
}

/// True if `lemma` is a plausible value for a body-part key.
#[must_use]
pub fn fits_body_part(key: AttributeKey, lemma: &str) -> bool {
    match key {
        AttributeKey::EyeColor => COLORS.contains(lemma),
        AttributeKey::HairColor => COLORS.contains(lemma) || HAIR_TYPES.contains(lemma),
        AttributeKey::FacialHair => FACIAL_HAIR.contains(lemma),
        AttributeKey::Skin => SKIN.contains(lemma) || COLORS.contains(lemma),
        AttributeKey::DistinctiveFeature => true,
        _ => false,
    }
}

/// Hair descriptors are split between colour and type.
#[must_use]
pub fn hair_key(lemma: &str) -> AttributeKey {
    if HAIR_TYPES.contains(lemma) && !COLORS.contains(lemma) {
        AttributeKey::HairType
    } else {
        AttributeKey::HairColor
    }
}

/// Shade modifier ("oscuro", "claro").
#[must_use]
pub fn is_shade(lemma: &str) -> bool {
    SHADES.contains(lemma)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lemma_strips_gender_and_number() {
        assert_eq!(lemma("Verdes"), "verde");
        assert_eq!(lemma("azules"), "azul");
        assert_eq!(lemma("rubia"), "rubio");
        assert_eq!(lemma("altas"), "alto");
        assert_eq!(lemma("francesa"), "francés");
    }

    #[test]
    fn test_shade_is_ignored_for_colours() {
        assert_eq!(normalize_value(AttributeKey::EyeColor, "azul oscuro"), "azul");
        assert_eq!(normalize_value(AttributeKey::EyeColor, "azules"), "azul");
        assert_eq!(normalize_value(AttributeKey::Build, "muy delgada"), "delgado");
        assert_eq!(normalize_value(AttributeKey::Age, "treinta y dos"), "32");
        assert_eq!(normalize_value(AttributeKey::Height, "1,80"), "1.80");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("alto"), Some(AttributeKey::Height));
        assert_eq!(classify("médico"), Some(AttributeKey::Profession));
        assert_eq!(classify("rubio"), Some(AttributeKey::HairColor));
        assert_eq!(classify("azul"), None);
        assert_eq!(hair_key("rizado"), AttributeKey::HairType);
        assert_eq!(hair_key("negro"), AttributeKey::HairColor);
    }
}
