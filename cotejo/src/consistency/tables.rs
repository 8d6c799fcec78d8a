//! Synonym classes and antonym tables for categorical attributes.
//!
//! Values are normalized lemmas (masculine singular, lower case).

use cotejo_core::AttributeKey;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

type Antonyms = HashMap<&'static str, HashSet<&'static str>>;

fn antonyms(pairs: &[(&'static str, &[&'static str])]) -> Antonyms {
    let mut table: Antonyms = HashMap::new();
    for &(word, opposites) in pairs {
        for &o in opposites {
            table.entry(word).or_default().insert(o);
            table.entry(o).or_default().insert(word);
        }
    }
    table
}

fn classes(groups: &[&[&'static str]]) -> HashMap<&'static str, usize> {
    let mut out = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        for w in *group {
            out.insert(*w, i);
        }
    }
    out
}

static COLOR_CLASSES: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    classes(&[
        &["castaño", "marrón", "pardo", "chocolate"],
        &["negro", "azabache", "oscuro", "moreno"],
        &["blanco", "cano", "cana", "canoso", "plateado", "gris", "entrecano"],
        &["rubio", "dorado", "pajizo", "claro"],
        &["rojo", "pelirrojo", "cobrizo", "bermejo", "rojizo"],
        &["miel", "ámbar", "avellana"],
    ])
});

static BUILD_CLASSES: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    classes(&[
        &["delgado", "flaco", "esbelto", "enjuto", "escuálido", "delgadísimo"],
        &["gordo", "obeso", "rollizo", "rechoncho", "corpulento"],
        &["musculoso", "fornido", "atlético", "robusto"],
        &["bajo", "bajito", "menudo", "chico"],
        &["alto", "altísimo"],
    ])
});

static PERSONALITY_CLASSES: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    classes(&[
        &["amable", "bondadoso", "afable", "cordial"],
        &["cruel", "despiadado", "malvado"],
        &["tímido", "reservado", "introvertido"],
        &["extrovertido", "sociable"],
        &["valiente", "audaz", "intrépido"],
        &["honesto", "sincero"],
    ])
});

static COLOR_ANTONYMS: Lazy<Antonyms> = Lazy::new(|| {
    antonyms(&[
        ("verde", &["azul", "marrón", "negro", "gris", "castaño", "miel", "ámbar"]),
        ("azul", &["marrón", "negro", "castaño", "miel", "ámbar"]),
        ("marrón", &["gris", "negro"]),
        ("castaño", &["rubio", "negro", "pelirrojo"]),
        ("negro", &["rubio", "pelirrojo", "canoso", "blanco"]),
        ("rubio", &["moreno", "pelirrojo"]),
        ("pelirrojo", &["canoso", "blanco", "moreno"]),
    ])
});

static BUILD_ANTONYMS: Lazy<Antonyms> = Lazy::new(|| {
    antonyms(&[
        ("alto", &["bajo", "bajito", "menudo", "chico"]),
        ("delgado", &["gordo", "corpulento", "obeso", "robusto", "fornido", "rollizo"]),
        ("flaco", &["gordo", "obeso", "rollizo"]),
        ("musculoso", &["enclenque", "escuálido"]),
        ("esbelto", &["rechoncho", "obeso"]),
    ])
});

static HAIR_TYPE_ANTONYMS: Lazy<Antonyms> = Lazy::new(|| {
    antonyms(&[
        ("largo", &["corto", "rapado"]),
        ("liso", &["rizado", "ondulado", "encrespado"]),
        ("lacio", &["rizado", "ondulado", "encrespado"]),
        ("calvo", &["abundante", "largo"]),
    ])
});

static SKIN_ANTONYMS: Lazy<Antonyms> = Lazy::new(|| {
    antonyms(&[
        ("pálido", &["bronceado", "moreno", "curtido"]),
        ("blanco", &["moreno", "bronceado"]),
    ])
});

static PERSONALITY_ANTONYMS: Lazy<Antonyms> = Lazy::new(|| {
    antonyms(&[
        ("amable", &["cruel", "huraño", "despiadado"]),
        ("valiente", &["cobarde"]),
        ("leal", &["traidor"]),
        ("honesto", &["mentiroso"]),
        ("sincero", &["mentiroso"]),
        ("generoso", &["tacaño"]),
        ("paciente", &["impaciente"]),
        ("tímido", &["extrovertido", "sociable"]),
        ("introvertido", &["extrovertido"]),
        ("ingenuo", &["astuto"]),
        ("orgulloso", &["humilde"]),
        ("arrogante", &["humilde"]),
        ("sabio", &["torpe"]),
        ("alegre", &["huraño"]),
    ])
});

/// Facial hair is described along independent dimensions; only descriptors
/// of the same dimension can conflict.
static FACIAL_HAIR_DIMENSIONS: Lazy<HashMap<&'static str, (&'static str, u8)>> = Lazy::new(|| {
    [
        ("espeso", ("density", 0)),
        ("poblado", ("density", 0)),
        ("tupido", ("density", 0)),
        ("cerrado", ("density", 0)),
        ("fino", ("density", 1)),
        ("ralo", ("density", 1)),
        ("escaso", ("density", 1)),
        ("incipiente", ("density", 1)),
        ("negro", ("color", 0)),
        ("rubio", ("color", 1)),
        ("rojizo", ("color", 2)),
        ("canoso", ("color", 3)),
        ("gris", ("color", 3)),
        ("blanco", ("color", 3)),
        ("entrecano", ("color", 4)),
        ("largo", ("length", 0)),
        ("corto", ("length", 1)),
        ("recortado", ("length", 1)),
        ("cuidado", ("style", 0)),
        ("descuidado", ("style", 1)),
    ]
    .into_iter()
    .collect()
});

/// True if two values belong to the same synonym class for `key`.
#[must_use]
pub fn synonyms(key: AttributeKey, a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let table: &HashMap<&str, usize> = match key {
        AttributeKey::EyeColor | AttributeKey::HairColor => &COLOR_CLASSES,
        AttributeKey::Build | AttributeKey::Height => &BUILD_CLASSES,
        AttributeKey::Personality => &PERSONALITY_CLASSES,
        _ => return false,
    };
    matches!((table.get(a), table.get(b)), (Some(x), Some(y)) if x == y)
}

/// True if the pair is listed as incompatible for `key`.
#[must_use]
pub fn opposed(key: AttributeKey, a: &str, b: &str) -> bool {
    let table: &Antonyms = match key {
        AttributeKey::EyeColor | AttributeKey::HairColor => &COLOR_ANTONYMS,
        AttributeKey::Build | AttributeKey::Height => &BUILD_ANTONYMS,
        AttributeKey::HairType => &HAIR_TYPE_ANTONYMS,
        AttributeKey::Skin => &SKIN_ANTONYMS,
        AttributeKey::Personality => &PERSONALITY_ANTONYMS,
        AttributeKey::FacialHair => return facial_hair_opposed(a, b),
        _ => return false,
    };
    table.get(a).is_some_and(|set| set.contains(b))
}

fn facial_hair_opposed(a: &str, b: &str) -> bool {
    match (FACIAL_HAIR_DIMENSIONS.get(a), FACIAL_HAIR_DIMENSIONS.get(b)) {
        (Some((da, va)), Some((db, vb))) => da == db && va != vb,
        _ => false,
    }
}

/// Members of the eye/hair colour palette.
#[must_use]
pub fn in_palette(value: &str) -> bool {
    COLOR_CLASSES.contains_key(value) || COLOR_ANTONYMS.contains_key(value)
}
