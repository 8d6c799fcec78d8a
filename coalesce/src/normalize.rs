//! Alias normalization for Spanish names.
//!
//! Normalized form: lower-cased, diacritics removed, punctuation dropped,
//! leading articles/honorifics/titles stripped, whitespace collapsed.
//! Hypocoristics ("Paco", "Lola") map to their full given names.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Leading tokens that never carry identity: articles, demonstratives,
/// possessives, honorifics, and professional/religious/military titles.
static PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // articles, demonstratives, possessives
        "el", "la", "los", "las", "un", "una", "este", "esta", "ese", "esa", "aquel", "aquella",
        "mi", "su", "tu", "nuestro", "nuestra",
        // honorifics
        "don", "dona", "d", "dna", "senor", "senora", "senorita", "sr", "sra", "srta", "sres",
        "mister", "miss", "lady", "sir", "madame", "monsieur",
        // professional
        "doctor", "doctora", "dr", "dra", "profesor", "profesora", "prof", "licenciado",
        "licenciada", "lic", "ingeniero", "ingeniera", "ing", "maestro", "maestra", "abogado",
        "abogada", "notario",
        // religious
        "padre", "fray", "sor", "hermano", "hermana", "san", "santa", "santo", "obispo",
        "cardenal", "reverendo", "monsenor", "madre",
        // military and nobility
        "capitan", "coronel", "general", "teniente", "sargento", "cabo", "comandante",
        "almirante", "rey", "reina", "principe", "princesa", "duque", "duquesa", "conde",
        "condesa", "marques", "marquesa", "baron", "baronesa", "tio", "tia",
    ]
    .into_iter()
    .collect()
});

/// Particles inside names that do not identify anyone on their own.
static PARTICLES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["de", "del", "la", "las", "los", "y", "e", "van", "von"].into_iter().collect());

/// Common Spanish hypocoristics mapped to the full given name.
static HYPOCORISTICS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("paco", "francisco"),
        ("pancho", "francisco"),
        ("curro", "francisco"),
        ("quico", "francisco"),
        ("pepe", "jose"),
        ("pepito", "jose"),
        ("chema", "jose"),
        ("pepa", "josefa"),
        ("lola", "dolores"),
        ("loli", "dolores"),
        ("isa", "isabel"),
        ("chabela", "isabel"),
        ("mari", "maria"),
        ("maruja", "maria"),
        ("manolo", "manuel"),
        ("manu", "manuel"),
        ("concha", "concepcion"),
        ("conchita", "concepcion"),
        ("charo", "rosario"),
        ("nacho", "ignacio"),
        ("quique", "enrique"),
        ("kike", "enrique"),
        ("rafa", "rafael"),
        ("fran", "francisco"),
        ("toni", "antonio"),
        ("tono", "antonio"),
        ("lupe", "guadalupe"),
        ("pili", "pilar"),
        ("merche", "mercedes"),
        ("nando", "fernando"),
        ("alex", "alejandro"),
        ("santi", "santiago"),
        ("chus", "jesus"),
        ("suso", "jesus"),
        ("lucho", "luis"),
        ("memo", "guillermo"),
        ("beto", "alberto"),
        ("tere", "teresa"),
        ("rosi", "rosa"),
        ("susi", "susana"),
        ("javi", "javier"),
        ("dani", "daniel"),
        ("edu", "eduardo"),
        ("juanjo", "juan jose"),
    ]
    .into_iter()
    .collect()
});

/// Remove diacritics (NFD, combining marks dropped).
///
/// ```
/// use cotejo_coalesce::normalize::strip_accents;
/// assert_eq!(strip_accents("María Núñez"), "Maria Nunez");
/// ```
#[must_use]
pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Normalize a surface form into an alias key.
///
/// Never returns an empty string for a non-empty input with letters: when
/// every token is a prefix ("el Capitán"), the last token is kept.
#[must_use]
pub fn normalize_alias(surface: &str) -> String {
    let plain = strip_accents(&surface.to_lowercase());
    let cleaned: String = plain
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let first_content = tokens
        .iter()
        .position(|t| !PREFIXES.contains(t))
        .unwrap_or(tokens.len().saturating_sub(1));
    tokens[first_content.min(tokens.len())..].join(" ")
}

/// Map each token of a normalized alias through the hypocoristic table.
#[must_use]
pub fn expand_hypocoristics(alias: &str) -> String {
    alias
        .split_whitespace()
        .map(|t| HYPOCORISTICS.get(t).copied().unwrap_or(t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identifying tokens of a normalized alias (particles removed).
#[must_use]
pub fn name_tokens(alias: &str) -> Vec<&str> {
    alias
        .split_whitespace()
        .filter(|t| !PARTICLES.contains(t))
        .collect()
}

/// True if the token is a leading prefix such as an honorific.
#[must_use]
pub fn is_prefix_token(token: &str) -> bool {
    PREFIXES.contains(strip_accents(&token.to_lowercase()).trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_honorifics_and_accents() {
        assert_eq!(normalize_alias("Doña María Sánchez"), "maria sanchez");
        assert_eq!(normalize_alias("el Sr. García"), "garcia");
        assert_eq!(normalize_alias("  Dr.  Ruiz "), "ruiz");
        assert_eq!(normalize_alias("Capitán"), "capitan");
        assert_eq!(normalize_alias("José-María"), "jose maria");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize_alias(""), "");
        assert_eq!(normalize_alias("..."), "");
    }

    #[test]
    fn test_hypocoristics() {
        assert_eq!(expand_hypocoristics("paco ruiz"), "francisco ruiz");
        assert_eq!(expand_hypocoristics("isa"), "isabel");
        assert_eq!(expand_hypocoristics("ramon"), "ramon");
    }

    #[test]
    fn test_name_tokens_skip_particles() {
        assert_eq!(name_tokens("juan de la cruz"), vec!["juan", "cruz"]);
    }

    #[test]
    fn test_prefix_token() {
        assert!(is_prefix_token("Sr."));
        assert!(is_prefix_token("Doña"));
        assert!(!is_prefix_token("María"));
    }
}
