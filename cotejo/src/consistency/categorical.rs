//! Categorical comparator: palettes, synonym classes, antonym tables.

use super::tables;
use super::Conflict;
use cotejo_core::{AttributeKey, InconsistencyKind};

const ANTONYM: f64 = 0.95;
const PALETTE: f64 = 0.85;

/// Compare two normalized values of a categorical key.
///
/// Multi-word values are compared on their head words: the first word that
/// carries meaning for the key.
#[must_use]
pub fn compare(key: AttributeKey, a: &str, b: &str) -> Option<Conflict> {
    let (ha, hb) = (head(key, a), head(key, b));
    if tables::synonyms(key, ha, hb) {
        return None;
    }
    if tables::opposed(key, ha, hb) {
        return Some(Conflict {
            kind: InconsistencyKind::Antonym,
            score: ANTONYM,
            reason: "son valores opuestos".into(),
        });
    }
    let colour = matches!(key, AttributeKey::EyeColor | AttributeKey::HairColor);
    if colour && tables::in_palette(ha) && tables::in_palette(hb) {
        return Some(Conflict {
            kind: InconsistencyKind::Antonym,
            score: PALETTE,
            reason: "son colores distintos".into(),
        });
    }
    None
}

fn head<'a>(key: AttributeKey, value: &'a str) -> &'a str {
    let mut words = value.split_whitespace();
    let first = words.next().unwrap_or(value);
    if matches!(key, AttributeKey::EyeColor | AttributeKey::HairColor) && !tables::in_palette(first) {
        return value
            .split_whitespace()
            .find(|w| tables::in_palette(w))
            .unwrap_or(first);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_colours() {
        let c = compare(AttributeKey::EyeColor, "azul", "verde").unwrap();
        assert!((c.score - 0.95).abs() < 1e-9);
        assert!(compare(AttributeKey::EyeColor, "azul", "azul").is_none());
        assert!(compare(AttributeKey::HairColor, "castaño", "marrón").is_none());
    }

    #[test]
    fn test_palette_members_without_table_entry() {
        let c = compare(AttributeKey::EyeColor, "azul", "gris").unwrap();
        assert!((c.score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_head_word() {
        assert!(compare(AttributeKey::EyeColor, "intenso verde", "verde").is_none());
        assert!(compare(AttributeKey::Build, "delgado", "esbelto").is_none());
        assert!(compare(AttributeKey::Build, "delgado", "gordo").is_some());
    }
}
