//! Numeric-range comparator for age and height.
//!
//! Values become closed ranges: "30" is `[30, 30]`, "anciano" is `[65, 99]`,
//! "1.80" is `[1.80, 1.80]`, "alto" is `[1.75, 2.00]`. Ages are shifted by
//! the story time that passed between the two chapters before comparing.
//!
//! | Relation | Conflict |
//! |----------|----------|
//! | overlap covers more than half of the narrower range | 0.1 |
//! | some overlap | 0.3 |
//! | gap within tolerance (5 years, 5 cm) | 0.6 |
//! | wider gap | 0.9 |

use super::Conflict;
use crate::attributes::lexicon::{AGE_RANGES, HEIGHT_RANGES};
use cotejo_core::{AttributeKey, InconsistencyKind};

/// Closed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    fn point(x: f64) -> Self {
        Self { lo: x, hi: x }
    }

    fn shift(self, by: f64) -> Self {
        Self {
            lo: self.lo + by,
            hi: self.hi + by,
        }
    }
}

/// Range denoted by a normalized value, if it is numeric or a known descriptor.
#[must_use]
pub fn parse(key: AttributeKey, value: &str) -> Option<Range> {
    let v = value.trim();
    match key {
        AttributeKey::Age => {
            if let Ok(n) = v.parse::<f64>() {
                return Some(Range::point(n));
            }
            AGE_RANGES
                .get(v)
                .or_else(|| v.split_whitespace().find_map(|w| AGE_RANGES.get(w)))
                .map(|&(lo, hi)| Range { lo, hi })
        }
        AttributeKey::Height => {
            if let Ok(n) = v.parse::<f64>() {
                // Centimetres written as an integer.
                let metres = if n > 3.0 { n / 100.0 } else { n };
                return Some(Range::point(metres));
            }
            HEIGHT_RANGES
                .get(v)
                .or_else(|| v.split_whitespace().find_map(|w| HEIGHT_RANGES.get(w)))
                .map(|&(lo, hi)| Range { lo, hi })
        }
        _ => None,
    }
}

/// Compare two numeric values; `elapsed` is the story time in years from
/// the first assertion to the second.
#[must_use]
pub fn compare(key: AttributeKey, a: &str, b: &str, elapsed: f64) -> Option<Conflict> {
    let ra = parse(key, a)?;
    let rb = parse(key, b)?;
    let (ra, tolerance) = match key {
        AttributeKey::Age => (ra.shift(elapsed), 5.0),
        _ => (ra, 0.05),
    };
    let score = range_conflict(ra, rb, tolerance);
    let reason = match key {
        AttributeKey::Age if elapsed.abs() > f64::EPSILON => {
            format!("las edades no encajan con los {elapsed:.0} años transcurridos")
        }
        AttributeKey::Age => "las edades no coinciden".to_string(),
        _ => "las estaturas no coinciden".to_string(),
    };
    Some(Conflict {
        kind: InconsistencyKind::NumericRange,
        score,
        reason,
    })
}

fn range_conflict(a: Range, b: Range, tolerance: f64) -> f64 {
    let overlap = a.hi.min(b.hi) - a.lo.max(b.lo);
    if overlap >= 0.0 {
        let narrower = (a.hi - a.lo).min(b.hi - b.lo);
        let ratio = if narrower <= f64::EPSILON { 1.0 } else { overlap / narrower };
        if ratio > 0.5 {
            0.1
        } else {
            0.3
        }
    } else if -overlap <= tolerance + 1e-9 {
        0.6
    } else {
        0.9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_descriptors() {
        assert_eq!(parse(AttributeKey::Age, "anciano"), Some(Range { lo: 65.0, hi: 99.0 }));
        assert_eq!(parse(AttributeKey::Age, "mediana edad"), Some(Range { lo: 40.0, hi: 55.0 }));
        assert_eq!(parse(AttributeKey::Age, "azul"), None);
    }

    #[test]
    fn test_elapsed_time_explains_difference() {
        let same = compare(AttributeKey::Age, "30", "40", 10.0).unwrap();
        assert!((same.score - 0.1).abs() < 1e-9);
        let off = compare(AttributeKey::Age, "30", "60", 0.0).unwrap();
        assert!((off.score - 0.9).abs() < 1e-9);
        let near = compare(AttributeKey::Age, "30", "34", 0.0).unwrap();
        assert!((near.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_height() {
        let c = compare(AttributeKey::Height, "alto", "1.50", 0.0).unwrap();
        assert!((c.score - 0.9).abs() < 1e-9);
        let c = compare(AttributeKey::Height, "alto", "180", 0.0).unwrap();
        assert!((c.score - 0.1).abs() < 1e-9);
    }
}
