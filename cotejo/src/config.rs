//! Engine configuration.
//!
//! Every section has defaults, so a file only needs the values it changes:
//!
//! ```rust
//! use cotejo::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml(r#"
//! [fusion]
//! auto_merge_threshold = 0.9
//!
//! [limits]
//! max_items = 5000
//! "#).unwrap();
//! assert_eq!(config.fusion.auto_merge_threshold, 0.9);
//! assert_eq!(config.scope.max_chars, 1500);
//! ```

use crate::attributes::AttributeConfig;
use crate::consistency::ConsistencyConfig;
use crate::coref::CorefConfig;
use crate::error::{Error, Result};
use crate::feedback::FeedbackConfig;
use crate::ner::NerConfig;
use crate::pipeline::RunLimits;
use crate::scope::ScopeConfig;
use cotejo_coalesce::FusionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ner: NerConfig,
    pub coref: CorefConfig,
    pub scope: ScopeConfig,
    pub fusion: FusionConfig,
    pub attributes: AttributeConfig,
    pub consistency: ConsistencyConfig,
    pub feedback: FeedbackConfig,
    pub limits: RunLimits,
}

fn unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config(format!("{name} must be in [0, 1], got {value}")))
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        unit("ner.min_score", self.ner.min_score)?;
        unit("coref.link_threshold", self.coref.link_threshold)?;
        unit("coref.ambiguity_margin", self.coref.ambiguity_margin)?;
        unit("coref.nominal_threshold", self.coref.nominal_threshold)?;
        if self.coref.window_chapters == 0 {
            return Err(Error::config("coref.window_chapters must be at least 1"));
        }
        if self.scope.max_chars == 0 {
            return Err(Error::config("scope.max_chars must be positive"));
        }
        if self.scope.lookback_sentences > 3 {
            return Err(Error::config(format!(
                "scope.lookback_sentences must be at most 3, got {}",
                self.scope.lookback_sentences
            )));
        }
        unit("fusion.auto_merge_threshold", self.fusion.auto_merge_threshold)?;
        unit("fusion.suggest_threshold", self.fusion.suggest_threshold)?;
        unit("fusion.profile_weight", self.fusion.profile_weight)?;
        if self.fusion.suggest_threshold > self.fusion.auto_merge_threshold {
            return Err(Error::config(
                "fusion.suggest_threshold must not exceed fusion.auto_merge_threshold",
            ));
        }
        unit("attributes.min_confidence", self.attributes.min_confidence)?;
        unit("consistency.report_threshold", self.consistency.report_threshold)?;
        unit("feedback.learning_rate", self.feedback.learning_rate)?;
        if !(0.5..=1.0).contains(&self.feedback.max_share) {
            return Err(Error::config(format!(
                "feedback.max_share must be in [0.5, 1], got {}",
                self.feedback.max_share
            )));
        }
        if self.limits.cancel_check_interval == 0 {
            return Err(Error::config("limits.cancel_check_interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = EngineConfig::default();
        config.consistency.report_threshold = 0.6;
        config.coref.narrator = false;
        let text = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_json_partial() {
        let config = EngineConfig::from_json(r#"{"scope": {"max_chars": 800}}"#).unwrap();
        assert_eq!(config.scope.max_chars, 800);
        assert_eq!(config.scope.lookback_sentences, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EngineConfig::from_toml("[fusion]\nsuggest_threshold = 0.9\nauto_merge_threshold = 0.8\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(EngineConfig::from_toml("[scope]\nlookback_sentences = 7\n").is_err());
        assert!(EngineConfig::from_toml("[consistency]\nreport_threshold = 1.5\n").is_err());
        assert!(EngineConfig::from_toml("[limits]\ncancel_check_interval = 0\n").is_err());
        assert!(EngineConfig::from_toml("not toml = = 1").is_err());
    }
}
