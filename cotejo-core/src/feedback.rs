//! Editor feedback on findings.

use crate::inconsistency::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the editor did with a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Dismissed,
}

impl Decision {
    /// `true` for accepted.
    #[must_use]
    pub fn from_accepted(accepted: bool) -> Self {
        if accepted {
            Decision::Accepted
        } else {
            Decision::Dismissed
        }
    }
}

/// One accept/dismiss action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub fingerprint: Fingerprint,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
    /// Detector that produced the finding, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    /// Attribute extraction methods behind the finding.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl FeedbackRecord {
    /// Record a decision made now.
    #[must_use]
    pub fn now(fingerprint: Fingerprint, decision: Decision) -> Self {
        Self {
            fingerprint,
            decision,
            timestamp: Utc::now(),
            detector: None,
            methods: Vec::new(),
        }
    }
}
