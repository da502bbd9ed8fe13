//! Types for the scientific transform collaborator.

use serde::{Deserialize, Serialize};

/// Quality assessment reported by the transform toolkit.
///
/// `skip = true` is a designed outcome, not an error: the artifact was
/// decodable but is not worth keeping (nighttime imagery, excessive missing
/// data) and no derived artifact is produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
    pub quality_score: f64,
    pub missing_data_pct: f64,
    #[serde(default)]
    pub saturation_pct: f64,
}

impl QualityReport {
    /// A passing report with the given score.
    pub fn passing(quality_score: f64, missing_data_pct: f64, saturation_pct: f64) -> Self {
        Self {
            skip: false,
            skip_reason: None,
            quality_score,
            missing_data_pct,
            saturation_pct,
        }
    }

    /// A skip report with the given reason.
    pub fn skipped(reason: impl Into<String>, missing_data_pct: f64) -> Self {
        Self {
            skip: true,
            skip_reason: Some(reason.into()),
            quality_score: 0.0,
            missing_data_pct,
            saturation_pct: 0.0,
        }
    }
}
