use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Coarse-grained pipeline position of a job.
///
/// Variants are declared in pipeline order, so the derived `Ord` is the
/// forward direction of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collection,
    FeatureExtraction,
    Matching,
    Evidence,
    Completed,
}

impl Phase {
    /// All phases in pipeline order.
    pub const ALL: [Phase; 5] = [
        Phase::Collection,
        Phase::FeatureExtraction,
        Phase::Matching,
        Phase::Evidence,
        Phase::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Collection => "collection",
            Phase::FeatureExtraction => "feature_extraction",
            Phase::Matching => "matching",
            Phase::Evidence => "evidence",
            Phase::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed)
    }

    /// Check that moving from `self` to `to` is a forward step.
    pub fn ensure_forward(&self, to: Phase) -> Result<(), CoreError> {
        if to > *self {
            Ok(())
        } else {
            Err(CoreError::BackwardTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(Phase::Collection),
            "feature_extraction" => Ok(Phase::FeatureExtraction),
            "matching" => Ok(Phase::Matching),
            "evidence" => Ok(Phase::Evidence),
            "completed" => Ok(Phase::Completed),
            other => Err(CoreError::UnknownPhase(other.to_string())),
        }
    }
}

/// Which kinds of collected assets a job contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTypes {
    pub has_images: bool,
    pub has_videos: bool,
}

impl AssetTypes {
    pub fn new(has_images: bool, has_videos: bool) -> Self {
        Self { has_images, has_videos }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_images && !self.has_videos
    }
}

/// One pipeline run as stored in the `jobs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub industry: String,
    pub phase: Phase,
    pub asset_types: AssetTypes,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_forward() {
        for pair in Phase::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].ensure_forward(pair[1]).is_ok());
            assert!(!pair[0].is_terminal());
        }
        assert!(Phase::Completed.is_terminal());
    }

    #[test]
    fn phase_string_roundtrip() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert_eq!(
            "archived".parse::<Phase>(),
            Err(CoreError::UnknownPhase("archived".into()))
        );
    }

    #[test]
    fn phase_serde_snake_case() {
        let json = serde_json::to_string(&Phase::FeatureExtraction).unwrap();
        assert_eq!(json, "\"feature_extraction\"");
    }

    #[test]
    fn ensure_forward_rejects_backward_and_self() {
        assert!(Phase::Matching.ensure_forward(Phase::Evidence).is_ok());
        assert!(Phase::Collection.ensure_forward(Phase::Completed).is_ok());
        assert!(Phase::Matching.ensure_forward(Phase::Matching).is_err());
        assert!(Phase::Evidence.ensure_forward(Phase::FeatureExtraction).is_err());
    }

    #[test]
    fn empty_asset_types() {
        assert!(AssetTypes::default().is_empty());
        assert!(!AssetTypes::new(true, false).is_empty());
    }
}
