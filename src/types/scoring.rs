use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which path produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Trained,
    RuleBased,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Trained => "trained",
            ScoreSource::RuleBased => "rule_based",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub const HIGH_THRESHOLD: f64 = 0.7;
    pub const MEDIUM_THRESHOLD: f64 = 0.4;

    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            RiskCategory::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            RiskCategory::Medium
        } else {
            RiskCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "Low",
            RiskCategory::Medium => "Medium",
            RiskCategory::High => "High",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactLabel {
    #[serde(rename = "Strong Positive")]
    StrongPositive,
    #[serde(rename = "Mild Positive")]
    MildPositive,
    Neutral,
    #[serde(rename = "Mild Negative")]
    MildNegative,
    #[serde(rename = "Strong Negative")]
    StrongNegative,
}

impl ImpactLabel {
    pub fn from_score(impact: f64) -> Self {
        if impact > 0.4 {
            ImpactLabel::StrongPositive
        } else if impact > 0.1 {
            ImpactLabel::MildPositive
        } else if impact < -0.4 {
            ImpactLabel::StrongNegative
        } else if impact < -0.1 {
            ImpactLabel::MildNegative
        } else {
            ImpactLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLabel::StrongPositive => "Strong Positive",
            ImpactLabel::MildPositive => "Mild Positive",
            ImpactLabel::Neutral => "Neutral",
            ImpactLabel::MildNegative => "Mild Negative",
            ImpactLabel::StrongNegative => "Strong Negative",
        }
    }
}

impl fmt::Display for ImpactLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of a single scorer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult<L> {
    /// Ticker for risk, headline for events
    pub subject: String,
    pub raw_score: f64,
    pub label: L,
    pub confidence: f64,
    pub inputs: BTreeMap<String, f64>,
    pub explanation: String,
    pub source: ScoreSource,
}

pub type RiskScore = ScoringResult<RiskCategory>;
pub type EventImpact = ScoringResult<ImpactLabel>;
