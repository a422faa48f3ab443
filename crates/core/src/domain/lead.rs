use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const WARM_THRESHOLD: u8 = 40;
pub const HOT_THRESHOLD: u8 = 70;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTemperature {
    Cold,
    Warm,
    Hot,
}

impl LeadTemperature {
    pub const ALL: [LeadTemperature; 3] = [Self::Cold, Self::Warm, Self::Hot];

    pub fn from_score(score: u8) -> Self {
        if score < WARM_THRESHOLD {
            Self::Cold
        } else if score < HOT_THRESHOLD {
            Self::Warm
        } else {
            Self::Hot
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Hot => "hot",
        }
    }
}

impl fmt::Display for LeadTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadTemperature {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cold" => Ok(Self::Cold),
            "warm" => Ok(Self::Warm),
            "hot" => Ok(Self::Hot),
            other => Err(DomainError::UnknownVariant {
                kind: "lead temperature",
                value: other.to_string(),
            }),
        }
    }
}

/// Score plus the point items that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub score: u8,
    pub temperature: LeadTemperature,
    pub breakdown: Vec<ScoreItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreItem {
    pub reason: String,
    pub points: u8,
}
