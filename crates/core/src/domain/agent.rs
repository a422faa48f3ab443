use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LlmProvider;
use crate::domain::category::ProductCategory;
use crate::errors::DomainError;

/// Which agent a config row shapes: one specialist per category plus the general agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentKey {
    Specialist(ProductCategory),
    General,
}

impl AgentKey {
    pub fn for_category(category: ProductCategory) -> Self {
        if category.is_defined() {
            Self::Specialist(category)
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Specialist(category) => category.as_str(),
            Self::General => "general",
        }
    }

    pub fn all() -> Vec<AgentKey> {
        ProductCategory::ALL
            .into_iter()
            .filter(ProductCategory::is_defined)
            .map(AgentKey::Specialist)
            .chain(std::iter::once(AgentKey::General))
            .collect()
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "general" || normalized == "indefinido" {
            return Ok(Self::General);
        }
        normalized
            .parse::<ProductCategory>()
            .map(Self::Specialist)
            .map_err(|_| DomainError::UnknownVariant { kind: "agent key", value: normalized })
    }
}

impl Serialize for AgentKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Prompt text and model parameters used to shape an LLM reply for one agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub key: AgentKey,
    pub name: String,
    pub system_prompt: String,
    pub provider: Option<LlmProvider>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("agent name must not be empty".into()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "agent system_prompt must not be empty".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DomainError::InvariantViolation(
                "agent temperature must be in range 0.0..=2.0".into(),
            ));
        }
        if self.max_tokens == 0 || self.max_tokens > 8_192 {
            return Err(DomainError::InvariantViolation(
                "agent max_tokens must be in range 1..=8192".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AgentConfig, AgentKey};
    use crate::domain::category::ProductCategory;

    #[test]
    fn undefined_category_routes_to_general_agent() {
        assert_eq!(AgentKey::for_category(ProductCategory::Indefinido), AgentKey::General);
        assert_eq!(
            AgentKey::for_category(ProductCategory::SteelFrame),
            AgentKey::Specialist(ProductCategory::SteelFrame)
        );
    }

    #[test]
    fn every_key_parses_back() {
        let keys = AgentKey::all();
        assert_eq!(keys.len(), ProductCategory::ALL.len());
        for key in keys {
            assert_eq!(key.as_str().parse::<AgentKey>().expect("parse"), key);
        }
    }

    #[test]
    fn validation_rejects_out_of_range_temperature() {
        let config = AgentConfig {
            key: AgentKey::General,
            name: "Geral".to_string(),
            system_prompt: "Você é um atendente.".to_string(),
            provider: None,
            model: None,
            temperature: 3.5,
            max_tokens: 500,
            is_active: true,
            updated_at: Utc::now(),
        };
        assert!(config.validate().is_err());
    }
}
