use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Construction-material domain a conversation is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    EnergiaSolar,
    TelhaShingle,
    SteelFrame,
    DrywallDivisorias,
    Forros,
    PisosRevestimentos,
    Ferramentas,
    Impermeabilizacao,
    Indefinido,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 9] = [
        Self::EnergiaSolar,
        Self::TelhaShingle,
        Self::SteelFrame,
        Self::DrywallDivisorias,
        Self::Forros,
        Self::PisosRevestimentos,
        Self::Ferramentas,
        Self::Impermeabilizacao,
        Self::Indefinido,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnergiaSolar => "energia_solar",
            Self::TelhaShingle => "telha_shingle",
            Self::SteelFrame => "steel_frame",
            Self::DrywallDivisorias => "drywall_divisorias",
            Self::Forros => "forros",
            Self::PisosRevestimentos => "pisos_revestimentos",
            Self::Ferramentas => "ferramentas",
            Self::Impermeabilizacao => "impermeabilizacao",
            Self::Indefinido => "indefinido",
        }
    }

    /// Customer-facing name used in canned replies and prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::EnergiaSolar => "Energia Solar",
            Self::TelhaShingle => "Telha Shingle",
            Self::SteelFrame => "Steel Frame",
            Self::DrywallDivisorias => "Drywall e Divisórias",
            Self::Forros => "Forros",
            Self::PisosRevestimentos => "Pisos e Revestimentos",
            Self::Ferramentas => "Ferramentas",
            Self::Impermeabilizacao => "Impermeabilização",
            Self::Indefinido => "Atendimento Geral",
        }
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Indefinido)
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownVariant { kind: "product category", value: normalized })
    }
}
