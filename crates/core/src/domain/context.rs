use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Urgency {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => {
                Err(DomainError::UnknownVariant { kind: "urgency", value: other.to_string() })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Residencial,
    Comercial,
    Industrial,
    Rural,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residencial => "residencial",
            Self::Comercial => "comercial",
            Self::Industrial => "industrial",
            Self::Rural => "rural",
        }
    }
}

impl FromStr for ProjectType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "residencial" => Ok(Self::Residencial),
            "comercial" => Ok(Self::Comercial),
            "industrial" => Ok(Self::Industrial),
            "rural" => Ok(Self::Rural),
            other => {
                Err(DomainError::UnknownVariant { kind: "project type", value: other.to_string() })
            }
        }
    }
}

/// Budget bounds in BRL. `max == None` means open-ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: Decimal,
    pub max: Option<Decimal>,
}

impl BudgetRange {
    /// Fixed buckets used when the customer states a single amount.
    pub fn bucket_for(amount: Decimal) -> Self {
        let bounds = [Decimal::new(5_000, 0), Decimal::new(15_000, 0), Decimal::new(50_000, 0)];
        let mut min = Decimal::ZERO;
        for bound in bounds {
            if amount < bound {
                return Self { min, max: Some(bound) };
            }
            min = bound;
        }
        Self { min, max: None }
    }

    pub fn label(&self) -> String {
        match self.max {
            Some(max) if self.min.is_zero() => format!("até R$ {}", max.normalize()),
            Some(max) => format!("R$ {} a R$ {}", self.min.normalize(), max.normalize()),
            None => format!("acima de R$ {}", self.min.normalize()),
        }
    }
}

/// Flat record of extracted customer/project attributes, 1:1 with a conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub budget_amount: Option<Decimal>,
    pub budget_range: Option<BudgetRange>,
    pub area_m2: Option<Decimal>,
    pub urgency: Option<Urgency>,
    pub project_type: Option<ProjectType>,
    pub timeline: Option<String>,
    pub materials: Vec<String>,
}

impl ProjectContext {
    pub fn has_budget(&self) -> bool {
        self.budget_range.is_some() || self.budget_amount.is_some()
    }

    /// Human-readable lines for prompts and the console.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = &self.customer_name {
            lines.push(format!("Nome: {name}"));
        }
        if let Some(phone) = &self.phone {
            lines.push(format!("Telefone: {phone}"));
        }
        if let Some(email) = &self.email {
            lines.push(format!("E-mail: {email}"));
        }
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => lines.push(format!("Cidade: {city}/{state}")),
            (Some(city), None) => lines.push(format!("Cidade: {city}")),
            (None, Some(state)) => lines.push(format!("Estado: {state}")),
            (None, None) => {}
        }
        if let Some(amount) = self.budget_amount {
            lines.push(format!("Orçamento informado: R$ {}", amount.normalize()));
        }
        if let Some(range) = &self.budget_range {
            lines.push(format!("Faixa de orçamento: {}", range.label()));
        }
        if let Some(area) = self.area_m2 {
            lines.push(format!("Área: {} m²", area.normalize()));
        }
        if let Some(urgency) = self.urgency {
            lines.push(format!("Urgência: {}", urgency.as_str()));
        }
        if let Some(project_type) = self.project_type {
            lines.push(format!("Tipo de projeto: {}", project_type.as_str()));
        }
        if let Some(timeline) = &self.timeline {
            lines.push(format!("Prazo: {timeline}"));
        }
        if !self.materials.is_empty() {
            lines.push(format!("Materiais: {}", self.materials.join(", ")));
        }
        lines
    }
}
