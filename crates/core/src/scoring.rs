use crate::domain::context::{ProjectContext, Urgency};
use crate::domain::lead::{LeadScore, LeadTemperature, ScoreItem};

pub const MAX_SCORE: u8 = 100;

/// Point values for each qualifying signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoreWeights {
    pub phone: u8,
    pub email: u8,
    pub name: u8,
    pub budget: u8,
    pub area: u8,
    pub city: u8,
    pub project_type: u8,
    pub materials: u8,
    pub urgency_high: u8,
    pub urgency_medium: u8,
    pub engaged_messages: (u32, u8),
    pub highly_engaged_messages: (u32, u8),
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            phone: 15,
            email: 10,
            name: 5,
            budget: 20,
            area: 10,
            city: 5,
            project_type: 5,
            materials: 10,
            urgency_high: 25,
            urgency_medium: 10,
            engaged_messages: (3, 5),
            highly_engaged_messages: (6, 10),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LeadScorer {
    weights: ScoreWeights,
}

impl LeadScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, context: &ProjectContext, message_count: u32) -> LeadScore {
        let weights = &self.weights;
        let mut breakdown = Vec::new();
        let mut push = |reason: &str, points: u8| {
            if points > 0 {
                breakdown.push(ScoreItem { reason: reason.to_string(), points });
            }
        };

        if context.phone.is_some() {
            push("phone", weights.phone);
        }
        if context.email.is_some() {
            push("email", weights.email);
        }
        if context.customer_name.is_some() {
            push("name", weights.name);
        }
        if context.has_budget() {
            push("budget", weights.budget);
        }
        if context.area_m2.is_some() {
            push("area", weights.area);
        }
        if context.city.is_some() {
            push("city", weights.city);
        }
        if context.project_type.is_some() {
            push("project_type", weights.project_type);
        }
        if !context.materials.is_empty() {
            push("materials", weights.materials);
        }
        match context.urgency {
            Some(Urgency::High) => push("urgency_high", weights.urgency_high),
            Some(Urgency::Medium) => push("urgency_medium", weights.urgency_medium),
            Some(Urgency::Low) | None => {}
        }

        let (high_threshold, high_points) = weights.highly_engaged_messages;
        let (threshold, points) = weights.engaged_messages;
        if message_count >= high_threshold {
            push("engagement", high_points);
        } else if message_count >= threshold {
            push("engagement", points);
        }

        let total: u32 = breakdown.iter().map(|item| u32::from(item.points)).sum();
        let score = total.min(u32::from(MAX_SCORE)) as u8;

        LeadScore { score, temperature: LeadTemperature::from_score(score), breakdown }
    }
}
