use chrono::Utc;
use serde::Serialize;

use balcao_core::domain::agent::AgentKey;
use balcao_core::domain::category::ProductCategory;

use crate::connection::DbPool;
use crate::repositories::{
    format_timestamp, KnowledgeRepository, RepositoryError, SqlKnowledgeRepository,
};

/// Default agent prompt seeded for each category.
pub struct AgentSeed {
    pub key: AgentKey,
    pub name: &'static str,
    pub focus: &'static str,
}

const GENERAL_PROMPT: &str = "Você é o atendente virtual de uma loja de materiais de construção. \
Responda em português do Brasil, de forma cordial e objetiva, em no máximo três parágrafos curtos. \
Descubra qual produto o cliente procura, a cidade da obra, a metragem aproximada e o orçamento. \
Nunca invente preços: quando o cliente pedir valores, explique que um consultor enviará o orçamento.";

pub const AGENT_SEEDS: &[AgentSeed] = &[
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::EnergiaSolar),
        name: "Consultor de Energia Solar",
        focus: "sistemas fotovoltaicos: consumo mensal em kWh, valor da conta de luz, tipo de telhado e financiamento",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::TelhaShingle),
        name: "Consultor de Telha Shingle",
        focus: "telhados com telha shingle: área do telhado, inclinação, estrutura existente e subcobertura",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::SteelFrame),
        name: "Consultor de Steel Frame",
        focus: "construção em light steel frame: área construída, número de pavimentos, projeto aprovado e prazo",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::DrywallDivisorias),
        name: "Consultor de Drywall",
        focus: "paredes e divisórias em drywall: metragem linear, pé-direito, isolamento acústico e áreas úmidas",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::Forros),
        name: "Consultor de Forros",
        focus: "forros de gesso, PVC e mineral: área do ambiente, altura, iluminação embutida e acabamento",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::PisosRevestimentos),
        name: "Consultor de Pisos e Revestimentos",
        focus: "pisos e revestimentos: ambiente, metragem, formato das peças, tráfego e estilo desejado",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::Ferramentas),
        name: "Consultor de Ferramentas",
        focus: "ferramentas elétricas e manuais: uso profissional ou doméstico, voltagem, marca e acessórios",
    },
    AgentSeed {
        key: AgentKey::Specialist(ProductCategory::Impermeabilizacao),
        name: "Consultor de Impermeabilização",
        focus: "impermeabilização: local da infiltração, área afetada, tipo de superfície e urgência do reparo",
    },
    AgentSeed {
        key: AgentKey::General,
        name: "Atendente Geral",
        focus: "atendimento inicial: identificar a categoria de produto e coletar os dados do projeto",
    },
];

pub struct KnowledgeSeed {
    pub name: &'static str,
    pub category: Option<ProductCategory>,
    pub content: &'static str,
}

pub const KNOWLEDGE_SEEDS: &[KnowledgeSeed] = &[
    KnowledgeSeed {
        name: "politica-de-entrega.txt",
        category: None,
        content: "Entregamos em toda a região metropolitana em até 5 dias úteis.\n\n\
Pedidos acima de R$ 2.000 têm frete grátis. Retirada na loja disponível no mesmo dia.",
    },
    KnowledgeSeed {
        name: "energia-solar-kits.txt",
        category: Some(ProductCategory::EnergiaSolar),
        content: "Kits fotovoltaicos residenciais de 3 a 10 kWp com inversor e estrutura de fixação.\n\n\
Painéis com garantia de 25 anos de performance. Financiamento em até 72 meses.",
    },
    KnowledgeSeed {
        name: "drywall-sistemas.txt",
        category: Some(ProductCategory::DrywallDivisorias),
        content: "Placas de gesso standard, resistente à umidade (RU) e resistente ao fogo (RF).\n\n\
Montagem com perfis de 48, 70 ou 90 mm. Lã mineral para isolamento acústico.",
    },
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub agents_inserted: u32,
    pub agents_existing: u32,
    pub knowledge_files_inserted: u32,
}

pub fn agent_prompt(seed: &AgentSeed) -> String {
    match seed.key {
        AgentKey::General => GENERAL_PROMPT.to_string(),
        AgentKey::Specialist(_) => format!(
            "{GENERAL_PROMPT}\n\nVocê é especialista em {}. Faça uma pergunta por vez.",
            seed.focus
        ),
    }
}

/// Inserts default agent configs and demo knowledge. Existing rows are kept,
/// so running it repeatedly is safe.
pub async fn seed_defaults(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let mut result = SeedResult::default();
    let now = format_timestamp(&Utc::now());

    for seed in AGENT_SEEDS {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO agent_configs (
                agent_key, name, system_prompt, provider, model, temperature, max_tokens,
                is_active, updated_at
            ) VALUES (?, ?, ?, NULL, NULL, 0.7, 600, 1, ?)
            "#,
        )
        .bind(seed.key.as_str())
        .bind(seed.name)
        .bind(agent_prompt(seed))
        .bind(&now)
        .execute(pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            result.agents_inserted += 1;
        } else {
            result.agents_existing += 1;
        }
    }

    let existing_files: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_files").fetch_one(pool).await?;
    if existing_files == 0 {
        let repo = SqlKnowledgeRepository::new(pool.clone());
        for seed in KNOWLEDGE_SEEDS {
            repo.create_file(seed.name, seed.category, seed.content).await?;
            result.knowledge_files_inserted += 1;
        }
    }

    Ok(result)
}
