use std::collections::HashSet;

use balcao_core::domain::agent::AgentKey;
use balcao_core::domain::category::ProductCategory;
use balcao_db::fixtures::{agent_prompt, seed_defaults, AGENT_SEEDS, KNOWLEDGE_SEEDS};
use balcao_db::repositories::{
    AgentConfigRepository, KnowledgeRepository, SqlAgentConfigRepository, SqlKnowledgeRepository,
};
use balcao_db::{connect_with_settings, migrations};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

#[test]
fn agent_seeds_cover_every_agent_key_once() -> SeedContractTestResult {
    let mut seen = HashSet::new();
    for seed in AGENT_SEEDS {
        require!(seen.insert(seed.key), "duplicate agent seed: {}", seed.key);
        require!(!seed.name.trim().is_empty(), "agent {} needs a name", seed.key);
        let prompt = agent_prompt(seed);
        require!(prompt.contains("português"), "agent {} prompt should set the language", seed.key);
        if let AgentKey::Specialist(category) = seed.key {
            require!(prompt.contains(seed.focus), "specialist {} prompt should carry its focus", category);
        }
    }

    let expected: HashSet<AgentKey> = AgentKey::all().into_iter().collect();
    require_eq!(seen, expected);
    Ok(())
}

#[test]
fn knowledge_seeds_are_uncategorized_or_defined() -> SeedContractTestResult {
    let mut names = HashSet::new();
    for seed in KNOWLEDGE_SEEDS {
        require!(names.insert(seed.name), "duplicate knowledge seed: {}", seed.name);
        require!(!seed.content.trim().is_empty());
        require!(
            seed.category.map(|category| category.is_defined()).unwrap_or(true),
            "knowledge seed {} cannot target `indefinido`",
            seed.name
        );
    }
    Ok(())
}

#[tokio::test]
async fn seeded_database_serves_agents_and_knowledge() -> SeedContractTestResult {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    seed_defaults(&pool).await.map_err(|error| format!("seed: {error}"))?;

    let agents = SqlAgentConfigRepository::new(pool.clone())
        .list()
        .await
        .map_err(|error| format!("list agents: {error}"))?;
    require_eq!(agents.len(), AGENT_SEEDS.len());
    require!(agents.iter().all(|agent| agent.is_active), "seeded agents should be active");

    let chunks = SqlKnowledgeRepository::new(pool.clone())
        .candidate_chunks(ProductCategory::EnergiaSolar)
        .await
        .map_err(|error| format!("candidate chunks: {error}"))?;
    require!(
        chunks.iter().any(|chunk| chunk.category.is_none()),
        "uncategorized delivery policy should be a candidate for every category"
    );
    require!(
        chunks.iter().any(|chunk| chunk.category == Some(ProductCategory::EnergiaSolar)),
        "solar knowledge should be a candidate for the solar category"
    );

    pool.close().await;
    Ok(())
}
