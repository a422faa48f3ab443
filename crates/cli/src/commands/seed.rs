use crate::commands::CommandResult;
use balcao_core::config::{AppConfig, LoadOptions};
use balcao_db::{connect_with_settings, migrations, seed_defaults, SeedResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seeded = seed_defaults(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8));

        pool.close().await;
        seeded
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "agents: {} inserted, {} already configured; knowledge files: {} inserted",
        seeded.agents_inserted, seeded.agents_existing, seeded.knowledge_files_inserted
    )
}

#[cfg(test)]
mod tests {
    use balcao_db::SeedResult;

    use super::summary;

    #[test]
    fn summary_reports_inserted_and_existing_agents() {
        let seeded =
            SeedResult { agents_inserted: 2, agents_existing: 7, knowledge_files_inserted: 0 };

        assert_eq!(
            summary(&seeded),
            "agents: 2 inserted, 7 already configured; knowledge files: 0 inserted"
        );
    }
}
