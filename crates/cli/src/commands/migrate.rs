use crate::commands::CommandResult;
use balcao_core::config::{AppConfig, LoadOptions};
use balcao_db::{connect_with_settings, migrations, DbPool};

struct MigrationSummary {
    newly_applied: i64,
    schema_version: Option<i64>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
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
                "migrate",
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

        let before = applied_count(&pool).await;
        let outcome = migrations::run_pending(&pool).await;
        let summary = MigrationSummary {
            newly_applied: applied_count(&pool).await - before,
            schema_version: schema_version(&pool).await,
        };
        pool.close().await;

        outcome.map_err(|error| ("migration", error.to_string(), 5u8))?;
        Ok::<MigrationSummary, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success("migrate", describe(&summary)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

// The bookkeeping table does not exist before the first run.
async fn applied_count(pool: &DbPool) -> i64 {
    scalar(pool, "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1").await.unwrap_or(0)
}

async fn schema_version(pool: &DbPool) -> Option<i64> {
    scalar(pool, "SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1").await
}

async fn scalar(pool: &DbPool, query: &str) -> Option<i64> {
    sqlx::query_scalar::<_, Option<i64>>(query).fetch_one(pool).await.ok().flatten()
}

fn describe(summary: &MigrationSummary) -> String {
    let version = summary
        .schema_version
        .map(|version| version.to_string())
        .unwrap_or_else(|| "none".to_string());
    match summary.newly_applied {
        0 => format!("schema already current at version {version}"),
        count => format!("applied {count} pending migrations, schema at version {version}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{describe, MigrationSummary};

    #[test]
    fn describe_distinguishes_fresh_and_current_schemas() {
        let fresh = MigrationSummary { newly_applied: 1, schema_version: Some(1) };
        assert_eq!(describe(&fresh), "applied 1 pending migrations, schema at version 1");

        let current = MigrationSummary { newly_applied: 0, schema_version: Some(1) };
        assert_eq!(describe(&current), "schema already current at version 1");
    }
}
