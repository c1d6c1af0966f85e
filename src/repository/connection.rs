use crate::error::Result;
use crate::repository::DbPool;

pub async fn establish_connection(database_url: &str) -> Result<DbPool> {
    let db_url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{}", database_url)
    };

    // Create the file when missing
    let connection_string = format!("{}?mode=rwc", db_url);
    let pool = sqlx::SqlitePool::connect(&connection_string).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_runs (
            id TEXT PRIMARY KEY,
            config_path TEXT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            outcome INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_migration_runs_started_at ON migration_runs(started_at);
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}
