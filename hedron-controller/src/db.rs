use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // One global counter for resource versions, shared by every kind
    sqlx::query("CREATE SEQUENCE IF NOT EXISTS object_resource_version")
        .execute(pool)
        .await?;

    // Create objects table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS objects (
            kind VARCHAR(32) NOT NULL,
            namespace VARCHAR(253) NOT NULL,
            name VARCHAR(253) NOT NULL,
            uid UUID NOT NULL UNIQUE,
            resource_version BIGINT NOT NULL,
            generation BIGINT NOT NULL,
            creation_timestamp TIMESTAMPTZ NOT NULL,
            owner_uid UUID REFERENCES objects(uid) ON DELETE CASCADE,
            metadata JSONB NOT NULL,
            data JSONB NOT NULL,
            PRIMARY KEY (kind, namespace, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Owner index, used for list_owned and cascading deletes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_objects_owner ON objects(kind, namespace, owner_uid)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_objects_owner_uid ON objects(owner_uid)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
