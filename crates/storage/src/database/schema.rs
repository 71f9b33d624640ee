use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Database schema manager
pub struct Schema;

impl Schema {
    /// Initialize all database tables and indexes
    pub async fn initialize(pool: &PgPool) -> Result<()> {
        Self::create_principals_table(pool).await?;
        Self::create_files_table(pool).await?;
        Self::create_indexes(pool).await?;
        info!("PostgreSQL database storage initialized");
        Ok(())
    }

    /// Principals double as the quota ledger.
    /// The CHECK constraint is the last line of the `used <= max` invariant.
    async fn create_principals_table(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS principals (
                principal_id VARCHAR(255) PRIMARY KEY,
                token_hash VARCHAR(64) NOT NULL UNIQUE,
                max_storage BIGINT NOT NULL,
                used_storage BIGINT NOT NULL DEFAULT 0,
                root_container_id VARCHAR(255),
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                CHECK (used_storage >= 0 AND used_storage <= max_storage)
            )
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create principals table")?;
        Ok(())
    }

    /// Files and folders. A provider object is indexed at most once, for one owner.
    async fn create_files_table(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id VARCHAR(64) PRIMARY KEY,
                provider_object_id VARCHAR(255) NOT NULL,
                owner_id VARCHAR(255) NOT NULL,
                original_name VARCHAR(255) NOT NULL,
                storage_key VARCHAR(255) NOT NULL,
                size BIGINT NOT NULL,
                mime_type VARCHAR(255) NOT NULL,
                kind VARCHAR(16) NOT NULL,
                thumbnail_ref VARCHAR(255),
                preview_ref VARCHAR(255),
                parent_id VARCHAR(64),
                created_at BIGINT NOT NULL,
                UNIQUE (provider_object_id),
                FOREIGN KEY (owner_id) REFERENCES principals(principal_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create files table")?;
        Ok(())
    }

    /// Create indexes for better query performance
    async fn create_indexes(pool: &PgPool) -> Result<()> {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_parent ON files(owner_id, parent_id)")
            .execute(pool)
            .await
            .context("Failed to create files parent index")?;
        Ok(())
    }
}
