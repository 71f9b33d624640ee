use crate::models::{FileKind, FileMetadata, QuotaRecord};
use anyhow::{Context, Result};

/// Row layout shared by every `SELECT ... FROM files`
pub type FileRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

const FILE_COLUMNS: &str = "id, provider_object_id, owner_id, original_name, storage_key, size, \
     mime_type, kind, thumbnail_ref, preview_ref, parent_id, created_at";

/// Postgres has no unsigned integers; sizes are stored as BIGINT
pub fn to_db(value: u64) -> Result<i64> {
    i64::try_from(value).context("Value does not fit in BIGINT")
}

pub fn from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn kind_to_db(kind: FileKind) -> &'static str {
    match kind {
        FileKind::File => "file",
        FileKind::Folder => "folder",
    }
}

pub fn file_from_row(row: FileRow) -> Result<FileMetadata> {
    let (
        id,
        provider_object_id,
        owner_id,
        original_name,
        storage_key,
        size,
        mime_type,
        kind,
        thumbnail_ref,
        preview_ref,
        parent_id,
        created_at,
    ) = row;
    let kind = match kind.as_str() {
        "file" => FileKind::File,
        "folder" => FileKind::Folder,
        other => anyhow::bail!("Unknown file kind in database: {}", other),
    };
    Ok(FileMetadata {
        id,
        provider_object_id,
        owner_id,
        original_name,
        storage_key,
        size: from_db(size),
        mime_type,
        kind,
        thumbnail_ref,
        preview_ref,
        parent_id,
        created_at: from_db(created_at),
    })
}

/// Query operations for database storage
pub struct Queries;

impl Queries {
    /// Insert a principal; `false` if the id or token is taken
    pub async fn insert_principal(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
        token_hash: &str,
        max_storage: u64,
    ) -> Result<bool> {
        let row = sqlx::query_as::<_, (String,)>(
            "INSERT INTO principals (principal_id, token_hash, max_storage, used_storage)
             VALUES ($1, $2, $3, 0)
             ON CONFLICT DO NOTHING
             RETURNING principal_id",
        )
        .bind(principal_id)
        .bind(token_hash)
        .bind(to_db(max_storage)?)
        .fetch_optional(pool)
        .await
        .context("Failed to insert principal")?;
        Ok(row.is_some())
    }

    pub async fn principal_for_token(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        token_hash: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT principal_id FROM principals WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .context("Failed to look up token")?;
        Ok(row.map(|(id,)| id))
    }

    /// `(max_storage, used_storage, root_container_id)`
    pub async fn load_principal(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
    ) -> Result<Option<(QuotaRecord, Option<String>)>> {
        let row = sqlx::query_as::<_, (i64, i64, Option<String>)>(
            "SELECT max_storage, used_storage, root_container_id
             FROM principals WHERE principal_id = $1",
        )
        .bind(principal_id)
        .fetch_optional(pool)
        .await
        .context("Failed to load principal")?;

        Ok(row.map(|(max, used, root)| {
            (
                QuotaRecord {
                    max_storage: from_db(max),
                    used_storage: from_db(used),
                },
                root,
            )
        }))
    }

    pub async fn set_root_container(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
        container_id: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            "UPDATE principals SET root_container_id = COALESCE(root_container_id, $2)
             WHERE principal_id = $1
             RETURNING root_container_id",
        )
        .bind(principal_id)
        .bind(container_id)
        .fetch_optional(pool)
        .await
        .context("Failed to set root container")?;
        Ok(row.map(|(root,)| root))
    }

    /// Conditional increment: matches no row when the charge would overrun
    /// the limit (or the principal does not exist)
    pub async fn try_charge(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
        bytes: u64,
    ) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "UPDATE principals SET used_storage = used_storage + $2
             WHERE principal_id = $1 AND used_storage + $2 <= max_storage
             RETURNING max_storage, used_storage",
        )
        .bind(principal_id)
        .bind(to_db(bytes)?)
        .fetch_optional(pool)
        .await
        .context("Failed to charge quota")?;

        Ok(row.map(|(max, used)| QuotaRecord {
            max_storage: from_db(max),
            used_storage: from_db(used),
        }))
    }

    pub async fn release(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
        bytes: u64,
    ) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "UPDATE principals SET used_storage = GREATEST(used_storage - $2, 0)
             WHERE principal_id = $1
             RETURNING max_storage, used_storage",
        )
        .bind(principal_id)
        .bind(to_db(bytes)?)
        .fetch_optional(pool)
        .await
        .context("Failed to release quota")?;

        Ok(row.map(|(max, used)| QuotaRecord {
            max_storage: from_db(max),
            used_storage: from_db(used),
        }))
    }

    pub async fn recompute_usage(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        principal_id: &str,
    ) -> Result<Option<QuotaRecord>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "UPDATE principals SET used_storage = (
                 SELECT COALESCE(SUM(size), 0)::BIGINT FROM files
                 WHERE owner_id = $1 AND kind = 'file'
             )
             WHERE principal_id = $1
             RETURNING max_storage, used_storage",
        )
        .bind(principal_id)
        .fetch_optional(pool)
        .await
        .context("Failed to recompute usage")?;

        Ok(row.map(|(max, used)| QuotaRecord {
            max_storage: from_db(max),
            used_storage: from_db(used),
        }))
    }

    /// Insert a file row; `false` if the provider object is already indexed
    pub async fn insert_file(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        file: &FileMetadata,
    ) -> Result<bool> {
        let row = sqlx::query_as::<_, (String,)>(
            "INSERT INTO files (id, provider_object_id, owner_id, original_name, storage_key,
                 size, mime_type, kind, thumbnail_ref, preview_ref, parent_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (provider_object_id) DO NOTHING
             RETURNING id",
        )
        .bind(&file.id)
        .bind(&file.provider_object_id)
        .bind(&file.owner_id)
        .bind(&file.original_name)
        .bind(&file.storage_key)
        .bind(to_db(file.size)?)
        .bind(&file.mime_type)
        .bind(kind_to_db(file.kind))
        .bind(&file.thumbnail_ref)
        .bind(&file.preview_ref)
        .bind(&file.parent_id)
        .bind(to_db(file.created_at)?)
        .fetch_optional(pool)
        .await
        .context("Failed to insert file")?;
        Ok(row.is_some())
    }

    pub async fn find_file(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        id: &str,
    ) -> Result<Option<FileMetadata>> {
        let sql = format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS);
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to query file")?;
        row.map(file_from_row).transpose()
    }

    pub async fn find_by_provider_object(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        provider_object_id: &str,
    ) -> Result<Option<FileMetadata>> {
        let sql = format!(
            "SELECT {} FROM files WHERE provider_object_id = $1",
            FILE_COLUMNS
        );
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(provider_object_id)
            .fetch_optional(pool)
            .await
            .context("Failed to query file by provider object")?;
        row.map(file_from_row).transpose()
    }

    pub async fn list_children(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<FileMetadata>> {
        let sql = format!(
            "SELECT {} FROM files
             WHERE owner_id = $1 AND parent_id IS NOT DISTINCT FROM $2
             ORDER BY created_at, id",
            FILE_COLUMNS
        );
        let rows = sqlx::query_as::<_, FileRow>(&sql)
            .bind(owner_id)
            .bind(parent_id)
            .fetch_all(pool)
            .await
            .context("Failed to list files")?;
        rows.into_iter().map(file_from_row).collect()
    }

    pub async fn delete_file(
        pool: impl sqlx::Executor<'_, Database = sqlx::Postgres>,
        id: &str,
    ) -> Result<Option<FileMetadata>> {
        let sql = format!("DELETE FROM files WHERE id = $1 RETURNING {}", FILE_COLUMNS);
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to delete file")?;
        row.map(file_from_row).transpose()
    }
}
