use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn validate_upload(
    database_url: &str,
    principal_id: &str,
    expected_sizes: &[u64],
) -> Result<()> {
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    // Validate principal exists and owns a root container
    let root_container: Option<Option<String>> = sqlx::query_scalar(
        "SELECT root_container_id FROM principals WHERE principal_id = $1",
    )
    .bind(principal_id)
    .fetch_optional(&pool)
    .await
    .context("Failed to look up principal")?;

    match root_container {
        None => anyhow::bail!("Principal {} not found in database", principal_id),
        Some(None) => anyhow::bail!("Principal {} has no root container", principal_id),
        Some(Some(id)) => println!("  ✓ Principal {} owns root container {}", principal_id, id),
    }

    // Validate files count
    let file_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM files WHERE owner_id = $1 AND kind = 'file'",
    )
    .bind(principal_id)
    .fetch_one(&pool)
    .await
    .context("Failed to count files")?;

    if file_count != expected_sizes.len() as i64 {
        anyhow::bail!(
            "Expected {} files, found {} in database",
            expected_sizes.len(),
            file_count
        );
    }

    println!(
        "  ✓ Found {} file records (expected {})",
        file_count,
        expected_sizes.len()
    );

    // Every provider object is indexed once
    let distinct_objects: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT provider_object_id) FROM files WHERE owner_id = $1 AND kind = 'file'",
    )
    .bind(principal_id)
    .fetch_one(&pool)
    .await
    .context("Failed to count provider objects")?;

    if distinct_objects != file_count {
        anyhow::bail!(
            "{} file records point at only {} provider objects",
            file_count,
            distinct_objects
        );
    }

    println!("  ✓ No provider object is indexed twice");

    // Quota matches the stored sizes
    let expected_total: u64 = expected_sizes.iter().sum();
    let recorded_total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(size), 0)::BIGINT FROM files WHERE owner_id = $1 AND kind = 'file'",
    )
    .bind(principal_id)
    .fetch_one(&pool)
    .await
    .context("Failed to sum file sizes")?;

    let used_storage: i64 =
        sqlx::query_scalar("SELECT used_storage FROM principals WHERE principal_id = $1")
            .bind(principal_id)
            .fetch_one(&pool)
            .await
            .context("Failed to read used storage")?;

    if recorded_total != expected_total as i64 || used_storage != expected_total as i64 {
        anyhow::bail!(
            "Expected {} bytes, files sum to {} and used_storage is {}",
            expected_total,
            recorded_total,
            used_storage
        );
    }

    println!("  ✓ used_storage {} matches stored file sizes", used_storage);

    pool.close().await;
    Ok(())
}

pub async fn cleanup_test_data(database_url: &str, principal_id: &str) -> Result<()> {
    let keep_data = std::env::var("KEEP_TEST_DATA").unwrap_or_else(|_| "false".to_string());
    if keep_data == "true" {
        println!(
            "\n⚠️  Keeping database test data (KEEP_TEST_DATA=true) for principal {}",
            principal_id
        );
        return Ok(());
    }

    println!("\n🧹 Cleaning up database test data for principal {}", principal_id);
    let pool = PgPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    // File rows go with the principal (ON DELETE CASCADE)
    sqlx::query("DELETE FROM principals WHERE principal_id = $1")
        .bind(principal_id)
        .execute(&pool)
        .await
        .context("Failed to delete principal")?;

    pool.close().await;
    println!("✅ Database test data cleaned up");
    Ok(())
}
