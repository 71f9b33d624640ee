use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

fn read_json(path: &Path) -> Result<Value> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

/// File records owned by `principal_id`, with the path they live at
fn owned_records(server_data_dir: &Path, principal_id: &str) -> Result<Vec<(std::path::PathBuf, Value)>> {
    let files_dir = server_data_dir.join("files");
    if !files_dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&files_dir)
        .with_context(|| format!("Failed to read files directory: {:?}", files_dir))?
    {
        let path = entry?.path();
        if path.extension().map_or(true, |e| e != "json") {
            continue;
        }
        let record = read_json(&path)?;
        if record["owner_id"] == principal_id {
            records.push((path, record));
        }
    }
    Ok(records)
}

pub fn validate_upload(
    server_data_dir: &Path,
    principal_id: &str,
    expected_sizes: &[u64],
) -> Result<()> {
    // Validate principal record
    let principal_file = server_data_dir
        .join("principals")
        .join(format!("{}.json", principal_id));
    if !principal_file.exists() {
        anyhow::bail!("Principal record not found: {:?}", principal_file);
    }
    let principal = read_json(&principal_file)?;

    let root_container = principal["root_container_id"]
        .as_str()
        .with_context(|| format!("Principal {} has no root container", principal_id))?;
    println!(
        "  ✓ Principal {} owns root container {}",
        principal_id, root_container
    );

    // Validate file records
    let records = owned_records(server_data_dir, principal_id)?;
    let files: Vec<&Value> = records
        .iter()
        .map(|(_, r)| r)
        .filter(|r| r["kind"] == "file")
        .collect();

    if files.len() != expected_sizes.len() {
        anyhow::bail!(
            "Expected {} file records, found {}",
            expected_sizes.len(),
            files.len()
        );
    }

    println!(
        "  ✓ Found {} file records (expected {})",
        files.len(),
        expected_sizes.len()
    );

    let mut recorded_sizes: Vec<u64> = files.iter().filter_map(|r| r["size"].as_u64()).collect();
    let mut expected: Vec<u64> = expected_sizes.to_vec();
    recorded_sizes.sort_unstable();
    expected.sort_unstable();
    if recorded_sizes != expected {
        anyhow::bail!(
            "Recorded sizes {:?} do not match uploaded sizes {:?}",
            recorded_sizes,
            expected
        );
    }

    println!("  ✓ Recorded sizes match uploaded files");

    // Quota matches the stored sizes
    let expected_total: u64 = expected.iter().sum();
    let used_storage = principal["quota"]["used_storage"]
        .as_u64()
        .context("Principal record has no quota.used_storage")?;
    if used_storage != expected_total {
        anyhow::bail!(
            "Expected used_storage {}, found {}",
            expected_total,
            used_storage
        );
    }

    println!("  ✓ used_storage {} matches stored file sizes", used_storage);
    Ok(())
}

pub fn validate_client_queue(client_data_dir: &Path, expected_count: usize) -> Result<()> {
    let queue_file = client_data_dir.join("upload_queue.json");
    if !queue_file.exists() {
        anyhow::bail!("Upload queue not found: {:?}", queue_file);
    }
    let queue = read_json(&queue_file)?;

    let items = queue["queue"]
        .as_array()
        .context("Invalid upload_queue.json: missing queue array")?;
    if items.len() != expected_count {
        anyhow::bail!(
            "Expected {} queued uploads, found {}",
            expected_count,
            items.len()
        );
    }

    // Finished items keep no resumable session
    if let Some(item) = items.iter().find(|i| !i["sessionUrl"].is_null()) {
        anyhow::bail!("Completed upload still holds a session: {}", item);
    }

    println!("  ✓ Queue holds {} finished uploads", items.len());
    Ok(())
}

pub fn cleanup_server_data(server_data_dir: &Path, principal_id: &str) -> Result<()> {
    let keep_data = std::env::var("KEEP_TEST_DATA").unwrap_or_else(|_| "false".to_string());
    if keep_data == "true" {
        println!(
            "\n⚠️  Keeping server data (KEEP_TEST_DATA=true): {:?}",
            server_data_dir
        );
        return Ok(());
    }

    println!(
        "\n🧹 Cleaning up server data for principal {}: {:?}",
        principal_id, server_data_dir
    );
    for (path, _) in owned_records(server_data_dir, principal_id)? {
        fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
    }
    let principal_file = server_data_dir
        .join("principals")
        .join(format!("{}.json", principal_id));
    if principal_file.exists() {
        fs::remove_file(&principal_file)
            .with_context(|| format!("Failed to remove {:?}", principal_file))?;
    }
    println!("✅ Server data cleaned up");
    Ok(())
}
