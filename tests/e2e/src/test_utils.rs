use anyhow::{Context, Result};
use common::{CompleteUploadRequest, FileRecord, QuotaResponse};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::time::sleep;

/// Spans three 2 MiB chunks
pub const LARGE_FILE_SIZE: usize = 5_000_000;

pub struct TestFile {
    pub name: String,
    pub path: PathBuf,
    pub content: Vec<u8>,
}

pub fn create_test_files(dir: &Path, small_count: usize) -> Result<Vec<TestFile>> {
    let mut files = Vec::new();
    for i in 0..small_count {
        let name = format!("file{}.txt", i);
        let content = format!("Test file {} content\n", i).into_bytes();
        files.push(write_test_file(dir, &name, content)?);
    }
    let large = (0..LARGE_FILE_SIZE).map(|i| (i % 251) as u8).collect();
    files.push(write_test_file(dir, "large.bin", large)?);
    Ok(files)
}

fn write_test_file(dir: &Path, name: &str, content: Vec<u8>) -> Result<TestFile> {
    let path = dir.join(name);
    fs::write(&path, &content)
        .with_context(|| format!("Failed to create test file: {:?}", path))?;
    Ok(TestFile {
        name: name.to_string(),
        path,
        content,
    })
}

pub async fn wait_for_server(url: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let health_url = format!("{}/health", url);

    println!("Waiting for server to be ready...");
    for i in 0..30 {
        match client.get(&health_url).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    println!("Server is ready!");
                    return Ok(());
                }
            }
            Err(_) => {
                if i < 29 {
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    anyhow::bail!("Server did not become ready within 30 seconds");
}

/// Provision a principal through the server binary and return its bearer token
pub fn add_principal(
    server_binary: &Path,
    storage_args: &[String],
    principal_id: &str,
    max_storage: u64,
) -> Result<String> {
    let output = Command::new(server_binary)
        .args(storage_args)
        .arg("principal")
        .arg("add")
        .arg("--id")
        .arg(principal_id)
        .arg("--max-storage")
        .arg(max_storage.to_string())
        .output()
        .with_context(|| format!("Failed to run server binary: {:?}", server_binary))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to add principal: {}", stderr);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let token = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .context("Server printed no token")?;
    Ok(token.to_string())
}

fn client_command(client_binary: &Path, client_data_dir: &Path, server_url: &str, token: &str) -> Command {
    let mut command = Command::new(client_binary);
    command
        .arg("--server")
        .arg(server_url)
        .arg("--data-dir")
        .arg(client_data_dir)
        .env("CLOUD_TOKEN", token);
    command
}

pub fn upload_files(
    client_binary: &Path,
    client_data_dir: &Path,
    files: &[TestFile],
    server_url: &str,
    token: &str,
) -> Result<()> {
    let output = client_command(client_binary, client_data_dir, server_url, token)
        .arg("upload")
        .args(files.iter().map(|f| &f.path))
        .output()
        .with_context(|| "Failed to run upload command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        anyhow::bail!("Upload failed:\nSTDOUT: {}\nSTDERR: {}", stdout, stderr);
    }

    println!("Upload completed successfully");
    Ok(())
}

/// Ask the client for signed links and return the view URL
pub fn share_file(
    client_binary: &Path,
    client_data_dir: &Path,
    server_url: &str,
    token: &str,
    file_id: &str,
) -> Result<String> {
    let output = client_command(client_binary, client_data_dir, server_url, token)
        .arg("share")
        .arg(file_id)
        .arg("--ttl")
        .arg("5")
        .output()
        .with_context(|| "Failed to run share command")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Share failed:\nSTDOUT: {}\nSTDERR: {}", stdout, stderr);
    }

    stdout
        .lines()
        .find_map(|l| l.strip_prefix("View:"))
        .map(|url| url.trim().to_string())
        .context("Share output carried no view link")
}

/// Map of original file name to server file id, read from the persisted queue
pub fn completed_uploads(client_data_dir: &Path) -> Result<Vec<(String, String)>> {
    let queue_file = client_data_dir.join("upload_queue.json");
    let queue: Value = serde_json::from_str(
        &fs::read_to_string(&queue_file)
            .with_context(|| format!("Failed to read queue from {:?}", queue_file))?,
    )?;
    let items = queue["queue"]
        .as_array()
        .context("Invalid upload_queue.json: missing queue array")?;

    let mut completed = Vec::new();
    for item in items {
        let name = item["fileName"].as_str().unwrap_or_default();
        if item["status"] != "completed" || item["progress"] != 100 {
            anyhow::bail!("Upload {} did not complete: {}", name, item);
        }
        let file_id = item["fileId"]
            .as_str()
            .with_context(|| format!("Completed upload {} has no fileId", name))?;
        completed.push((name.to_string(), file_id.to_string()));
    }
    Ok(completed)
}

/// Fetch a signed link and compare the body against the original bytes
pub async fn validate_signed_link(server_url: &str, view_url: &str, expected: &[u8]) -> Result<()> {
    // Links are built from PUBLIC_BASE_URL; route them at the server under test
    let path = view_url
        .find("/files/")
        .map(|i| &view_url[i..])
        .context("View link has no /files/ path")?;
    let url = format!("{}{}", server_url, path);
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Signed view returned {}", response.status());
    }
    let disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !disposition.starts_with("inline") {
        anyhow::bail!("Unexpected Content-Disposition: {}", disposition);
    }
    let body = response.bytes().await?;
    if body.as_ref() != expected {
        anyhow::bail!("Signed view body does not match the uploaded file");
    }
    println!("  ✓ Signed view served {} bytes", body.len());

    let tampered = if url.ends_with('0') {
        format!("{}1", &url[..url.len() - 1])
    } else {
        format!("{}0", &url[..url.len() - 1])
    };
    let status = client.get(&tampered).send().await?.status();
    if status.as_u16() != 401 {
        anyhow::bail!("Tampered signature returned {} (expected 401)", status);
    }
    println!("  ✓ Tampered signature rejected");
    Ok(())
}

pub async fn fetch_quota(server_url: &str, token: &str) -> Result<QuotaResponse> {
    let response = reqwest::Client::new()
        .get(format!("{}/quota", server_url))
        .bearer_auth(token)
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

pub async fn fetch_record(server_url: &str, token: &str, file_id: &str) -> Result<FileRecord> {
    let records: Vec<FileRecord> = reqwest::Client::new()
        .get(format!("{}/files", server_url))
        .bearer_auth(token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    records
        .into_iter()
        .find(|r| r.id == file_id)
        .with_context(|| format!("File {} missing from listing", file_id))
}

/// Re-submit a completed upload; the server must answer 200 with the same record
pub async fn validate_idempotent_complete(
    server_url: &str,
    token: &str,
    record: &FileRecord,
) -> Result<()> {
    let request = CompleteUploadRequest {
        drive_file_id: record.drive_file_id.clone(),
        original_name: record.original_name.clone(),
        file_name: record.storage_key.clone(),
        size: record.size,
        mime_type: record.mime_type.clone(),
        parent_id: record.parent_id.clone(),
    };
    let response = reqwest::Client::new()
        .post(format!("{}/files/upload/complete", server_url))
        .bearer_auth(token)
        .json(&request)
        .send()
        .await?;
    if response.status().as_u16() != 200 {
        anyhow::bail!("Repeated completion returned {}", response.status());
    }
    let again: FileRecord = response.json().await?;
    if again.id != record.id {
        anyhow::bail!("Repeated completion created {} instead of {}", again.id, record.id);
    }
    println!("  ✓ Repeated completion returned existing record {}", again.id);
    Ok(())
}

pub async fn delete_file(server_url: &str, token: &str, file_id: &str) -> Result<()> {
    let status = reqwest::Client::new()
        .delete(format!("{}/files/{}", server_url, file_id))
        .bearer_auth(token)
        .send()
        .await?
        .status();
    if status.as_u16() != 204 {
        anyhow::bail!("Delete of {} returned {}", file_id, status);
    }
    Ok(())
}
