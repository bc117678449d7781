use std::path::PathBuf;
use std::time::Duration;

use vault_core::{Result, UserId, VaultError};
use vault_grpc::auth::TokenIssuer;
use vault_grpc::client::UploadOptions;
use vault_grpc::{ClientOptions, VaultClient};

use crate::presentation::cli::Connection;

fn client_options(conn: &Connection) -> Result<ClientOptions> {
    let token = conn
        .token
        .clone()
        .ok_or_else(|| VaultError::Config("no token: pass --token or set VAULT_TOKEN".into()))?;
    let mut opts = ClientOptions::new(conn.endpoint.clone(), token);
    opts.pool_size = conn.workers;
    Ok(opts)
}

async fn connect(conn: &Connection) -> Result<VaultClient> {
    VaultClient::connect(client_options(conn)?).await
}

pub async fn handle_upload(
    conn: &Connection,
    path: PathBuf,
    description: String,
    mime: Option<String>,
    meta: Vec<(String, String)>,
    chunk_size: u32,
) -> Result<()> {
    let mut opts = client_options(conn)?;
    opts.chunk_size = chunk_size;
    let mut client = VaultClient::connect(opts).await?;
    let upload = UploadOptions {
        description,
        mime_type: mime,
        meta,
    };
    let resp = client.upload_path(&path, &upload).await?;
    eprintln!(
        "upload: {} -> id={} ({} bytes)",
        path.display(),
        resp.file_id,
        resp.bytes_received
    );
    println!("{}", resp.file_id);
    Ok(())
}

pub async fn handle_download(conn: &Connection, file_id: i64, out: PathBuf) -> Result<()> {
    let mut client = connect(conn).await?;
    let outcome = client.download(file_id, &out).await?;
    eprintln!(
        "download: id={} -> {} ({} bytes)",
        file_id,
        outcome.path.display(),
        outcome.bytes_written
    );
    Ok(())
}

pub async fn handle_ls(conn: &Connection, page: i32, per_page: i32, filter: String) -> Result<()> {
    let mut client = connect(conn).await?;
    let resp = client.list(page, per_page, &filter).await?;
    for f in &resp.files {
        println!(
            "{:>6}  {:>12}  {:<24}  {}  {}",
            f.id, f.size, f.mime_type, f.created_at, f.filename
        );
    }
    eprintln!(
        "page {}/{} ({} files)",
        resp.current_page, resp.total_pages, resp.total_count
    );
    Ok(())
}

pub async fn handle_info(conn: &Connection, file_id: i64) -> Result<()> {
    let mut client = connect(conn).await?;
    let info = client.info(file_id).await?;
    println!("id:          {}", info.id);
    println!("filename:    {}", info.filename);
    println!("mime:        {}", info.mime_type);
    println!("size:        {}", info.size);
    println!("created:     {}", info.created_at);
    if !info.description.is_empty() {
        println!("description: {}", info.description);
    }
    for m in &info.meta_data {
        println!("meta:        {}={}", m.name, m.value);
    }
    Ok(())
}

pub async fn handle_rm(conn: &Connection, file_id: i64) -> Result<()> {
    let mut client = connect(conn).await?;
    if client.delete(file_id).await? {
        eprintln!("rm: {}", file_id);
    }
    Ok(())
}

pub fn handle_token(user: i64, secret: String, ttl_secs: u64) -> Result<()> {
    let token = TokenIssuer::new(secret.as_bytes(), Duration::from_secs(ttl_secs)).issue(UserId(user))?;
    println!("{token}");
    Ok(())
}
