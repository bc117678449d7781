use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "vaultdev CLI for the vault file service", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub conn: Connection,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct Connection {
    /// Server endpoint
    #[arg(long, env = "VAULT_ENDPOINT", default_value = "http://127.0.0.1:50051", global = true)]
    pub endpoint: String,

    /// Bearer token (see `vaultdev token`)
    #[arg(long, env = "VAULT_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Sender / writer tasks per transfer
    #[arg(long, default_value_t = 4, global = true)]
    pub workers: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt and upload a file
    Upload {
        path: PathBuf,

        #[arg(long, default_value = "")]
        description: String,

        /// Override the MIME type guessed from the extension
        #[arg(long)]
        mime: Option<String>,

        /// Extra metadata as name=value (repeatable)
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,

        /// Chunk size in bytes
        #[arg(long, default_value_t = 64 * 1024)]
        chunk_size: u32,
    },

    /// Download a file into a directory
    Download {
        file_id: i64,

        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// List your files
    Ls {
        #[arg(long, default_value_t = 1)]
        page: i32,

        #[arg(long, default_value_t = 10)]
        per_page: i32,

        /// Case-insensitive substring filter
        #[arg(long, default_value = "")]
        filter: String,
    },

    /// Show one file's details and metadata
    Info { file_id: i64 },

    /// Delete a file
    Rm { file_id: i64 },

    /// Mint a development token for a user id
    Token {
        #[arg(long)]
        user: i64,

        #[arg(long, env = "VAULT_JWT_SECRET", hide_env_values = true)]
        secret: String,

        #[arg(long, default_value_t = 24 * 60 * 60)]
        ttl_secs: u64,
    },
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("metadata name is empty".into());
    }
    Ok((name.to_string(), value.to_string()))
}
