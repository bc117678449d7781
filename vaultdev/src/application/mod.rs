pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use vault_core::Result;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Upload {
            path,
            description,
            mime,
            meta,
            chunk_size,
        } => handlers::handle_upload(&cli.conn, path, description, mime, meta, chunk_size).await,
        Commands::Download { file_id, out } => {
            handlers::handle_download(&cli.conn, file_id, out).await
        }
        Commands::Ls {
            page,
            per_page,
            filter,
        } => handlers::handle_ls(&cli.conn, page, per_page, filter).await,
        Commands::Info { file_id } => handlers::handle_info(&cli.conn, file_id).await,
        Commands::Rm { file_id } => handlers::handle_rm(&cli.conn, file_id).await,
        Commands::Token {
            user,
            secret,
            ttl_secs,
        } => handlers::handle_token(user, secret, ttl_secs),
    }
}
