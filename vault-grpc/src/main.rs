use std::sync::Arc;

use tokio::signal;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_grpc::auth::JwtAuthenticator;
use vault_grpc::store::LibsqlStore;
use vault_grpc::{FileServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_grpc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    let addr = config.socket_addr()?;
    let transfer = config.transfer_config()?;

    let store = Arc::new(LibsqlStore::open(&config.database_path).await?);
    tracing::info!(path = %config.database_path.display(), "database ready");

    let auth = JwtAuthenticator::new(config.jwt_secret.as_bytes());
    let service = FileServer::new(store, &transfer).into_service(auth);

    tracing::info!(%addr, workers = transfer.workers_count, "vault-grpc v{} listening", env!("CARGO_PKG_VERSION"));
    Server::builder()
        .add_service(service)
        .serve_with_shutdown(addr, shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
