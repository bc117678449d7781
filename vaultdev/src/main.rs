mod application;
mod presentation;

use vault_core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    application::run().await
}
