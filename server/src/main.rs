use clap::Parser;

use tracing_subscriber::fmt;
use tracing::info;

use server::config::ServerConfig;
use server::error::ServerError;
use server::server_listener::ServerListener;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = ServerConfig::parse();

    fmt()
        .compact()
        .with_max_level(config.log_level)
        .init();

    let listener = ServerListener::bind(&config).await?;

    info!("Server starting.. {:?}", listener.local_addr()?);

    listener.run().await;
    Ok(())
}
