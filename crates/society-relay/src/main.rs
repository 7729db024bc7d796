use std::net::SocketAddr;

use tracing::info;

use society_relay::{RelayState, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "society=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("SOCIETY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let host = std::env::var("SOCIETY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("SOCIETY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Society relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, RelayState::new(jwt_secret)).await?;

    Ok(())
}
