//! Relaygate - session gateway and resilient dispatch sidecar for MCP traffic.
//!
//! Listens on an HTTP endpoint, maintains per-session protocol servers,
//! and forwards tool calls to the remote backend with retry, timeout, and
//! cancellation handling.

use std::sync::Arc;

use clap::Parser;
use relaygate::backend::client::{BackendClient, DispatchConfig};
use relaygate::gateway::{Gateway, GatewayConfig};
use tokio::net::TcpListener;
use tracing::info;

/// Command-line configuration for the gateway server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Port to listen on
    #[arg(short, long, env = "RELAYGATE_PORT", default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "RELAYGATE_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Reject requests that present no credential
    #[arg(long, env = "RELAYGATE_REQUIRE_AUTH")]
    require_auth: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Config::parse();
    let dispatch = DispatchConfig::from_env()?;
    let gateway_config = GatewayConfig {
        listen: format!("{}:{}", cli.bind, cli.port),
        require_auth: cli.require_auth,
        ..GatewayConfig::from_env()
    };

    info!(
        backend = %dispatch.base_url,
        listen = %gateway_config.listen,
        require_auth = gateway_config.require_auth,
        "starting relaygate"
    );

    let client = Arc::new(BackendClient::new(dispatch)?);
    let gateway = Gateway::new(gateway_config.clone(), client);
    let router = gateway.router();

    let listener = TcpListener::bind(&gateway_config.listen).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
