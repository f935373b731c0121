//! weather-meter - NWS weather tools billed per call through AgentPay
//!
//! Serves the metered weather MCP server over streamable HTTP (`/mcp`) or
//! stdio, depending on `WEATHER_METER_TRANSPORT`.

use std::time::Duration;

use rmcp::{
    transport::{
        stdio,
        streamable_http_server::{session::local::LocalSessionManager, StreamableHttpService},
        StreamableHttpServerConfig,
    },
    ServiceExt,
};
use rmcp_weather::config::{ServerConfig, Transport};
use rmcp_weather::WeatherServer;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load()?;
    tracing::info!(
        transport = ?config.transport,
        nws = %config.nws_base_url,
        metering = ?config.metering,
        "weather-meter starting..."
    );

    let server = WeatherServer::from_config(&config);

    match config.transport {
        Transport::Stdio => {
            if config.stdio_credential.is_none() {
                tracing::warn!("AGENTPAY_API_KEY not set; every stdio tool call will be rejected");
            }
            let server = server.with_fallback_credential(config.stdio_credential.clone());
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
        }
        Transport::Http => serve_http(server, &config.bind_address()).await?,
    }

    tracing::info!("weather-meter stopped");
    Ok(())
}

async fn serve_http(server: WeatherServer, addr: &str) -> anyhow::Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(15)),
            ..Default::default()
        },
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = axum::Router::new().nest_service("/mcp", service).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("weather-meter MCP endpoint listening on http://{}/mcp", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down server");
        })
        .await?;

    Ok(())
}
