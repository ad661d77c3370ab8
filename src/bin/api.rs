use financial_plan_agent::{
    api::{start_server, ApiState},
    app::AppContext,
    config::AgentConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;
    let port = config.port;

    info!("Financial Plan Agent - API Server");
    info!("Port: {}", port);

    let context = AppContext::open(config).await?;
    let state = ApiState::from_context(&context);

    info!("Orchestrator initialized");
    info!("Starting API server...");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };

    let served = start_server(state, port, shutdown).await;

    context.close().await?;
    served
}
