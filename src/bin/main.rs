use financial_plan_agent::{
    app::AppContext,
    config::AgentConfig,
    notify::{CollectingSink, TurnSinks},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        "What is AAPL's current price?".to_string()
    } else {
        question
    };

    let config = AgentConfig::from_env()?;
    let context = AppContext::open(config).await?;

    info!(objective = %question, "Running orchestrator");

    let sink = Arc::new(CollectingSink::new());
    let sinks = TurnSinks::shared(sink.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = context
        .orchestrator
        .run_turn_with(&question, &sinks, cancel)
        .await;

    println!("\n=== PROGRESS ===");
    for (label, content) in sink.progress().await {
        println!("[{}]\n{}\n", label.as_deref().unwrap_or("Plan"), content);
    }

    context.close().await?;

    match result {
        Ok(outcome) => {
            println!("=== ANSWER ===");
            println!("Turn ID: {}", outcome.turn_id);
            println!("Steps: {}", outcome.iterations);
            println!("\n{}", outcome.answer);
            Ok(())
        }
        Err(e) => {
            eprintln!("Turn failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
