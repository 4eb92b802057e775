//! EcoMind: Autonomous Environmental Intelligence System
//!
//! A multi-agent system for environmental monitoring and action:
//! - Environmental monitoring across city locations
//! - Predictive analysis and autonomous preventive actions
//! - Community campaign coordination
//! - Personalized sustainability coaching

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ecomind::agent::{
    Agent, CommunityCoordinationAgent, EnvironmentalMonitoringAgent, PersonalSustainabilityCoach,
    PredictiveActionAgent,
};
use ecomind::orchestrator::Orchestrator;
use ecomind::server::{app, AppState};

struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("invalid PORT")?,
            Err(_) => 8000,
        };
        Ok(Self { host, port })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = ServerConfig::from_env()?;

    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(EnvironmentalMonitoringAgent::new()),
        Arc::new(PredictiveActionAgent::new()),
        Arc::new(CommunityCoordinationAgent::new()),
        Arc::new(PersonalSustainabilityCoach::new()),
    ];

    let orchestrator = Arc::new(Orchestrator::new(agents));
    orchestrator.start().await?;
    info!("EcoMind agents are now running autonomously");

    let state = AppState {
        orchestrator: orchestrator.clone(),
    };
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.stop().await;
    info!("EcoMind agents stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
