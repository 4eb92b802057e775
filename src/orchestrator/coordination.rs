//! Cross-agent coordination loop.
//!
//! Runs alongside the per-agent cycle tasks: every tick it checks for
//! conditions that need more than one agent (currently the pollution
//! rule) and refreshes the aggregate system entry in shared memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::agent::{monitoring, Agent};
use crate::memory::SharedMemory;

const COORDINATION_INTERVAL: Duration = Duration::from_secs(30);
const COORDINATION_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Tick immediately, then every [`COORDINATION_INTERVAL`]. A failing tick
/// backs off for a shorter window before trying again.
pub async fn run(
    agents: Vec<Arc<dyn Agent>>,
    memory: SharedMemory,
    running: Arc<AtomicBool>,
    started_at: DateTime<Utc>,
) {
    while running.load(Ordering::SeqCst) {
        match tick(&agents, &memory, started_at).await {
            Ok(()) => sleep(COORDINATION_INTERVAL).await,
            Err(e) => {
                error!(error = %format!("{e:#}"), "coordination tick failed");
                sleep(COORDINATION_RETRY_BACKOFF).await;
            }
        }
    }
}

async fn tick(
    agents: &[Arc<dyn Agent>],
    memory: &SharedMemory,
    started_at: DateTime<Utc>,
) -> Result<()> {
    check_cross_agent_actions(agents, memory).await?;
    update_system_state(agents, memory, started_at).await;
    Ok(())
}

/// The pollution rule: when the monitoring agent has flagged an active
/// pollution alert, fan its latest data out to every agent that exposes
/// an urgent alert path.
async fn check_cross_agent_actions(
    agents: &[Arc<dyn Agent>],
    memory: &SharedMemory,
) -> Result<()> {
    let Some(monitoring_data) = memory.data(monitoring::NAME).await else {
        return Ok(());
    };
    if !monitoring_data["pollution_alert"].as_bool().unwrap_or(false) {
        return Ok(());
    }

    info!("pollution alert active, dispatching to alert responders");
    for agent in agents {
        if let Some(responder) = agent.alert_responder() {
            debug!(agent = agent.name(), "invoking pollution responder");
            responder.handle_pollution_alert(monitoring_data.clone()).await?;
        }
    }
    Ok(())
}

/// Refresh the aggregate entry under the reserved system key.
async fn update_system_state(
    agents: &[Arc<dyn Agent>],
    memory: &SharedMemory,
    started_at: DateTime<Utc>,
) {
    let agents_running = agents.iter().filter(|a| a.core().is_active()).count();
    let total_actions: u64 = agents.iter().map(|a| a.core().action_count()).sum();

    memory
        .publish_system(json!({
            "timestamp": Utc::now(),
            "agents_running": agents_running,
            "total_actions": total_actions,
            "uptime": started_at,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCore, AlertResponder, CycleOutcome};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicU64;

    struct RespondingAgent {
        core: AgentCore,
        alerts_seen: AtomicU64,
        fail_alert: bool,
    }

    impl RespondingAgent {
        fn new(name: &str, fail_alert: bool) -> Arc<Self> {
            let agent = Self {
                core: AgentCore::new(name, Duration::from_secs(60)),
                alerts_seen: AtomicU64::new(0),
                fail_alert,
            };
            agent.core.activate();
            Arc::new(agent)
        }
    }

    #[async_trait]
    impl Agent for RespondingAgent {
        fn core(&self) -> &AgentCore {
            &self.core
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn execute_cycle(&self, _shared: &SharedMemory) -> Result<CycleOutcome> {
            Ok(CycleOutcome::Completed(json!({})))
        }

        async fn handle_message(&self, _message: Value) -> Result<Value> {
            Ok(json!({}))
        }

        fn alert_responder(&self) -> Option<&dyn AlertResponder> {
            Some(self)
        }
    }

    #[async_trait]
    impl AlertResponder for RespondingAgent {
        async fn handle_pollution_alert(&self, _alert: Value) -> Result<Value> {
            if self.fail_alert {
                return Err(anyhow!("responder down"));
            }
            self.alerts_seen.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"status": "handled"}))
        }
    }

    struct PlainAgent {
        core: AgentCore,
    }

    #[async_trait]
    impl Agent for PlainAgent {
        fn core(&self) -> &AgentCore {
            &self.core
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn execute_cycle(&self, _shared: &SharedMemory) -> Result<CycleOutcome> {
            Ok(CycleOutcome::Completed(json!({})))
        }

        async fn handle_message(&self, _message: Value) -> Result<Value> {
            Ok(json!({}))
        }
    }

    async fn publish_pollution_flag(memory: &SharedMemory, active: bool) {
        memory
            .slot(monitoring::NAME)
            .publish(json!({"pollution_alert": active}))
            .await;
    }

    #[tokio::test]
    async fn test_alert_dispatched_only_to_responders() -> Result<()> {
        let responder = RespondingAgent::new("Responder", false);
        let plain = Arc::new(PlainAgent {
            core: AgentCore::new("Plain", Duration::from_secs(60)),
        });
        let agents: Vec<Arc<dyn Agent>> = vec![responder.clone(), plain];

        let memory = SharedMemory::new();
        publish_pollution_flag(&memory, true).await;

        tick(&agents, &memory, Utc::now()).await?;
        assert_eq!(responder.alerts_seen.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_flag_dispatches_nothing() -> Result<()> {
        let responder = RespondingAgent::new("Responder", false);
        let agents: Vec<Arc<dyn Agent>> = vec![responder.clone()];

        let memory = SharedMemory::new();
        publish_pollution_flag(&memory, false).await;

        tick(&agents, &memory, Utc::now()).await?;
        assert_eq!(responder.alerts_seen.load(Ordering::SeqCst), 0);

        // Same when the monitoring entry is missing entirely
        let empty = SharedMemory::new();
        tick(&agents, &empty, Utc::now()).await?;
        assert_eq!(responder.alerts_seen.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_responder_error_propagates() {
        let responder = RespondingAgent::new("Responder", true);
        let agents: Vec<Arc<dyn Agent>> = vec![responder];

        let memory = SharedMemory::new();
        publish_pollution_flag(&memory, true).await;

        assert!(tick(&agents, &memory, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_system_state_aggregates_agents() -> Result<()> {
        let active = RespondingAgent::new("Active", false);
        active.core.record_action("x", json!({})).await;
        active.core.record_action("y", json!({})).await;
        let idle = Arc::new(PlainAgent {
            core: AgentCore::new("Idle", Duration::from_secs(60)),
        });
        let agents: Vec<Arc<dyn Agent>> = vec![active, idle];

        let memory = SharedMemory::new();
        let started_at = Utc::now();
        tick(&agents, &memory, started_at).await?;

        let system = memory.data(crate::memory::SYSTEM_KEY).await.unwrap();
        assert_eq!(system["agents_running"], 1);
        assert_eq!(system["total_actions"], 2);
        assert_eq!(system["uptime"], json!(started_at));
        Ok(())
    }
}
