//! Cross-agent coordination through shared memory: the pollution rule and
//! the aggregate system entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{advance, sleep};

use ecomind::agent::{monitoring, AgentCore};
use ecomind::{Agent, AlertResponder, CycleOutcome, Orchestrator, SharedMemory};

struct ResponderStub {
    core: AgentCore,
    alerts: AtomicU64,
}

impl ResponderStub {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            core: AgentCore::new(name, Duration::from_secs(3600)),
            alerts: AtomicU64::new(0),
        })
    }

    fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ResponderStub {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.core.activate();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
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
impl AlertResponder for ResponderStub {
    async fn handle_pollution_alert(&self, alert: Value) -> Result<Value> {
        assert_eq!(alert["pollution_alert"], true);
        self.alerts.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"status": "handled"}))
    }
}

struct QuietStub {
    core: AgentCore,
}

impl QuietStub {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            core: AgentCore::new(name, Duration::from_secs(3600)),
        })
    }
}

#[async_trait]
impl Agent for QuietStub {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.core.activate();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn execute_cycle(&self, _shared: &SharedMemory) -> Result<CycleOutcome> {
        Ok(CycleOutcome::Completed(json!({})))
    }

    async fn handle_message(&self, _message: Value) -> Result<Value> {
        Ok(json!({}))
    }
}

#[tokio::test(start_paused = true)]
async fn pollution_rule_fires_once_per_tick() -> Result<()> {
    let responder = ResponderStub::new("Responder");
    let quiet = QuietStub::new("Quiet");
    let orchestrator = Orchestrator::new(vec![responder.clone(), quiet]);

    // Flag planted before the loops start: the t=0 tick must see it
    orchestrator
        .memory()
        .slot(monitoring::NAME)
        .publish(json!({"pollution_alert": true}))
        .await;

    orchestrator.start().await?;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(responder.alerts(), 1);

    advance(Duration::from_secs(30)).await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(responder.alerts(), 2);

    orchestrator.stop().await;
    advance(Duration::from_secs(120)).await;
    sleep(Duration::from_millis(1)).await;
    assert_eq!(responder.alerts(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pollution_rule_ignores_cleared_flag() -> Result<()> {
    let responder = ResponderStub::new("Responder");
    let orchestrator = Orchestrator::new(vec![responder.clone()]);

    orchestrator
        .memory()
        .slot(monitoring::NAME)
        .publish(json!({"pollution_alert": false}))
        .await;

    orchestrator.start().await?;
    sleep(Duration::from_millis(1)).await;
    advance(Duration::from_secs(60)).await;
    sleep(Duration::from_millis(1)).await;

    assert_eq!(responder.alerts(), 0);
    orchestrator.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn system_entry_aggregates_running_agents() -> Result<()> {
    let responder = ResponderStub::new("Responder");
    let quiet = QuietStub::new("Quiet");
    let orchestrator = Orchestrator::new(vec![responder, quiet]);

    orchestrator.start().await?;
    sleep(Duration::from_millis(1)).await;

    let system = orchestrator
        .memory()
        .data(ecomind::memory::SYSTEM_KEY)
        .await
        .expect("system entry written on first tick");
    assert_eq!(system["agents_running"], 2);
    // The stubs never record actions
    assert_eq!(system["total_actions"], 0);
    assert!(system["uptime"].is_string());

    let status = orchestrator.get_status().await;
    assert_eq!(status["system_info"]["agents_running"], 2);
    assert!(status["shared_memory_keys"]
        .as_array()
        .unwrap()
        .iter()
        .any(|k| k == "system"));

    orchestrator.stop().await;
    Ok(())
}
