//! Message routing against the real agent set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tokio::time::sleep;

use ecomind::agent::{
    coach, community, monitoring, predictive, CommunityCoordinationAgent,
    EnvironmentalMonitoringAgent, PersonalSustainabilityCoach, PredictiveActionAgent,
};
use ecomind::{Agent, Orchestrator, OrchestratorError};

fn full_system() -> Orchestrator {
    let agents: Vec<Arc<dyn Agent>> = vec![
        Arc::new(EnvironmentalMonitoringAgent::new()),
        Arc::new(PredictiveActionAgent::new()),
        Arc::new(CommunityCoordinationAgent::new()),
        Arc::new(PersonalSustainabilityCoach::new()),
    ];
    Orchestrator::new(agents)
}

#[tokio::test(start_paused = true)]
async fn routes_messages_to_each_agent() -> Result<()> {
    let orchestrator = full_system();
    orchestrator.start().await?;
    sleep(Duration::from_millis(1)).await;

    // Monitoring published its first cycle, so current data is available
    let data = orchestrator
        .send_message_to_agent(monitoring::NAME, json!({"type": "get_current_data"}))
        .await?;
    assert_eq!(data.as_array().unwrap().len(), 3);

    let predictions = orchestrator
        .send_message_to_agent(predictive::NAME, json!({"type": "get_predictions"}))
        .await?;
    assert!(predictions.is_array() || predictions.is_null());

    let stats = orchestrator
        .send_message_to_agent(community::NAME, json!({"type": "get_community_stats"}))
        .await?;
    assert_eq!(stats["total_community_members"], 5);

    let coaching = orchestrator
        .send_message_to_agent(coach::NAME, json!({"type": "get_coaching_stats"}))
        .await?;
    assert_eq!(coaching["total_users"], 2);

    orchestrator.stop().await;
    Ok(())
}

#[tokio::test]
async fn unknown_agent_name_is_an_error() {
    let orchestrator = full_system();
    let result = orchestrator
        .send_message_to_agent("NoSuchAgent", json!({"type": "ping"}))
        .await;
    assert!(matches!(result, Err(OrchestratorError::AgentNotFound(_))));
}

#[tokio::test]
async fn broadcast_reaches_every_agent() -> Result<()> {
    let orchestrator = full_system();
    let responses = orchestrator
        .broadcast_message(json!({"type": "nonsense_probe"}))
        .await;

    let map = responses.as_object().unwrap();
    assert_eq!(map.len(), 4);
    // Every agent answers an unknown type with the canned response
    for response in map.values() {
        assert_eq!(response["status"], "unknown_message_type");
    }
    Ok(())
}

#[tokio::test]
async fn cross_agent_message_shapes_stay_distinct() -> Result<()> {
    let orchestrator = full_system();

    // A community-only message is unknown to the coach and vice versa
    let response = orchestrator
        .send_message_to_agent(coach::NAME, json!({"type": "get_active_campaigns"}))
        .await?;
    assert_eq!(response["status"], "unknown_message_type");

    let response = orchestrator
        .send_message_to_agent(community::NAME, json!({"type": "get_coaching_stats"}))
        .await?;
    assert_eq!(response["status"], "unknown_message_type");
    Ok(())
}
