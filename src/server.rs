//! HTTP API over the running orchestrator.
//!
//! Read endpoints serve straight from shared memory; anything that talks
//! to a specific agent goes through the orchestrator's messaging surface.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{community, monitoring, predictive};
use crate::orchestrator::{Orchestrator, OrchestratorError};

struct ServerError(anyhow::Error);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<OrchestratorError>() {
            Some(OrchestratorError::AgentNotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": format!("{:#}", self.0) }))).into_response()
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Deserialize)]
struct MessageRequest {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    data: serde_json::Map<String, Value>,
}

impl MessageRequest {
    fn into_message(self) -> Value {
        let mut message = self.data;
        message.insert("type".to_string(), json!(self.message_type));
        Value::Object(message)
    }
}

#[derive(Deserialize)]
struct CampaignJoin {
    user_info: Value,
}

#[derive(Deserialize)]
struct CampaignActionQuery {
    action_id: String,
    user_id: String,
}

#[derive(Deserialize)]
struct ActionCompletion {
    action: String,
    #[serde(rename = "type", default = "default_action_type")]
    action_type: String,
    #[serde(default = "default_points")]
    points: u32,
    #[serde(default = "default_impact_points")]
    impact_points: u32,
}

fn default_action_type() -> String {
    "general".to_string()
}

fn default_points() -> u32 {
    10
}

fn default_impact_points() -> u32 {
    5
}

pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/dashboard", get(system_dashboard))
        .route("/environmental/current", get(environmental_current))
        .route("/environmental/predictions", get(environmental_predictions))
        .route("/community/campaigns", get(community_campaigns))
        .route("/community/campaigns/{campaign_id}/join", post(join_campaign))
        .route(
            "/community/campaigns/{campaign_id}/complete_action",
            post(complete_campaign_action),
        )
        .route("/coaching/users/{user_id}/dashboard", get(user_dashboard))
        .route(
            "/coaching/users/{user_id}/recommendations",
            get(user_recommendations),
        )
        .route(
            "/coaching/users/{user_id}/complete_action",
            post(complete_user_action),
        )
        .route("/coaching/users/{user_id}/profile", put(update_user_profile))
        .route("/agents/status", get(agents_status))
        .route("/agents/{agent_name}/message", post(message_agent))
        .route("/system/broadcast", post(broadcast))
        .route("/analytics/environmental", get(environmental_analytics))
        .route("/analytics/community", get(community_analytics))
        .route("/analytics/coaching", get(coaching_analytics));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agents_running": state.orchestrator.is_running(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn system_dashboard(State(state): State<AppState>) -> Json<Value> {
    let memory = state.orchestrator.memory();
    let monitoring_data = memory.data(monitoring::NAME).await.unwrap_or(json!({}));
    let community_data = memory.data(community::NAME).await.unwrap_or(json!({}));

    let total_participants: usize = community_data["active_campaigns"]
        .as_array()
        .map(|campaigns| {
            campaigns
                .iter()
                .map(|c| c["current_participants"].as_array().map(Vec::len).unwrap_or(0))
                .sum()
        })
        .unwrap_or(0);

    Json(json!({
        "system_status": state.orchestrator.get_status().await,
        "environmental_summary": {
            "average_aqi": monitoring_data["analysis"]["average_aqi"].as_f64().unwrap_or(0.0),
            "active_alerts": monitoring_data["alerts"].as_array().map(Vec::len).unwrap_or(0),
            "monitoring_locations": monitoring_data["environmental_data"].as_array().map(Vec::len).unwrap_or(0),
        },
        "community_summary": {
            "active_campaigns": community_data["active_campaigns"].as_array().map(Vec::len).unwrap_or(0),
            "total_participants": total_participants,
        },
        "timestamp": Utc::now(),
    }))
}

async fn environmental_current(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    let Some(data) = state.orchestrator.memory().data(monitoring::NAME).await else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(json!({
        "environmental_data": data["environmental_data"],
        "analysis": data["analysis"],
        "alerts": data["alerts"],
        "timestamp": data["timestamp"],
    })))
}

async fn environmental_predictions(State(state): State<AppState>) -> Json<Value> {
    let data = state
        .orchestrator
        .memory()
        .data(predictive::NAME)
        .await
        .unwrap_or(json!({}));
    Json(json!({
        "predictions": data["predictions"],
        "actions_taken": data["actions_taken"],
        "model_status": data["model_status"],
        "timestamp": data["timestamp"],
    }))
}

async fn community_campaigns(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(community::NAME, json!({"type": "get_active_campaigns"}))
        .await?;
    Ok(Json(json!({"campaigns": response})))
}

async fn join_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(request): Json<CampaignJoin>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(
            community::NAME,
            json!({
                "type": "join_campaign",
                "campaign_id": campaign_id,
                "user_info": request.user_info,
            }),
        )
        .await?;
    Ok(Json(response))
}

async fn complete_campaign_action(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Query(query): Query<CampaignActionQuery>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(
            community::NAME,
            json!({
                "type": "complete_action",
                "campaign_id": campaign_id,
                "action_id": query.action_id,
                "user_id": query.user_id,
            }),
        )
        .await?;
    Ok(Json(response))
}

async fn user_dashboard(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Response, ServerError> {
    let dashboard = state
        .orchestrator
        .send_message_to_agent(
            crate::agent::coach::NAME,
            json!({"type": "get_user_dashboard", "user_id": user_id}),
        )
        .await?;
    if dashboard.get("error").is_some() {
        return Ok((StatusCode::NOT_FOUND, Json(dashboard)).into_response());
    }
    Ok(Json(dashboard).into_response())
}

async fn user_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(
            crate::agent::coach::NAME,
            json!({"type": "get_user_recommendations", "user_id": user_id}),
        )
        .await?;
    Ok(Json(json!({"recommendations": response})))
}

async fn complete_user_action(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(action): Json<ActionCompletion>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(
            crate::agent::coach::NAME,
            json!({
                "type": "complete_action",
                "user_id": user_id,
                "action_data": {
                    "action": action.action,
                    "type": action.action_type,
                    "points": action.points,
                    "impact_points": action.impact_points,
                },
            }),
        )
        .await?;
    Ok(Json(response))
}

async fn update_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(updates): Json<Value>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(
            crate::agent::coach::NAME,
            json!({
                "type": "update_user_profile",
                "user_id": user_id,
                "profile_updates": updates,
            }),
        )
        .await?;
    Ok(Json(response))
}

async fn agents_status(State(state): State<AppState>) -> Json<Value> {
    Json(state.orchestrator.get_status().await)
}

async fn message_agent(
    State(state): State<AppState>,
    Path(agent_name): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<Value>, ServerError> {
    let response = state
        .orchestrator
        .send_message_to_agent(&agent_name, request.into_message())
        .await?;
    Ok(Json(json!({"response": response})))
}

async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Json<Value> {
    let responses = state.orchestrator.broadcast_message(request.into_message()).await;
    Json(json!({"responses": responses}))
}

async fn environmental_analytics(State(state): State<AppState>) -> Json<Value> {
    let memory = state.orchestrator.memory();
    let monitoring_data = memory.data(monitoring::NAME).await.unwrap_or(json!({}));
    let predictive_data = memory.data(predictive::NAME).await.unwrap_or(json!({}));

    Json(json!({
        "air_quality_trend": aqi_trend(&monitoring_data["environmental_data"]),
        "pollution_hotspots": monitoring_data["analysis"]["pollution_hotspots"],
        "prediction_accuracy": prediction_accuracy(&predictive_data["model_status"]),
        "environmental_alerts_summary": summarize_alerts(&monitoring_data["alerts"]),
        "timestamp": Utc::now(),
    }))
}

async fn community_analytics(State(state): State<AppState>) -> Json<Value> {
    let community_data = state
        .orchestrator
        .memory()
        .data(community::NAME)
        .await
        .unwrap_or(json!({}));
    let campaigns = &community_data["active_campaigns"];

    Json(json!({
        "engagement_metrics": community_data["engagement_metrics"],
        "campaign_success_rates": campaign_success_rates(campaigns),
        "participation_trends": participation_trends(campaigns),
        "impact_metrics": community_impact(campaigns),
        "timestamp": Utc::now(),
    }))
}

async fn coaching_analytics(
    State(state): State<AppState>,
) -> Result<Json<Value>, ServerError> {
    let stats = state
        .orchestrator
        .send_message_to_agent(crate::agent::coach::NAME, json!({"type": "get_coaching_stats"}))
        .await?;
    Ok(Json(json!({
        "coaching_stats": stats,
        "timestamp": Utc::now(),
    })))
}

fn aqi_trend(environmental_data: &Value) -> &'static str {
    let aqi_values: Vec<f64> = environmental_data
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry["air_quality"]["aqi"].as_f64())
                .collect()
        })
        .unwrap_or_default();

    if aqi_values.len() < 2 {
        return "insufficient_data";
    }

    let recent = &aqi_values[aqi_values.len().saturating_sub(3)..];
    let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;
    let earlier = &aqi_values[..aqi_values.len().saturating_sub(3)];
    let earlier_avg = if earlier.is_empty() {
        recent_avg
    } else {
        earlier.iter().sum::<f64>() / earlier.len() as f64
    };

    if recent_avg > earlier_avg + 5.0 {
        "worsening"
    } else if recent_avg < earlier_avg - 5.0 {
        "improving"
    } else {
        "stable"
    }
}

fn prediction_accuracy(model_status: &Value) -> f64 {
    let Some(models) = model_status.as_object() else {
        return 0.0;
    };
    if models.is_empty() {
        return 0.0;
    }
    let sum: f64 = models
        .values()
        .map(|model| model["accuracy"].as_f64().unwrap_or(0.0))
        .sum();
    sum / models.len() as f64
}

fn summarize_alerts(alerts: &Value) -> Value {
    let Some(alerts) = alerts.as_array() else {
        return json!({"total": 0, "by_severity": {}, "by_type": {}});
    };

    let mut by_severity = serde_json::Map::new();
    let mut by_type = serde_json::Map::new();
    for alert in alerts {
        for (bucket, field) in [(&mut by_severity, "severity"), (&mut by_type, "type")] {
            let key = alert[field].as_str().unwrap_or("unknown").to_string();
            let count = bucket.get(&key).and_then(Value::as_u64).unwrap_or(0);
            bucket.insert(key, json!(count + 1));
        }
    }

    json!({
        "total": alerts.len(),
        "by_severity": by_severity,
        "by_type": by_type,
    })
}

fn campaign_success_rates(campaigns: &Value) -> Value {
    let Some(campaigns) = campaigns.as_array() else {
        return json!({"overall": 0.0, "by_type": {}});
    };
    if campaigns.is_empty() {
        return json!({"overall": 0.0, "by_type": {}});
    }

    let mut by_type: std::collections::HashMap<String, Vec<f64>> = std::collections::HashMap::new();
    for campaign in campaigns {
        let target = campaign["target_participants"].as_u64().unwrap_or(1).max(1);
        let current = campaign["current_participants"].as_array().map(Vec::len).unwrap_or(0);
        let rate = current as f64 / target as f64 * 100.0;
        by_type
            .entry(campaign["type"].as_str().unwrap_or("unknown").to_string())
            .or_default()
            .push(rate);
    }

    let all_rates: Vec<f64> = by_type.values().flatten().copied().collect();
    let overall = all_rates.iter().sum::<f64>() / all_rates.len() as f64;
    let type_averages: serde_json::Map<String, Value> = by_type
        .into_iter()
        .map(|(campaign_type, rates)| {
            let avg = rates.iter().sum::<f64>() / rates.len() as f64;
            (campaign_type, json!(avg))
        })
        .collect();

    json!({"overall": overall, "by_type": type_averages})
}

fn participation_trends(campaigns: &Value) -> Value {
    let Some(campaigns) = campaigns.as_array() else {
        return json!({"total_participants": 0, "average_per_campaign": 0});
    };
    if campaigns.is_empty() {
        return json!({"total_participants": 0, "average_per_campaign": 0});
    }

    let total: usize = campaigns
        .iter()
        .map(|c| c["current_participants"].as_array().map(Vec::len).unwrap_or(0))
        .sum();

    json!({
        "total_participants": total,
        "average_per_campaign": total as f64 / campaigns.len() as f64,
        "active_campaigns": campaigns.len(),
    })
}

fn community_impact(campaigns: &Value) -> Value {
    let Some(campaigns) = campaigns.as_array() else {
        return json!({"total_impact_score": 0, "actions_completed": 0});
    };
    if campaigns.is_empty() {
        return json!({"total_impact_score": 0, "actions_completed": 0});
    }

    let mut total_impact = 0u64;
    let mut total_actions = 0u64;
    for campaign in campaigns {
        if let Some(actions) = campaign["actions"].as_array() {
            for action in actions {
                let completed = action["completed_count"].as_u64().unwrap_or(0);
                total_actions += completed;
                total_impact += completed * action["points"].as_u64().unwrap_or(0);
            }
        }
    }

    json!({
        "total_impact_score": total_impact,
        "actions_completed": total_actions,
        "average_impact_per_campaign": total_impact as f64 / campaigns.len() as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{
        Agent, CommunityCoordinationAgent, EnvironmentalMonitoringAgent,
        PersonalSustainabilityCoach, PredictiveActionAgent,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(EnvironmentalMonitoringAgent::new()),
            Arc::new(PredictiveActionAgent::new()),
            Arc::new(CommunityCoordinationAgent::new()),
            Arc::new(PersonalSustainabilityCoach::new()),
        ];
        app(AppState {
            orchestrator: Arc::new(Orchestrator::new(agents)),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_orchestrator_state() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["agents_running"], false);
    }

    #[tokio::test]
    async fn test_message_to_unknown_agent_is_404() {
        let request = Request::post("/api/agents/NoSuchAgent/message")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type": "ping"}"#))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("NoSuchAgent"));
    }

    #[tokio::test]
    async fn test_environmental_current_is_404_before_first_cycle() {
        let response = test_app()
            .oneshot(
                Request::get("/api/environmental/current")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_campaigns_route_answers_through_the_agent() {
        let response = test_app()
            .oneshot(
                Request::get("/api/community/campaigns")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert!(body["campaigns"].is_array());
    }

    #[test]
    fn test_aqi_trend_bands() {
        assert_eq!(aqi_trend(&json!([])), "insufficient_data");
        let rising = json!([
            {"air_quality": {"aqi": 40.0}},
            {"air_quality": {"aqi": 50.0}},
            {"air_quality": {"aqi": 90.0}},
            {"air_quality": {"aqi": 95.0}},
        ]);
        assert_eq!(aqi_trend(&rising), "worsening");
        let flat = json!([
            {"air_quality": {"aqi": 50.0}},
            {"air_quality": {"aqi": 51.0}},
        ]);
        assert_eq!(aqi_trend(&flat), "stable");
    }

    #[test]
    fn test_alert_summary_counts_by_bucket() {
        let summary = summarize_alerts(&json!([
            {"type": "air_quality", "severity": "high"},
            {"type": "air_quality", "severity": "medium"},
            {"type": "pollution_hotspot", "severity": "high"},
        ]));
        assert_eq!(summary["total"], 3);
        assert_eq!(summary["by_severity"]["high"], 2);
        assert_eq!(summary["by_type"]["air_quality"], 2);
    }

    #[test]
    fn test_prediction_accuracy_averages_models() {
        let status = json!({
            "air_quality": {"accuracy": 0.8},
            "weather_patterns": {"accuracy": 0.6},
        });
        assert!((prediction_accuracy(&status) - 0.7).abs() < 1e-9);
        assert_eq!(prediction_accuracy(&json!(null)), 0.0);
    }

    #[test]
    fn test_campaign_success_rates() {
        let campaigns = json!([
            {"type": "alert_response", "target_participants": 10, "current_participants": [1, 2, 3, 4, 5]},
            {"type": "alert_response", "target_participants": 10, "current_participants": []},
        ]);
        let rates = campaign_success_rates(&campaigns);
        assert_eq!(rates["overall"], 25.0);
        assert_eq!(rates["by_type"]["alert_response"], 25.0);
    }
}
