//! Predictive Action Agent
//!
//! Reads the monitoring agent's published data, projects air-quality and
//! weather trends a few hours ahead, and takes canned preventive actions
//! when a prediction clears the confidence threshold.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::{monitoring, Agent, AgentCore, AlertResponder, CycleOutcome};
use crate::memory::SharedMemory;

pub const NAME: &str = "PredictiveActionAgent";

const CYCLE_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_PREDICTION_THRESHOLD: f64 = 0.7;
const HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize)]
struct ModelInfo {
    accuracy: f64,
    last_trained: chrono::DateTime<Utc>,
}

pub struct PredictiveActionAgent {
    core: AgentCore,
    threshold: RwLock<f64>,
    history: Mutex<VecDeque<Value>>,
    models: RwLock<HashMap<&'static str, ModelInfo>>,
}

impl PredictiveActionAgent {
    pub fn new() -> Self {
        let threshold = std::env::var("PREDICTION_THRESHOLD")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(DEFAULT_PREDICTION_THRESHOLD);

        Self {
            core: AgentCore::new(NAME, CYCLE_INTERVAL),
            threshold: RwLock::new(threshold),
            history: Mutex::new(VecDeque::new()),
            models: RwLock::new(HashMap::new()),
        }
    }

    async fn update_historical_data(&self, monitoring_data: &Value) {
        let Some(environmental_data) = monitoring_data.get("environmental_data") else {
            return;
        };
        let mut history = self.history.lock().await;
        history.push_back(json!({
            "timestamp": Utc::now(),
            "data": environmental_data,
        }));
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    async fn generate_predictions(&self, monitoring_data: &Value) -> Vec<Value> {
        let mut predictions = Vec::new();

        if let Some(prediction) = self.predict_air_quality(monitoring_data).await {
            predictions.push(prediction);
        }
        if let Some(prediction) = self.predict_weather_patterns(monitoring_data).await {
            predictions.push(prediction);
        }
        if let Some(prediction) = self.predict_pollution_events(monitoring_data).await {
            predictions.push(prediction);
        }

        predictions
    }

    async fn predict_air_quality(&self, monitoring_data: &Value) -> Option<Value> {
        let aqi_values: Vec<f64> = monitoring_data
            .get("environmental_data")?
            .as_array()?
            .iter()
            .filter_map(|data| data["air_quality"]["aqi"].as_f64())
            .collect();
        if aqi_values.len() < 2 {
            return None;
        }

        let current_avg = aqi_values.iter().sum::<f64>() / aqi_values.len() as f64;
        let trend = linear_trend(&aqi_values);
        let predicted_aqi = current_avg + trend * 6.0; // six hours ahead
        let confidence = self.model_accuracy("air_quality").await;

        Some(json!({
            "type": "air_quality",
            "current_value": current_avg,
            "predicted_value": predicted_aqi,
            "prediction_time": Utc::now() + chrono::Duration::hours(6),
            "confidence": confidence,
            "trend": if trend < 0.0 { "improving" } else if trend > 0.0 { "worsening" } else { "stable" },
            "risk_level": assess_aqi_risk(predicted_aqi),
        }))
    }

    async fn predict_weather_patterns(&self, monitoring_data: &Value) -> Option<Value> {
        let readings = monitoring_data.get("environmental_data")?.as_array()?;
        let temps: Vec<f64> = readings
            .iter()
            .filter_map(|data| data["weather"]["temperature"].as_f64())
            .collect();
        let pressures: Vec<f64> = readings
            .iter()
            .filter_map(|data| data["weather"]["pressure"].as_f64())
            .collect();
        if temps.len() < 2 {
            return None;
        }

        let temp_trend = linear_trend(&temps);
        let pressure_trend = linear_trend(&pressures);

        Some(json!({
            "type": "weather_patterns",
            "temperature_trend": temp_trend,
            "pressure_trend": pressure_trend,
            "predicted_conditions": predict_weather_conditions(temp_trend, pressure_trend),
            "prediction_time": Utc::now() + chrono::Duration::hours(12),
            "confidence": self.model_accuracy("weather_patterns").await,
        }))
    }

    async fn predict_pollution_events(&self, monitoring_data: &Value) -> Option<Value> {
        let analysis = monitoring_data.get("analysis").cloned().unwrap_or(json!({}));
        let alerts = monitoring_data
            .get("alerts")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut risk_factors = Vec::new();
        if analysis["average_aqi"].as_f64().unwrap_or(0.0) > 80.0 {
            risk_factors.push("high_baseline_pollution");
        }
        if analysis["pollution_hotspots"]
            .as_array()
            .is_some_and(|hotspots| !hotspots.is_empty())
        {
            risk_factors.push("active_hotspots");
        }
        if !alerts.is_empty() {
            risk_factors.push("recent_alerts");
        }
        if risk_factors.is_empty() {
            return None;
        }

        let probability = (risk_factors.len() as f64 * 0.3).min(0.95);

        Some(json!({
            "type": "pollution_event",
            "probability": probability,
            "risk_factors": risk_factors,
            "predicted_severity": if probability > 0.7 { "high" } else { "moderate" },
            "prediction_time": Utc::now() + chrono::Duration::hours(4),
            "confidence": self.model_accuracy("pollution_events").await,
            "recommended_actions": pollution_prevention_actions(probability),
        }))
    }

    async fn model_accuracy(&self, model: &str) -> f64 {
        self.models
            .read()
            .await
            .get(model)
            .map(|info| info.accuracy)
            .unwrap_or(0.5)
    }

    async fn should_take_action(&self, prediction: &Value) -> bool {
        let threshold = *self.threshold.read().await;
        let confidence = prediction["confidence"].as_f64().unwrap_or(0.0);
        if confidence <= threshold {
            return false;
        }

        match prediction["type"].as_str() {
            Some("air_quality") => matches!(
                prediction["risk_level"].as_str(),
                Some("unhealthy") | Some("hazardous")
            ),
            Some("pollution_event") => prediction["probability"].as_f64().unwrap_or(0.0) > 0.6,
            Some("weather_patterns") => prediction["predicted_conditions"]
                .as_str()
                .is_some_and(|conditions| conditions.contains("storm")),
            _ => false,
        }
    }

    fn take_autonomous_action(prediction: &Value) -> Value {
        let detail = match prediction["type"].as_str() {
            Some("air_quality") => json!({
                "action_type": "air_quality_alert",
                "details": {
                    "predicted_aqi": prediction["predicted_value"],
                    "risk_level": prediction["risk_level"],
                    "notifications_sent": ["community_coordinator", "health_authorities"],
                    "preventive_measures": ["increase_monitoring", "prepare_air_filters"],
                },
            }),
            Some("pollution_event") => json!({
                "action_type": "pollution_prevention",
                "details": {
                    "probability": prediction["probability"],
                    "actions_initiated": prediction["recommended_actions"],
                    "emergency_protocols": prediction["predicted_severity"] == "high",
                    "coordination_requests": ["traffic_management", "industrial_monitoring"],
                },
            }),
            _ => json!({
                "action_type": "weather_preparation",
                "details": {
                    "predicted_conditions": prediction["predicted_conditions"],
                    "preparation_actions": ["secure_monitoring_equipment", "adjust_sampling_frequency"],
                    "alerts_issued": prediction["predicted_conditions"] == "storm_approaching",
                },
            }),
        };

        let mut action = json!({
            "timestamp": Utc::now(),
            "prediction_type": prediction["type"],
            "success": true,
        });
        action
            .as_object_mut()
            .unwrap()
            .extend(detail.as_object().unwrap().clone());
        action
    }

    async fn evaluate_and_act(&self, predictions: &[Value]) -> Vec<Value> {
        let mut actions = Vec::new();
        for prediction in predictions {
            if self.should_take_action(prediction).await {
                actions.push(Self::take_autonomous_action(prediction));
            }
        }
        actions
    }

    /// Nudge model accuracies upward to simulate retraining.
    async fn update_models(&self) {
        let mut models = self.models.write().await;
        for info in models.values_mut() {
            info.accuracy = (info.accuracy + 0.001).min(0.95);
            info.last_trained = Utc::now();
        }
    }
}

impl Default for PredictiveActionAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PredictiveMessage {
    GetPredictions,
    RequestPrediction {
        prediction_type: String,
        #[serde(default)]
        data: Value,
    },
    UpdateThreshold {
        threshold: f64,
    },
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl Agent for PredictiveActionAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.core.activate();
        let now = Utc::now();
        let mut models = self.models.write().await;
        models.insert("air_quality", ModelInfo { accuracy: 0.85, last_trained: now });
        models.insert("weather_patterns", ModelInfo { accuracy: 0.78, last_trained: now });
        models.insert("pollution_events", ModelInfo { accuracy: 0.82, last_trained: now });
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn execute_cycle(&self, shared: &SharedMemory) -> Result<CycleOutcome> {
        let Some(monitoring_data) = shared.data(monitoring::NAME).await else {
            return Ok(CycleOutcome::Completed(json!({
                "status": "no_data",
                "message": "No monitoring data available",
            })));
        };

        self.update_historical_data(&monitoring_data).await;
        let predictions = self.generate_predictions(&monitoring_data).await;
        let actions = self.evaluate_and_act(&predictions).await;
        self.update_models().await;

        self.core
            .store_memory("latest_predictions", json!(predictions))
            .await;
        self.core
            .record_action(
                "prediction_cycle",
                json!({
                    "predictions_generated": predictions.len(),
                    "actions_taken": actions.len(),
                }),
            )
            .await;

        Ok(CycleOutcome::Completed(json!({
            "predictions": predictions,
            "actions_taken": actions,
            "model_status": &*self.models.read().await,
            "timestamp": Utc::now(),
        })))
    }

    async fn handle_message(&self, message: Value) -> Result<Value> {
        let message = serde_json::from_value(message).unwrap_or(PredictiveMessage::Unknown);

        match message {
            PredictiveMessage::GetPredictions => Ok(self
                .core
                .get_memory("latest_predictions")
                .await
                .unwrap_or(Value::Null)),
            PredictiveMessage::RequestPrediction {
                prediction_type,
                data,
            } => {
                let prediction = match prediction_type.as_str() {
                    "air_quality" => self.predict_air_quality(&data).await,
                    "pollution_event" => self.predict_pollution_events(&data).await,
                    _ => None,
                };
                Ok(prediction.unwrap_or(Value::Null))
            }
            PredictiveMessage::UpdateThreshold { threshold } => {
                if (0.0..=1.0).contains(&threshold) {
                    *self.threshold.write().await = threshold;
                    Ok(json!({"status": "success", "new_threshold": threshold}))
                } else {
                    Ok(json!({"status": "error", "message": "threshold must be within [0, 1]"}))
                }
            }
            PredictiveMessage::Unknown => Ok(json!({"status": "unknown_message_type"})),
        }
    }

    fn alert_responder(&self) -> Option<&dyn AlertResponder> {
        Some(self)
    }
}

#[async_trait]
impl AlertResponder for PredictiveActionAgent {
    /// Urgent path: run an immediate pollution-event evaluation on the
    /// alert payload instead of waiting for the next scheduled cycle.
    async fn handle_pollution_alert(&self, alert: Value) -> Result<Value> {
        info!(agent = NAME, "processing pollution alert for prediction");

        let Some(prediction) = self.predict_pollution_events(&alert).await else {
            return Ok(json!({"status": "no_action_needed"}));
        };

        if prediction["probability"].as_f64().unwrap_or(0.0) > 0.5 {
            let action = Self::take_autonomous_action(&prediction);
            self.core
                .record_action(
                    "emergency_prediction_response",
                    json!({"alert_processed": true}),
                )
                .await;
            return Ok(json!({
                "prediction": prediction,
                "action": action,
                "status": "processed",
            }));
        }

        Ok(json!({"status": "no_action_needed"}))
    }
}

/// Least-squares slope over equally spaced samples.
fn linear_trend(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i * i) as f64).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

fn assess_aqi_risk(aqi: f64) -> &'static str {
    if aqi <= 50.0 {
        "good"
    } else if aqi <= 100.0 {
        "moderate"
    } else if aqi <= 150.0 {
        "unhealthy_sensitive"
    } else if aqi <= 200.0 {
        "unhealthy"
    } else {
        "hazardous"
    }
}

fn predict_weather_conditions(temp_trend: f64, pressure_trend: f64) -> &'static str {
    if pressure_trend < -0.5 {
        "storm_approaching"
    } else if pressure_trend > 0.5 {
        "clearing_weather"
    } else if temp_trend > 2.0 {
        "warming_trend"
    } else if temp_trend < -2.0 {
        "cooling_trend"
    } else {
        "stable_conditions"
    }
}

fn pollution_prevention_actions(probability: f64) -> Vec<&'static str> {
    let mut actions = Vec::new();
    if probability > 0.5 {
        actions.extend([
            "increase_monitoring_frequency",
            "alert_community_coordinators",
            "prepare_air_filtration_systems",
        ]);
    }
    if probability > 0.7 {
        actions.extend([
            "activate_emergency_protocols",
            "coordinate_traffic_reduction",
            "notify_health_authorities",
        ]);
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_trend() {
        assert_eq!(linear_trend(&[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(linear_trend(&[5.0, 3.0, 1.0]), -2.0);
        assert_eq!(linear_trend(&[4.0]), 0.0);
        assert!(linear_trend(&[7.0, 7.0, 7.0]).abs() < 1e-9);
    }

    #[test]
    fn test_aqi_risk_banding() {
        assert_eq!(assess_aqi_risk(30.0), "good");
        assert_eq!(assess_aqi_risk(90.0), "moderate");
        assert_eq!(assess_aqi_risk(140.0), "unhealthy_sensitive");
        assert_eq!(assess_aqi_risk(180.0), "unhealthy");
        assert_eq!(assess_aqi_risk(300.0), "hazardous");
    }

    #[tokio::test]
    async fn test_cycle_without_monitoring_data() -> Result<()> {
        let agent = PredictiveActionAgent::new();
        agent.initialize().await?;

        let shared = SharedMemory::new();
        let CycleOutcome::Completed(data) = agent.execute_cycle(&shared).await? else {
            panic!("cycle should complete");
        };
        assert_eq!(data["status"], "no_data");
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_predicts_from_monitoring_entry() -> Result<()> {
        let agent = PredictiveActionAgent::new();
        agent.initialize().await?;

        let shared = SharedMemory::new();
        shared
            .slot(monitoring::NAME)
            .publish(json!({
                "environmental_data": [
                    {"air_quality": {"aqi": 90}, "weather": {"temperature": 22.0, "pressure": 1010.0}},
                    {"air_quality": {"aqi": 110}, "weather": {"temperature": 24.0, "pressure": 1008.0}},
                    {"air_quality": {"aqi": 130}, "weather": {"temperature": 26.0, "pressure": 1006.0}},
                ],
                "analysis": {"average_aqi": 110.0, "pollution_hotspots": [{"location": "Industrial Zone"}]},
                "alerts": [{"type": "air_quality"}],
            }))
            .await;

        let CycleOutcome::Completed(data) = agent.execute_cycle(&shared).await? else {
            panic!("cycle should complete");
        };

        let predictions = data["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 3);

        let aqi = &predictions[0];
        assert_eq!(aqi["type"], "air_quality");
        assert_eq!(aqi["trend"], "worsening");

        let pollution = &predictions[2];
        assert_eq!(pollution["type"], "pollution_event");
        // All three risk factors present: 0.9 probability, high severity
        assert!(pollution["probability"].as_f64().unwrap() > 0.89);
        assert_eq!(pollution["predicted_severity"], "high");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_threshold_rejects_out_of_range() -> Result<()> {
        let agent = PredictiveActionAgent::new();
        let response = agent
            .handle_message(json!({"type": "update_threshold", "threshold": 1.5}))
            .await?;
        assert_eq!(response["status"], "error");

        let response = agent
            .handle_message(json!({"type": "update_threshold", "threshold": 0.9}))
            .await?;
        assert_eq!(response["status"], "success");
        assert_eq!(*agent.threshold.read().await, 0.9);
        Ok(())
    }

    #[tokio::test]
    async fn test_pollution_alert_extension_acts_on_high_probability() -> Result<()> {
        let agent = PredictiveActionAgent::new();
        agent.initialize().await?;

        let alert = json!({
            "analysis": {"average_aqi": 130.0, "pollution_hotspots": [{"location": "Industrial Zone"}]},
            "alerts": [{"type": "air_quality"}],
        });
        let response = agent.handle_pollution_alert(alert).await?;
        assert_eq!(response["status"], "processed");
        assert_eq!(response["action"]["action_type"], "pollution_prevention");
        Ok(())
    }
}
