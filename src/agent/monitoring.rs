//! Environmental Monitoring Agent
//!
//! Autonomously collects (synthetic) weather and air-quality readings for
//! a set of locations, analyzes them for pollution hotspots and raises
//! alerts. During an alert the agent temporarily accelerates its own
//! monitoring interval.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;

use super::{Agent, AgentCore, CycleOutcome};
use crate::memory::SharedMemory;

pub const NAME: &str = "EnvironmentalMonitoringAgent";

const CYCLE_INTERVAL: Duration = Duration::from_secs(300);
/// Accelerated interval while a pollution alert is active, and how long
/// the acceleration lasts before reverting.
const ALERT_INTERVAL: Duration = Duration::from_secs(60);
const ALERT_ACCELERATION_WINDOW: Duration = Duration::from_secs(1800);

const UNHEALTHY_AQI: f64 = 100.0;
const SEVERE_AQI: f64 = 150.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

pub struct EnvironmentalMonitoringAgent {
    core: AgentCore,
    locations: RwLock<Vec<Location>>,
}

impl EnvironmentalMonitoringAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(NAME, CYCLE_INTERVAL),
            locations: RwLock::new(vec![
                Location {
                    name: "City Center".to_string(),
                    lat: 40.7128,
                    lon: -74.0060,
                },
                Location {
                    name: "Industrial Zone".to_string(),
                    lat: 40.7589,
                    lon: -73.9851,
                },
                Location {
                    name: "Residential Area".to_string(),
                    lat: 40.6892,
                    lon: -74.0445,
                },
            ]),
        }
    }

    fn sample_weather() -> Value {
        let mut rng = rand::thread_rng();
        json!({
            "temperature": round1(rng.gen_range(15.0..35.0)),
            "humidity": round1(rng.gen_range(30.0..90.0)),
            "wind_speed": round1(rng.gen_range(0.0..20.0)),
            "pressure": round1(rng.gen_range(980.0..1030.0)),
            "visibility": round1(rng.gen_range(5.0..15.0)),
        })
    }

    fn sample_air_quality() -> Value {
        let mut rng = rand::thread_rng();
        json!({
            "aqi": rng.gen_range(20..=150),
            "pm25": round1(rng.gen_range(5.0..50.0)),
            "pm10": round1(rng.gen_range(10.0..80.0)),
            "co": round2(rng.gen_range(0.1..2.0)),
            "no2": round1(rng.gen_range(10.0..60.0)),
            "o3": round1(rng.gen_range(20.0..100.0)),
        })
    }

    async fn collect_environmental_data(&self) -> Vec<Value> {
        let locations = self.locations.read().await.clone();
        locations
            .iter()
            .map(|location| {
                json!({
                    "location": location.name,
                    "coordinates": {"lat": location.lat, "lon": location.lon},
                    "weather": Self::sample_weather(),
                    "air_quality": Self::sample_air_quality(),
                    "timestamp": Utc::now(),
                })
            })
            .collect()
    }

    fn analyze_data(environmental_data: &[Value]) -> Value {
        if environmental_data.is_empty() {
            return json!({
                "average_aqi": 0.0,
                "pollution_hotspots": [],
                "weather_patterns": {},
            });
        }

        let aqi_values: Vec<f64> = environmental_data
            .iter()
            .filter_map(|data| data["air_quality"]["aqi"].as_f64())
            .collect();
        let average_aqi = aqi_values.iter().sum::<f64>() / environmental_data.len() as f64;

        let hotspots: Vec<Value> = environmental_data
            .iter()
            .filter_map(|data| {
                let aqi = data["air_quality"]["aqi"].as_f64()?;
                if aqi > UNHEALTHY_AQI {
                    Some(json!({
                        "location": data["location"],
                        "aqi": aqi,
                        "severity": if aqi > SEVERE_AQI { "high" } else { "moderate" },
                    }))
                } else {
                    None
                }
            })
            .collect();

        let temps: Vec<f64> = environmental_data
            .iter()
            .filter_map(|data| data["weather"]["temperature"].as_f64())
            .collect();
        let weather_patterns = if temps.is_empty() {
            json!({})
        } else {
            let avg = temps.iter().sum::<f64>() / temps.len() as f64;
            let max = temps.iter().cloned().fold(f64::MIN, f64::max);
            let min = temps.iter().cloned().fold(f64::MAX, f64::min);
            json!({
                "avg_temperature": avg,
                "temperature_range": max - min,
            })
        };

        json!({
            "average_aqi": average_aqi,
            "pollution_hotspots": hotspots,
            "weather_patterns": weather_patterns,
        })
    }

    fn check_for_alerts(analysis: &Value) -> Vec<Value> {
        let mut alerts = Vec::new();

        let average_aqi = analysis["average_aqi"].as_f64().unwrap_or(0.0);
        if average_aqi > UNHEALTHY_AQI {
            alerts.push(json!({
                "type": "air_quality",
                "severity": if average_aqi > SEVERE_AQI { "high" } else { "moderate" },
                "message": format!(
                    "Average AQI is {average_aqi:.1} - Unhealthy air quality detected"
                ),
                "timestamp": Utc::now(),
                "action_required": true,
            }));
        }

        if let Some(hotspots) = analysis["pollution_hotspots"].as_array() {
            for hotspot in hotspots {
                alerts.push(json!({
                    "type": "pollution_hotspot",
                    "severity": hotspot["severity"],
                    "message": format!(
                        "Pollution hotspot detected at {} (AQI: {})",
                        hotspot["location"].as_str().unwrap_or("unknown"),
                        hotspot["aqi"]
                    ),
                    "location": hotspot["location"],
                    "timestamp": Utc::now(),
                    "action_required": true,
                }));
            }
        }

        alerts
    }
}

impl Default for EnvironmentalMonitoringAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MonitoringMessage {
    GetCurrentData,
    GetLocationData { location: String },
    SetMonitoringLocation { location: Location },
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl Agent for EnvironmentalMonitoringAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.core.activate();
        self.core
            .store_memory("last_alert_time", json!(Utc::now()))
            .await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn execute_cycle(&self, _shared: &SharedMemory) -> Result<CycleOutcome> {
        let environmental_data = self.collect_environmental_data().await;
        let analysis = Self::analyze_data(&environmental_data);
        let alerts = Self::check_for_alerts(&analysis);

        self.core
            .store_memory("latest_environmental_data", json!(environmental_data))
            .await;

        let pollution_alert = !alerts.is_empty();
        if pollution_alert {
            self.core
                .store_memory("recent_alerts", json!(alerts))
                .await;
            self.core
                .store_memory("last_alert_time", json!(Utc::now()))
                .await;
            // Watch the situation more closely until it settles
            self.core
                .accelerate(ALERT_INTERVAL, ALERT_ACCELERATION_WINDOW)
                .await;
        }

        self.core
            .record_action(
                "monitoring_cycle",
                json!({
                    "locations_monitored": environmental_data.len(),
                    "alerts_generated": alerts.len(),
                }),
            )
            .await;

        Ok(CycleOutcome::Completed(json!({
            "environmental_data": environmental_data,
            "analysis": analysis,
            "alerts": alerts,
            "pollution_alert": pollution_alert,
            "timestamp": Utc::now(),
        })))
    }

    async fn handle_message(&self, message: Value) -> Result<Value> {
        let message =
            serde_json::from_value(message).unwrap_or(MonitoringMessage::Unknown);

        match message {
            MonitoringMessage::GetCurrentData => Ok(self
                .core
                .get_memory("latest_environmental_data")
                .await
                .unwrap_or(Value::Null)),
            MonitoringMessage::GetLocationData { location } => {
                let latest = self
                    .core
                    .get_memory("latest_environmental_data")
                    .await
                    .unwrap_or_else(|| json!([]));
                let found = latest
                    .as_array()
                    .and_then(|entries| {
                        entries
                            .iter()
                            .find(|entry| entry["location"] == location.as_str())
                            .cloned()
                    })
                    .unwrap_or(Value::Null);
                Ok(found)
            }
            MonitoringMessage::SetMonitoringLocation { location } => {
                info!(agent = NAME, location = %location.name, "monitoring location added");
                self.locations.write().await.push(location);
                Ok(json!({"status": "success", "message": "Location added"}))
            }
            MonitoringMessage::Unknown => Ok(json!({"status": "unknown_message_type"})),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cycle_produces_full_payload() -> Result<()> {
        let agent = EnvironmentalMonitoringAgent::new();
        agent.initialize().await?;

        let shared = SharedMemory::new();
        let outcome = agent.execute_cycle(&shared).await?;
        let CycleOutcome::Completed(data) = outcome else {
            panic!("monitoring cycle should complete");
        };

        let readings = data["environmental_data"].as_array().unwrap();
        assert_eq!(readings.len(), 3);
        for reading in readings {
            assert!(reading["air_quality"]["aqi"].as_f64().unwrap() >= 20.0);
            assert!(reading["weather"]["temperature"].as_f64().unwrap() < 35.0);
        }
        assert!(data["analysis"]["average_aqi"].as_f64().unwrap() > 0.0);
        assert!(data["pollution_alert"].is_boolean());
        assert_eq!(agent.core().action_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_alerts_raised_for_unhealthy_air() {
        let analysis = json!({
            "average_aqi": 120.0,
            "pollution_hotspots": [
                {"location": "Industrial Zone", "aqi": 160.0, "severity": "high"}
            ],
        });

        let alerts = EnvironmentalMonitoringAgent::check_for_alerts(&analysis);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["type"], "air_quality");
        assert_eq!(alerts[0]["severity"], "moderate");
        assert_eq!(alerts[1]["type"], "pollution_hotspot");
        assert_eq!(alerts[1]["severity"], "high");
    }

    #[tokio::test]
    async fn test_no_alerts_for_clean_air() {
        let analysis = json!({
            "average_aqi": 45.0,
            "pollution_hotspots": [],
        });
        assert!(EnvironmentalMonitoringAgent::check_for_alerts(&analysis).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_message_gets_canned_response() -> Result<()> {
        let agent = EnvironmentalMonitoringAgent::new();
        let response = agent
            .handle_message(json!({"type": "self_destruct"}))
            .await?;
        assert_eq!(response, json!({"status": "unknown_message_type"}));

        // Entirely malformed input is treated the same way
        let response = agent.handle_message(json!("not an object")).await?;
        assert_eq!(response, json!({"status": "unknown_message_type"}));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_monitoring_location() -> Result<()> {
        let agent = EnvironmentalMonitoringAgent::new();
        let response = agent
            .handle_message(json!({
                "type": "set_monitoring_location",
                "location": {"name": "Harbor", "lat": 40.65, "lon": -74.1},
            }))
            .await?;
        assert_eq!(response["status"], "success");
        assert_eq!(agent.locations.read().await.len(), 4);
        Ok(())
    }
}
