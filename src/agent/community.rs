//! Community Coordination Agent
//!
//! Turns monitoring alerts and predictions into community campaigns:
//! creates them, recruits participants from a mock member roster, assigns
//! actions and tracks progress. Exposes an urgent extension that spins up
//! an emergency campaign in response to a pollution alert.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{monitoring, predictive, Agent, AgentCore, AlertResponder, CycleOutcome};
use crate::memory::SharedMemory;

pub const NAME: &str = "CommunityCoordinationAgent";

const CYCLE_INTERVAL: Duration = Duration::from_secs(900);
const MIN_ENGAGEMENT: u32 = 30;
const MAX_PARTICIPANTS_PER_ACTION: usize = 5;
const CAMPAIGN_LIFETIME_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(rename = "type")]
    pub campaign_type: String,
    pub priority: String,
    pub location: String,
    pub title: String,
    pub description: String,
    pub actions: Vec<CampaignAction>,
    pub target_participants: usize,
    pub current_participants: Vec<Participant>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignAction {
    pub id: String,
    pub action: String,
    pub points: u32,
    pub difficulty: String,
    pub completed_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub assigned_actions: Vec<Value>,
    pub completed_actions: Vec<Value>,
}

#[derive(Debug, Clone)]
struct Member {
    id: &'static str,
    name: &'static str,
    location: Option<&'static str>,
    engagement_score: u32,
}

/// A coordination need derived from the shared-memory snapshot.
#[derive(Debug, Clone, Serialize)]
struct Need {
    #[serde(rename = "type")]
    need_type: String,
    priority: String,
    location: String,
    description: String,
    source: String,
    data: Value,
}

pub struct CommunityCoordinationAgent {
    core: AgentCore,
    campaigns: Mutex<Vec<Campaign>>,
    members: Vec<Member>,
}

impl CommunityCoordinationAgent {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(NAME, CYCLE_INTERVAL),
            campaigns: Mutex::new(Vec::new()),
            members: vec![
                Member { id: "user_001", name: "Alice Johnson", location: Some("City Center"), engagement_score: 85 },
                Member { id: "user_002", name: "Bob Smith", location: Some("Industrial Zone"), engagement_score: 72 },
                Member { id: "user_003", name: "Carol Davis", location: Some("Residential Area"), engagement_score: 91 },
                Member { id: "org_001", name: "Green City Initiative", location: None, engagement_score: 50 },
                Member { id: "org_002", name: "Local Environmental Group", location: None, engagement_score: 50 },
            ],
        }
    }

    fn assess_coordination_needs(monitoring_data: &Value, predictive_data: &Value) -> Vec<Need> {
        let mut needs = Vec::new();

        if let Some(alerts) = monitoring_data.get("alerts").and_then(Value::as_array) {
            for alert in alerts {
                if alert["action_required"].as_bool().unwrap_or(false) {
                    needs.push(Need {
                        need_type: "alert_response".to_string(),
                        priority: if alert["severity"] == "high" { "high" } else { "medium" }.to_string(),
                        location: alert["location"].as_str().unwrap_or("general").to_string(),
                        description: format!(
                            "Community response needed for {} alert",
                            alert["type"].as_str().unwrap_or("environmental")
                        ),
                        source: "monitoring_agent".to_string(),
                        data: alert.clone(),
                    });
                }
            }
        }

        if let Some(predictions) = predictive_data.get("predictions").and_then(Value::as_array) {
            for prediction in predictions {
                if prediction["confidence"].as_f64().unwrap_or(0.0) > 0.7 {
                    needs.push(Need {
                        need_type: "preventive_action".to_string(),
                        priority: "medium".to_string(),
                        location: "general".to_string(),
                        description: format!(
                            "Preventive community action for predicted {}",
                            prediction["type"].as_str().unwrap_or("issue")
                        ),
                        source: "predictive_agent".to_string(),
                        data: prediction.clone(),
                    });
                }
            }
        }

        let analysis = &monitoring_data["analysis"];
        if analysis["average_aqi"].as_f64().unwrap_or(0.0) > 100.0 {
            needs.push(Need {
                need_type: "air_quality_improvement".to_string(),
                priority: "high".to_string(),
                location: "general".to_string(),
                description: "Community action needed to improve air quality".to_string(),
                source: "analysis".to_string(),
                data: analysis.clone(),
            });
        }

        needs
    }

    fn build_campaign(&self, need: &Need) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: format!("campaign_{}", Uuid::new_v4()),
            campaign_type: need.need_type.clone(),
            priority: need.priority.clone(),
            location: need.location.clone(),
            title: campaign_title(&need.need_type, &need.location),
            description: need.description.clone(),
            actions: campaign_actions(&need.need_type),
            target_participants: self.target_participants(need),
            current_participants: Vec::new(),
            status: "active".to_string(),
            created_at: now,
            deadline: now + chrono::Duration::days(CAMPAIGN_LIFETIME_DAYS),
        }
    }

    fn target_participants(&self, need: &Need) -> usize {
        let mut target: usize = match need.priority.as_str() {
            "high" => 30,
            "medium" => 20,
            _ => 10,
        };
        // Location-specific campaigns need fewer people than city-wide ones
        if need.location != "general" {
            target = (target / 2).max(5);
        }
        target.min(self.members.len())
    }

    /// Create campaigns for unmet needs, refresh existing ones, drop
    /// expired ones. Returns the campaigns created this cycle.
    async fn manage_campaigns(&self, needs: &[Need]) -> Vec<Campaign> {
        let mut campaigns = self.campaigns.lock().await;
        let mut created = Vec::new();

        for need in needs {
            let existing = campaigns.iter().position(|campaign| {
                campaign.campaign_type == need.need_type
                    && campaign.location == need.location
                    && campaign.status == "active"
            });

            match existing {
                Some(index) => {
                    let campaign = &mut campaigns[index];
                    if need.priority == "high" && campaign.priority != "high" {
                        campaign.priority = "high".to_string();
                        campaign.target_participants =
                            (campaign.target_participants * 2).min(self.members.len());
                    }
                    if campaign.deadline < Utc::now() + chrono::Duration::days(3) {
                        campaign.deadline = Utc::now() + chrono::Duration::days(CAMPAIGN_LIFETIME_DAYS);
                    }
                }
                None => {
                    let campaign = self.build_campaign(need);
                    info!(agent = NAME, campaign = %campaign.title, "campaign created");
                    campaigns.push(campaign.clone());
                    created.push(campaign);
                }
            }
        }

        let now = Utc::now();
        campaigns.retain(|campaign| campaign.status == "active" && campaign.deadline > now);

        created
    }

    fn suitable_members(&self, campaign: &Campaign) -> Vec<&Member> {
        let mut suitable: Vec<&Member> = self
            .members
            .iter()
            .filter(|member| {
                let already_in = campaign
                    .current_participants
                    .iter()
                    .any(|participant| participant.user_id == member.id);
                let location_ok = campaign.location == "general"
                    || member.location == Some(campaign.location.as_str());
                !already_in && location_ok && member.engagement_score > MIN_ENGAGEMENT
            })
            .collect();
        suitable.sort_by(|a, b| b.engagement_score.cmp(&a.engagement_score));
        suitable
    }

    /// Recruit and assign actions across all active campaigns. Returns a
    /// summary entry per campaign that saw any activity.
    async fn coordinate_actions(&self) -> Vec<Value> {
        let mut campaigns = self.campaigns.lock().await;
        let mut coordinated = Vec::new();

        for campaign in campaigns.iter_mut() {
            let mut recruited = 0usize;
            let open_slots = campaign
                .target_participants
                .saturating_sub(campaign.current_participants.len());

            if open_slots > 0 {
                let candidates: Vec<Member> = self
                    .suitable_members(campaign)
                    .into_iter()
                    .cloned()
                    .collect();
                for member in candidates.into_iter().take(open_slots) {
                    // Joining is probabilistic, weighted by engagement
                    let probability = (member.engagement_score as f64 / 100.0).min(0.9);
                    if rand::thread_rng().gen_bool(probability) {
                        campaign.current_participants.push(Participant {
                            user_id: member.id.to_string(),
                            name: member.name.to_string(),
                            joined_at: Utc::now(),
                            assigned_actions: Vec::new(),
                            completed_actions: Vec::new(),
                        });
                        recruited += 1;
                    }
                }
            }

            let assignments = assign_actions(campaign, recruited);

            if recruited > 0 || assignments > 0 {
                coordinated.push(json!({
                    "campaign_id": campaign.id,
                    "new_participants": recruited,
                    "action_assignments": assignments,
                    "progress": campaign_progress(campaign),
                    "timestamp": Utc::now(),
                }));
            }
        }

        coordinated
    }

    async fn engagement_metrics(&self) -> Value {
        let campaigns = self.campaigns.lock().await;
        let mut active_participants = std::collections::HashSet::new();
        for campaign in campaigns.iter() {
            for participant in &campaign.current_participants {
                active_participants.insert(participant.user_id.clone());
            }
        }

        let total_members = self.members.len();
        json!({
            "total_community_members": total_members,
            "active_participants": active_participants.len(),
            "engagement_rate": active_participants.len() as f64 / total_members as f64 * 100.0,
            "active_campaigns": campaigns.len(),
        })
    }

    async fn handle_campaign_join(&self, campaign_id: &str, user_info: Value) -> Value {
        let mut campaigns = self.campaigns.lock().await;
        let Some(campaign) = campaigns.iter_mut().find(|c| c.id == campaign_id) else {
            return json!({"status": "error", "message": "Campaign not found"});
        };

        let user_id = user_info["id"].as_str().unwrap_or_default().to_string();
        if campaign
            .current_participants
            .iter()
            .any(|participant| participant.user_id == user_id)
        {
            return json!({"status": "error", "message": "User already participating"});
        }

        campaign.current_participants.push(Participant {
            user_id,
            name: user_info["name"].as_str().unwrap_or("Anonymous").to_string(),
            joined_at: Utc::now(),
            assigned_actions: Vec::new(),
            completed_actions: Vec::new(),
        });

        json!({"status": "success", "message": "Successfully joined campaign"})
    }

    async fn handle_action_completion(
        &self,
        campaign_id: &str,
        action_id: &str,
        user_id: &str,
    ) -> Value {
        let mut campaigns = self.campaigns.lock().await;
        let Some(campaign) = campaigns.iter_mut().find(|c| c.id == campaign_id) else {
            return json!({"status": "error", "message": "Campaign not found"});
        };

        let Some(action) = campaign.actions.iter_mut().find(|a| a.id == action_id) else {
            return json!({"status": "error", "message": "Action not found"});
        };
        action.completed_count += 1;
        let points = action.points;
        let completion = json!({
            "action_id": action_id,
            "completed_at": Utc::now(),
            "points_earned": points,
        });

        let Some(participant) = campaign
            .current_participants
            .iter_mut()
            .find(|p| p.user_id == user_id)
        else {
            return json!({"status": "error", "message": "Participant not found"});
        };
        participant.completed_actions.push(completion);

        json!({"status": "success", "points_earned": points})
    }
}

impl Default for CommunityCoordinationAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CommunityMessage {
    GetActiveCampaigns,
    JoinCampaign {
        campaign_id: String,
        user_info: Value,
    },
    CompleteAction {
        campaign_id: String,
        action_id: String,
        user_id: String,
    },
    GetCommunityStats,
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl Agent for CommunityCoordinationAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        self.core.activate();
        self.core.store_memory("campaigns_created", json!(0)).await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn execute_cycle(&self, shared: &SharedMemory) -> Result<CycleOutcome> {
        let monitoring_data = shared.data(monitoring::NAME).await.unwrap_or(json!({}));
        let predictive_data = shared.data(predictive::NAME).await.unwrap_or(json!({}));

        let needs = Self::assess_coordination_needs(&monitoring_data, &predictive_data);
        let created = self.manage_campaigns(&needs).await;
        if !created.is_empty() {
            let total = self
                .core
                .get_memory("campaigns_created")
                .await
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            self.core
                .store_memory("campaigns_created", json!(total + created.len() as u64))
                .await;
        }

        let coordinated_actions = self.coordinate_actions().await;
        let engagement_metrics = self.engagement_metrics().await;
        let active_campaigns = self.campaigns.lock().await.clone();

        self.core
            .record_action(
                "coordination_cycle",
                json!({
                    "coordination_needs": needs.len(),
                    "active_campaigns": active_campaigns.len(),
                    "actions_coordinated": coordinated_actions.len(),
                }),
            )
            .await;

        Ok(CycleOutcome::Completed(json!({
            "coordination_needs": needs,
            "active_campaigns": active_campaigns,
            "coordinated_actions": coordinated_actions,
            "engagement_metrics": engagement_metrics,
            "timestamp": Utc::now(),
        })))
    }

    async fn handle_message(&self, message: Value) -> Result<Value> {
        let message = serde_json::from_value(message).unwrap_or(CommunityMessage::Unknown);

        match message {
            CommunityMessage::GetActiveCampaigns => {
                Ok(json!(self.campaigns.lock().await.clone()))
            }
            CommunityMessage::JoinCampaign {
                campaign_id,
                user_info,
            } => Ok(self.handle_campaign_join(&campaign_id, user_info).await),
            CommunityMessage::CompleteAction {
                campaign_id,
                action_id,
                user_id,
            } => Ok(self
                .handle_action_completion(&campaign_id, &action_id, &user_id)
                .await),
            CommunityMessage::GetCommunityStats => Ok(self.engagement_metrics().await),
            CommunityMessage::Unknown => Ok(json!({"status": "unknown_message_type"})),
        }
    }

    fn alert_responder(&self) -> Option<&dyn AlertResponder> {
        Some(self)
    }
}

#[async_trait]
impl AlertResponder for CommunityCoordinationAgent {
    /// Urgent path: create an emergency campaign and recruit the most
    /// engaged members immediately, without waiting for the next cycle.
    async fn handle_pollution_alert(&self, alert: Value) -> Result<Value> {
        info!(agent = NAME, "coordinating community pollution response");

        let need = Need {
            need_type: "pollution_emergency".to_string(),
            priority: "high".to_string(),
            location: alert["location"].as_str().unwrap_or("general").to_string(),
            description: "Emergency community response to pollution event".to_string(),
            source: "pollution_alert".to_string(),
            data: alert,
        };

        let mut campaign = self.build_campaign(&need);
        let emergency_participants: Vec<Participant> = self
            .members
            .iter()
            .filter(|member| member.engagement_score > 70)
            .take(10)
            .map(|member| Participant {
                user_id: member.id.to_string(),
                name: member.name.to_string(),
                joined_at: Utc::now(),
                assigned_actions: Vec::new(),
                completed_actions: Vec::new(),
            })
            .collect();
        campaign
            .current_participants
            .extend(emergency_participants.iter().cloned());

        self.campaigns.lock().await.push(campaign.clone());
        self.core
            .record_action(
                "pollution_response_coordination",
                json!({
                    "campaign_created": true,
                    "emergency_participants": emergency_participants.len(),
                    "location": campaign.location,
                }),
            )
            .await;

        Ok(json!({
            "campaign": campaign,
            "participants": emergency_participants,
            "status": "coordinated",
        }))
    }
}

fn campaign_title(need_type: &str, location: &str) -> String {
    match need_type {
        "alert_response" => format!("Emergency Response: {location} Environmental Alert"),
        "preventive_action" => format!("Prevent Environmental Issues in {location}"),
        "air_quality_improvement" => format!("Clear Air Initiative for {location}"),
        "pollution_emergency" => format!("Pollution Emergency Response - {location}"),
        _ => format!("Environmental Action Needed in {location}"),
    }
}

fn campaign_actions(need_type: &str) -> Vec<CampaignAction> {
    let blueprint: &[(&str, u32, &str)] = match need_type {
        "alert_response" | "pollution_emergency" => &[
            ("report_environmental_conditions", 10, "easy"),
            ("share_safety_information", 15, "easy"),
            ("organize_local_cleanup", 50, "hard"),
            ("contact_local_authorities", 25, "medium"),
        ],
        "air_quality_improvement" => &[
            ("use_public_transportation", 20, "easy"),
            ("plant_air_purifying_plants", 30, "medium"),
            ("organize_car_free_day", 100, "hard"),
            ("install_air_quality_monitor", 40, "medium"),
        ],
        _ => &[
            ("environmental_monitoring", 15, "easy"),
            ("community_education", 25, "medium"),
            ("organize_group_action", 75, "hard"),
        ],
    };

    blueprint
        .iter()
        .map(|(action, points, difficulty)| CampaignAction {
            id: format!("action_{}", Uuid::new_v4()),
            action: action.to_string(),
            points: *points,
            difficulty: difficulty.to_string(),
            completed_count: 0,
        })
        .collect()
}

/// Assign up to two open actions to each newly recruited participant.
fn assign_actions(campaign: &mut Campaign, newly_recruited: usize) -> usize {
    if newly_recruited == 0 {
        return 0;
    }

    let open_actions: Vec<(String, String)> = campaign
        .actions
        .iter()
        .filter(|action| (action.completed_count as usize) < MAX_PARTICIPANTS_PER_ACTION)
        .take(2)
        .map(|action| (action.id.clone(), action.action.clone()))
        .collect();

    let start = campaign.current_participants.len() - newly_recruited;
    let mut assignments = 0;
    for participant in &mut campaign.current_participants[start..] {
        for (action_id, action_name) in &open_actions {
            participant.assigned_actions.push(json!({
                "action_id": action_id,
                "action_name": action_name,
                "assigned_at": Utc::now(),
                "deadline": Utc::now() + chrono::Duration::days(3),
                "status": "assigned",
            }));
            assignments += 1;
        }
    }
    assignments
}

fn campaign_progress(campaign: &Campaign) -> Value {
    let total_assignments: usize = campaign
        .current_participants
        .iter()
        .map(|p| p.assigned_actions.len())
        .sum();
    let total_completions: usize = campaign
        .current_participants
        .iter()
        .map(|p| p.completed_actions.len())
        .sum();
    let completion_rate = if total_assignments > 0 {
        total_completions as f64 / total_assignments as f64 * 100.0
    } else {
        0.0
    };

    json!({
        "participants": campaign.current_participants.len(),
        "target_participants": campaign.target_participants,
        "completion_rate": completion_rate,
        "actions_available": campaign.actions.len(),
        "total_assignments": total_assignments,
        "total_completions": total_completions,
    })
}
