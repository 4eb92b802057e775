//! Personal Sustainability Coach
//!
//! Generates per-user recommendations from the environmental and community
//! context, tracks sustainability scores and coaching levels, and adapts
//! challenges to current conditions. This agent has no urgent alert path;
//! it only reacts on its regular cycle.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{community, monitoring, Agent, AgentCore, CycleOutcome};
use crate::memory::SharedMemory;

pub const NAME: &str = "PersonalSustainabilityCoach";

const CYCLE_INTERVAL: Duration = Duration::from_secs(1800);
const MAX_PLAN_STEPS: usize = 5;
const ACTIVITY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub location: String,
    pub preferences: Vec<String>,
    pub current_score: u32,
    pub goals: Vec<String>,
    pub activity_history: Vec<Activity>,
    pub coaching_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub action: String,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub points: u32,
    pub impact_points: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub rec_type: String,
    pub action: String,
    pub message: String,
    pub priority: String,
    pub difficulty: String,
    pub points: u32,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration_days: u32,
    pub difficulty: String,
    pub points: u32,
    pub actions: Vec<&'static str>,
    pub adaptive: bool,
}

pub struct PersonalSustainabilityCoach {
    core: AgentCore,
    profiles: Mutex<HashMap<String, UserProfile>>,
    challenges: Mutex<Vec<Challenge>>,
    sessions: Mutex<Vec<Value>>,
}

impl PersonalSustainabilityCoach {
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(NAME, CYCLE_INTERVAL),
            profiles: Mutex::new(HashMap::new()),
            challenges: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    fn seed_profiles() -> HashMap<String, UserProfile> {
        HashMap::from([
            (
                "user_001".to_string(),
                UserProfile {
                    name: "Alice Johnson".to_string(),
                    location: "City Center".to_string(),
                    preferences: vec!["air_quality".to_string(), "energy_saving".to_string()],
                    current_score: 75,
                    goals: vec![
                        "reduce_carbon_footprint".to_string(),
                        "improve_air_quality".to_string(),
                    ],
                    activity_history: Vec::new(),
                    coaching_level: "intermediate".to_string(),
                },
            ),
            (
                "user_002".to_string(),
                UserProfile {
                    name: "Bob Smith".to_string(),
                    location: "Industrial Zone".to_string(),
                    preferences: vec![
                        "pollution_reduction".to_string(),
                        "community_action".to_string(),
                    ],
                    current_score: 60,
                    goals: vec![
                        "community_engagement".to_string(),
                        "pollution_awareness".to_string(),
                    ],
                    activity_history: Vec::new(),
                    coaching_level: "beginner".to_string(),
                },
            ),
        ])
    }

    fn seed_challenges() -> Vec<Challenge> {
        vec![
            Challenge {
                id: "challenge_001".to_string(),
                title: "7-Day Air Quality Improvement".to_string(),
                description: "Take daily actions to improve local air quality".to_string(),
                duration_days: 7,
                difficulty: "easy".to_string(),
                points: 100,
                actions: vec!["use_public_transport", "plant_indoor_plants", "report_air_quality"],
                adaptive: false,
            },
            Challenge {
                id: "challenge_002".to_string(),
                title: "Community Environmental Hero".to_string(),
                description: "Coordinate with neighbors for environmental action".to_string(),
                duration_days: 14,
                difficulty: "medium".to_string(),
                points: 250,
                actions: vec!["organize_cleanup", "educate_neighbors", "start_green_initiative"],
                adaptive: false,
            },
        ]
    }

    fn recommendations_for_user(
        user_id: &str,
        profile: &UserProfile,
        monitoring_data: &Value,
        community_data: &Value,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        let location_data = monitoring_data["environmental_data"]
            .as_array()
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|entry| entry["location"] == profile.location.as_str())
            });

        if let Some(location_data) = location_data {
            if profile.preferences.iter().any(|p| p == "air_quality") {
                let aqi = location_data["air_quality"]["aqi"].as_f64().unwrap_or(50.0);
                recommendations.push(air_quality_recommendation(
                    user_id,
                    aqi,
                    &profile.coaching_level,
                ));
            }
            recommendations.push(weather_recommendation(user_id, &location_data["weather"]));
        }

        if profile.preferences.iter().any(|p| p == "community_action") {
            if let Some(rec) = community_recommendation(
                user_id,
                &community_data["active_campaigns"],
                &profile.coaching_level,
            ) {
                recommendations.push(rec);
            }
        }

        for goal in &profile.goals {
            if let Some(rec) = goal_recommendation(user_id, goal, &profile.coaching_level) {
                recommendations.push(rec);
            }
        }

        recommendations
    }

    async fn generate_recommendations(
        &self,
        monitoring_data: &Value,
        community_data: &Value,
    ) -> Vec<Recommendation> {
        let profiles = self.profiles.lock().await;
        let mut recommendations = Vec::new();
        for (user_id, profile) in profiles.iter() {
            recommendations.extend(Self::recommendations_for_user(
                user_id,
                profile,
                monitoring_data,
                community_data,
            ));
        }
        drop(profiles);

        let previous = self
            .core
            .get_memory("recommendations_generated")
            .await
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        self.core
            .store_memory(
                "recommendations_generated",
                json!(previous + recommendations.len() as u64),
            )
            .await;

        recommendations
    }

    /// Recompute each user's sustainability score from their recent
    /// activities. Returns one update per user whose score changed.
    async fn update_user_progress(&self) -> Vec<Value> {
        let mut profiles = self.profiles.lock().await;
        let mut updates = Vec::new();

        for (user_id, profile) in profiles.iter_mut() {
            let recent = recent_activities(profile);
            let old_score = profile.current_score;
            let new_score = sustainability_score(&recent);

            if new_score != old_score {
                profile.current_score = new_score;
                updates.push(json!({
                    "user_id": user_id,
                    "old_score": old_score,
                    "new_score": new_score,
                    "change": new_score as i64 - old_score as i64,
                    "recent_activities": recent.len(),
                    "updated_at": Utc::now(),
                }));

                if new_score.saturating_sub(old_score) > 10 {
                    check_level_up(user_id, profile);
                }
            }
        }

        updates
    }

    /// Create challenges that react to the current environment.
    async fn create_adaptive_challenges(&self, monitoring_data: &Value) -> Vec<Challenge> {
        let mut created = Vec::new();

        let avg_aqi = monitoring_data["analysis"]["average_aqi"]
            .as_f64()
            .unwrap_or(50.0);
        if avg_aqi > 100.0 {
            created.push(Challenge {
                id: format!("air_emergency_challenge_{}", Uuid::new_v4()),
                title: "Air Quality Emergency Response".to_string(),
                description: "Help improve air quality during this pollution event".to_string(),
                duration_days: 3,
                difficulty: "medium".to_string(),
                points: 150,
                actions: vec![
                    "stay_indoors",
                    "use_air_purifier",
                    "report_pollution_sources",
                    "share_air_quality_info",
                ],
                adaptive: true,
            });
        }

        let has_alerts = monitoring_data["alerts"]
            .as_array()
            .is_some_and(|alerts| !alerts.is_empty());
        if has_alerts {
            created.push(Challenge {
                id: format!("alert_response_challenge_{}", Uuid::new_v4()),
                title: "Environmental Alert Response".to_string(),
                description: "Respond to current environmental alerts in your area".to_string(),
                duration_days: 5,
                difficulty: "easy".to_string(),
                points: 100,
                actions: vec!["follow_safety_guidelines", "help_neighbors", "report_conditions"],
                adaptive: true,
            });
        }

        if !created.is_empty() {
            self.challenges.lock().await.extend(created.iter().cloned());
        }
        created
    }

    async fn conduct_coaching_sessions(&self, recommendations: &[Recommendation]) -> Vec<Value> {
        let mut per_user: HashMap<&str, Vec<&Recommendation>> = HashMap::new();
        for rec in recommendations {
            per_user.entry(&rec.user_id).or_default().push(rec);
        }

        let profiles = self.profiles.lock().await;
        let mut sessions = Vec::new();
        for (user_id, user_recs) in per_user {
            let Some(profile) = profiles.get(user_id) else {
                continue;
            };
            let high_priority = user_recs.iter().filter(|r| r.priority == "high").count();
            sessions.push(json!({
                "id": format!("session_{user_id}_{}", Uuid::new_v4()),
                "user_id": user_id,
                "user_name": profile.name,
                "coaching_level": profile.coaching_level,
                "current_score": profile.current_score,
                "recommendations_count": user_recs.len(),
                "high_priority_actions": high_priority,
                "session_focus": session_focus(&user_recs),
                "personalized_message": coaching_message(profile),
                "action_plan": action_plan(&user_recs),
                "conducted_at": Utc::now(),
            }));
        }
        drop(profiles);

        self.sessions.lock().await.extend(sessions.iter().cloned());
        let previous = self
            .core
            .get_memory("coaching_sessions_conducted")
            .await
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        self.core
            .store_memory(
                "coaching_sessions_conducted",
                json!(previous + sessions.len() as u64),
            )
            .await;

        sessions
    }

    async fn user_recommendations(&self, user_id: &str) -> Value {
        let sessions = self.sessions.lock().await;
        let latest = sessions
            .iter()
            .rev()
            .take(10)
            .find(|session| session["user_id"] == user_id);
        match latest {
            Some(session) => session["action_plan"].clone(),
            None => json!([]),
        }
    }

    async fn complete_action(&self, user_id: &str, action_data: Value) -> Value {
        let mut profiles = self.profiles.lock().await;
        let Some(profile) = profiles.get_mut(user_id) else {
            return json!({"status": "error", "message": "User not found"});
        };

        let activity = Activity {
            action: action_data["action"].as_str().unwrap_or_default().to_string(),
            activity_type: action_data["type"].as_str().unwrap_or("general").to_string(),
            points: action_data["points"].as_u64().unwrap_or(10) as u32,
            impact_points: action_data["impact_points"].as_u64().unwrap_or(5) as u32,
            timestamp: Utc::now(),
        };
        let points = activity.points;
        profile.activity_history.push(activity);

        let old_score = profile.current_score;
        profile.current_score = (old_score + points / 10).min(100);

        json!({
            "status": "success",
            "points_earned": points,
            "new_score": profile.current_score,
            "score_change": profile.current_score - old_score,
        })
    }

    async fn update_profile(&self, user_id: &str, updates: Value) -> Value {
        let mut profiles = self.profiles.lock().await;
        if let Some(profile) = profiles.get_mut(user_id) {
            if let Some(name) = updates["name"].as_str() {
                profile.name = name.to_string();
            }
            if let Some(location) = updates["location"].as_str() {
                profile.location = location.to_string();
            }
            if let Some(preferences) = updates["preferences"].as_array() {
                profile.preferences = string_list(preferences);
            }
            if let Some(goals) = updates["goals"].as_array() {
                profile.goals = string_list(goals);
            }
            return json!({"status": "success", "message": "Profile updated"});
        }

        profiles.insert(
            user_id.to_string(),
            UserProfile {
                name: updates["name"].as_str().unwrap_or("User").to_string(),
                location: updates["location"].as_str().unwrap_or("general").to_string(),
                preferences: updates["preferences"]
                    .as_array()
                    .map(|v| string_list(v))
                    .unwrap_or_default(),
                current_score: 50,
                goals: updates["goals"]
                    .as_array()
                    .map(|v| string_list(v))
                    .unwrap_or_default(),
                activity_history: Vec::new(),
                coaching_level: "beginner".to_string(),
            },
        );
        json!({"status": "success", "message": "Profile updated"})
    }

    async fn coaching_stats(&self) -> Value {
        json!({
            "total_users": self.profiles.lock().await.len(),
            "sessions_conducted": self
                .core
                .get_memory("coaching_sessions_conducted")
                .await
                .unwrap_or(json!(0)),
            "recommendations_generated": self
                .core
                .get_memory("recommendations_generated")
                .await
                .unwrap_or(json!(0)),
            "active_challenges": self.challenges.lock().await.len(),
        })
    }

    async fn user_dashboard(&self, user_id: &str) -> Value {
        let profiles = self.profiles.lock().await;
        let Some(profile) = profiles.get(user_id) else {
            return json!({"error": "User not found"});
        };
        let profile = profile.clone();
        drop(profiles);

        let challenges = self.challenges.lock().await;
        let available: Vec<&Challenge> = challenges
            .iter()
            .filter(|challenge| challenge.difficulty == profile.coaching_level)
            .take(3)
            .collect();

        let recent = recent_activities(&profile);
        json!({
            "user_profile": profile,
            "current_recommendations": self.user_recommendations(user_id).await,
            "available_challenges": available,
            "progress_metrics": {
                "current_score": profile.current_score,
                "coaching_level": profile.coaching_level,
                "recent_activities": recent.len(),
                "goals_progress": goals_progress(&profile, &recent),
            },
            "achievements": achievements(&profile),
            "next_milestone": next_milestone(&profile),
        })
    }
}

impl Default for PersonalSustainabilityCoach {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CoachMessage {
    GetUserRecommendations { user_id: String },
    CompleteAction { user_id: String, action_data: Value },
    UpdateUserProfile { user_id: String, profile_updates: Value },
    GetCoachingStats,
    GetUserDashboard { user_id: String },
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl Agent for PersonalSustainabilityCoach {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    async fn initialize(&self) -> Result<()> {
        *self.profiles.lock().await = Self::seed_profiles();
        *self.challenges.lock().await = Self::seed_challenges();
        self.core.store_memory("coaching_sessions_conducted", json!(0)).await;
        self.core.store_memory("recommendations_generated", json!(0)).await;
        self.core.activate();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn execute_cycle(&self, shared: &SharedMemory) -> Result<CycleOutcome> {
        let monitoring_data = shared.data(monitoring::NAME).await.unwrap_or(json!({}));
        let community_data = shared.data(community::NAME).await.unwrap_or(json!({}));

        let recommendations = self
            .generate_recommendations(&monitoring_data, &community_data)
            .await;
        let progress_updates = self.update_user_progress().await;
        let new_challenges = self.create_adaptive_challenges(&monitoring_data).await;
        let coaching_sessions = self.conduct_coaching_sessions(&recommendations).await;

        self.core
            .record_action(
                "coaching_cycle",
                json!({
                    "recommendations_generated": recommendations.len(),
                    "users_coached": coaching_sessions.len(),
                    "challenges_created": new_challenges.len(),
                    "active_users": self.profiles.lock().await.len(),
                }),
            )
            .await;

        Ok(CycleOutcome::Completed(json!({
            "recommendations": recommendations,
            "progress_updates": progress_updates,
            "new_challenges": new_challenges,
            "coaching_sessions": coaching_sessions,
            "timestamp": Utc::now(),
        })))
    }

    async fn handle_message(&self, message: Value) -> Result<Value> {
        let message = serde_json::from_value(message).unwrap_or(CoachMessage::Unknown);

        match message {
            CoachMessage::GetUserRecommendations { user_id } => {
                Ok(self.user_recommendations(&user_id).await)
            }
            CoachMessage::CompleteAction { user_id, action_data } => {
                Ok(self.complete_action(&user_id, action_data).await)
            }
            CoachMessage::UpdateUserProfile { user_id, profile_updates } => {
                Ok(self.update_profile(&user_id, profile_updates).await)
            }
            CoachMessage::GetCoachingStats => Ok(self.coaching_stats().await),
            CoachMessage::GetUserDashboard { user_id } => Ok(self.user_dashboard(&user_id).await),
            CoachMessage::Unknown => Ok(json!({"status": "unknown_message_type"})),
        }
    }
}

fn string_list(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn air_quality_recommendation(user_id: &str, aqi: f64, coaching_level: &str) -> Recommendation {
    let (action, message, priority) = if aqi <= 50.0 {
        (
            "enjoy_outdoor_activities",
            "Great air quality today! Perfect time for outdoor exercise or activities.",
            "low",
        )
    } else if aqi <= 100.0 {
        (
            "moderate_outdoor_activity",
            "Moderate air quality. Consider indoor plants to improve your home's air.",
            "medium",
        )
    } else {
        (
            "limit_outdoor_exposure",
            "Poor air quality detected. Stay indoors and use air purifiers if available.",
            "high",
        )
    };

    Recommendation {
        id: format!("air_rec_{user_id}_{}", Uuid::new_v4()),
        user_id: user_id.to_string(),
        rec_type: "air_quality".to_string(),
        action: action.to_string(),
        message: message.to_string(),
        priority: priority.to_string(),
        difficulty: if coaching_level == "beginner" { "easy" } else { "medium" }.to_string(),
        points: if priority == "high" { 15 } else { 10 },
        context: json!({"current_aqi": aqi}),
        created_at: Utc::now(),
        expires_at: Some(Utc::now() + chrono::Duration::hours(6)),
    }
}

fn weather_recommendation(user_id: &str, weather: &Value) -> Recommendation {
    let temperature = weather["temperature"].as_f64().unwrap_or(20.0);
    let humidity = weather["humidity"].as_f64().unwrap_or(50.0);

    let (action, message) = if temperature > 30.0 {
        (
            "energy_saving_cooling",
            "Hot weather ahead! Use fans instead of AC when possible to save energy.",
        )
    } else if temperature < 10.0 {
        (
            "energy_efficient_heating",
            "Cold weather! Layer clothing and use efficient heating to reduce energy consumption.",
        )
    } else if humidity > 80.0 {
        (
            "natural_dehumidifying",
            "High humidity! Open windows for natural ventilation instead of using dehumidifiers.",
        )
    } else {
        (
            "optimal_natural_ventilation",
            "Perfect weather for natural ventilation! Open windows to reduce energy usage.",
        )
    };

    Recommendation {
        id: format!("weather_rec_{user_id}_{}", Uuid::new_v4()),
        user_id: user_id.to_string(),
        rec_type: "weather_based".to_string(),
        action: action.to_string(),
        message: message.to_string(),
        priority: "medium".to_string(),
        difficulty: "easy".to_string(),
        points: 12,
        context: weather.clone(),
        created_at: Utc::now(),
        expires_at: Some(Utc::now() + chrono::Duration::hours(12)),
    }
}

fn community_recommendation(
    user_id: &str,
    active_campaigns: &Value,
    coaching_level: &str,
) -> Option<Recommendation> {
    let campaigns = active_campaigns.as_array()?;
    let campaign = campaigns.iter().find(|campaign| {
        let participants = campaign["current_participants"]
            .as_array()
            .map(Vec::len)
            .unwrap_or(0);
        let target = campaign["target_participants"].as_u64().unwrap_or(10) as usize;
        participants < target
    })?;

    let title = campaign["title"].as_str().unwrap_or("community");
    Some(Recommendation {
        id: format!("community_rec_{user_id}_{}", Uuid::new_v4()),
        user_id: user_id.to_string(),
        rec_type: "community_action".to_string(),
        action: "join_campaign".to_string(),
        message: format!("Join the '{title}' campaign to make a community impact!"),
        priority: campaign["priority"].as_str().unwrap_or("medium").to_string(),
        difficulty: if matches!(coaching_level, "intermediate" | "advanced") {
            "medium"
        } else {
            "easy"
        }
        .to_string(),
        points: 25,
        context: json!({
            "campaign_id": campaign["id"],
            "campaign_title": campaign["title"],
        }),
        created_at: Utc::now(),
        expires_at: campaign["deadline"]
            .as_str()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
    })
}

fn goal_recommendation(user_id: &str, goal: &str, coaching_level: &str) -> Option<Recommendation> {
    let (action, message, points) = match goal {
        "reduce_carbon_footprint" => (
            "track_carbon_usage",
            "Track your daily carbon footprint and find one area to improve today.",
            20,
        ),
        "improve_air_quality" => (
            "air_quality_action",
            "Take one action today to improve air quality in your area.",
            18,
        ),
        "community_engagement" => (
            "engage_community",
            "Connect with one neighbor about environmental issues today.",
            22,
        ),
        "pollution_awareness" => (
            "learn_pollution_sources",
            "Learn about pollution sources in your area and share with others.",
            15,
        ),
        _ => return None,
    };

    Some(Recommendation {
        id: format!("goal_rec_{user_id}_{}", Uuid::new_v4()),
        user_id: user_id.to_string(),
        rec_type: "goal_based".to_string(),
        action: action.to_string(),
        message: message.to_string(),
        priority: "medium".to_string(),
        difficulty: coaching_level.to_string(),
        points,
        context: json!({"goal": goal}),
        created_at: Utc::now(),
        expires_at: Some(Utc::now() + chrono::Duration::days(1)),
    })
}

fn recent_activities(profile: &UserProfile) -> Vec<Activity> {
    let cutoff = Utc::now() - chrono::Duration::days(ACTIVITY_WINDOW_DAYS);
    profile
        .activity_history
        .iter()
        .filter(|activity| activity.timestamp > cutoff)
        .cloned()
        .collect()
}

/// Base 50, plus 5 per recent activity, 3 per distinct activity type and
/// the raw impact points, capped at 100.
fn sustainability_score(recent: &[Activity]) -> u32 {
    let activity_bonus = recent.len() as u32 * 5;
    let diversity_bonus = recent
        .iter()
        .map(|activity| activity.activity_type.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len() as u32
        * 3;
    let impact_bonus: u32 = recent.iter().map(|activity| activity.impact_points).sum();
    (50 + activity_bonus + diversity_bonus + impact_bonus).min(100)
}

fn check_level_up(user_id: &str, profile: &mut UserProfile) {
    if profile.coaching_level == "beginner" && profile.current_score > 70 {
        profile.coaching_level = "intermediate".to_string();
        info!(agent = NAME, user_id, "user leveled up to intermediate coaching");
    } else if profile.coaching_level == "intermediate" && profile.current_score > 85 {
        profile.coaching_level = "advanced".to_string();
        info!(agent = NAME, user_id, "user leveled up to advanced coaching");
    }
}

fn session_focus(recommendations: &[&Recommendation]) -> &'static str {
    if recommendations.iter().any(|r| r.rec_type == "air_quality") {
        "air_quality_improvement"
    } else if recommendations.iter().any(|r| r.rec_type == "community_action") {
        "community_engagement"
    } else if recommendations.iter().any(|r| r.rec_type == "goal_based") {
        "personal_goal_achievement"
    } else {
        "general_sustainability"
    }
}

fn coaching_message(profile: &UserProfile) -> String {
    let name = &profile.name;
    let score = profile.current_score;
    if score >= 80 {
        format!(
            "Great work, {name}! Your sustainability score of {score} shows real commitment. \
             Keep up the excellent environmental actions!"
        )
    } else if score >= 60 {
        format!(
            "Nice progress, {name}! You're at {score} points. A few more consistent actions \
             will boost your environmental impact significantly."
        )
    } else {
        format!(
            "Welcome to your sustainability journey, {name}! Starting at {score} points, \
             every small action counts. Let's build momentum together!"
        )
    }
}

fn action_plan(recommendations: &[&Recommendation]) -> Vec<Value> {
    let mut sorted: Vec<&Recommendation> = recommendations.to_vec();
    sorted.sort_by_key(|rec| {
        let priority = match rec.priority.as_str() {
            "high" => 3,
            "medium" => 2,
            _ => 1,
        };
        let difficulty = match rec.difficulty.as_str() {
            "hard" => 3,
            "medium" => 2,
            _ => 1,
        };
        std::cmp::Reverse((priority, difficulty))
    });

    sorted
        .into_iter()
        .take(MAX_PLAN_STEPS)
        .enumerate()
        .map(|(index, rec)| {
            json!({
                "step": index + 1,
                "action": rec.action,
                "description": rec.message,
                "priority": rec.priority,
                "difficulty": rec.difficulty,
                "estimated_time": estimate_action_time(rec),
                "points": rec.points,
                "deadline": rec.expires_at,
            })
        })
        .collect()
}

fn estimate_action_time(rec: &Recommendation) -> &'static str {
    match (rec.difficulty.as_str(), rec.rec_type.as_str()) {
        ("easy", "air_quality") => "5-10 minutes",
        ("easy", "weather_based") => "2-5 minutes",
        ("easy", "community_action") => "10-15 minutes",
        ("medium", "air_quality") => "15-30 minutes",
        ("medium", "community_action") => "30-60 minutes",
        ("hard", "community_action") => "1-2 hours",
        _ => "10-20 minutes",
    }
}

fn goals_progress(profile: &UserProfile, recent: &[Activity]) -> Value {
    let mut progress = serde_json::Map::new();
    for goal in &profile.goals {
        let relevant = recent
            .iter()
            .filter(|activity| activity.action.to_lowercase().contains(&goal.to_lowercase()))
            .count();
        progress.insert(goal.clone(), json!((relevant as f64 * 20.0).min(100.0)));
    }
    Value::Object(progress)
}

fn achievements(profile: &UserProfile) -> Vec<Value> {
    let mut achievements = Vec::new();
    if profile.current_score >= 70 {
        achievements.push(json!({
            "title": "Sustainability Champion",
            "description": "Reached 70+ sustainability score",
        }));
    }
    if profile.activity_history.len() >= 10 {
        achievements.push(json!({
            "title": "Action Hero",
            "description": "Completed 10+ environmental actions",
        }));
    }
    if profile.coaching_level == "advanced" {
        achievements.push(json!({
            "title": "Environmental Expert",
            "description": "Reached advanced coaching level",
        }));
    }
    achievements
}

fn next_milestone(profile: &UserProfile) -> Value {
    let score = profile.current_score;
    match profile.coaching_level.as_str() {
        "beginner" if score < 70 => json!({
            "title": "Intermediate Coach",
            "description": "Reach 70 points to unlock intermediate coaching",
            "target": 70,
            "current": score,
        }),
        "intermediate" if score < 85 => json!({
            "title": "Advanced Coach",
            "description": "Reach 85 points to unlock advanced coaching",
            "target": 85,
            "current": score,
        }),
        _ => json!({
            "title": "Sustainability Master",
            "description": "Maintain your excellent environmental impact!",
            "target": 100,
            "current": score,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_urgent_alert_path() {
        let agent = PersonalSustainabilityCoach::new();
        assert!(agent.alert_responder().is_none());
    }

    #[tokio::test]
    async fn test_air_quality_recommendation_bands() {
        let rec = air_quality_recommendation("user_001", 42.0, "beginner");
        assert_eq!(rec.priority, "low");
        assert_eq!(rec.points, 10);

        let rec = air_quality_recommendation("user_001", 130.0, "intermediate");
        assert_eq!(rec.priority, "high");
        assert_eq!(rec.action, "limit_outdoor_exposure");
        assert_eq!(rec.points, 15);
        assert_eq!(rec.difficulty, "medium");
    }

    #[tokio::test]
    async fn test_cycle_generates_recommendations_and_sessions() -> Result<()> {
        let agent = PersonalSustainabilityCoach::new();
        agent.initialize().await?;

        let shared = SharedMemory::new();
        shared
            .slot(monitoring::NAME)
            .publish(json!({
                "environmental_data": [{
                    "location": "City Center",
                    "air_quality": {"aqi": 120.0},
                    "weather": {"temperature": 22.0, "humidity": 55.0},
                }],
                "analysis": {"average_aqi": 120.0},
                "alerts": [{"type": "air_quality", "severity": "high"}],
            }))
            .await;

        let CycleOutcome::Completed(result) = agent.execute_cycle(&shared).await? else {
            panic!("cycle should complete");
        };

        // Alice lives in City Center: AQI + weather + 2 goals. Bob has no
        // location data: 2 goal recommendations only.
        assert_eq!(result["recommendations"].as_array().unwrap().len(), 6);
        assert_eq!(result["coaching_sessions"].as_array().unwrap().len(), 2);
        // High AQI and open alerts each spawn an adaptive challenge
        assert_eq!(result["new_challenges"].as_array().unwrap().len(), 2);
        assert_eq!(agent.challenges.lock().await.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_action_updates_score() -> Result<()> {
        let agent = PersonalSustainabilityCoach::new();
        agent.initialize().await?;

        let response = agent
            .handle_message(json!({
                "type": "complete_action",
                "user_id": "user_002",
                "action_data": {"action": "use_public_transport", "points": 30},
            }))
            .await?;
        assert_eq!(response["status"], "success");
        assert_eq!(response["points_earned"], 30);
        assert_eq!(response["new_score"], 63);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_profile_creates_unknown_user() -> Result<()> {
        let agent = PersonalSustainabilityCoach::new();
        agent.initialize().await?;

        let response = agent
            .handle_message(json!({
                "type": "update_user_profile",
                "user_id": "user_042",
                "profile_updates": {"name": "Dana", "goals": ["pollution_awareness"]},
            }))
            .await?;
        assert_eq!(response["status"], "success");

        let stats = agent.handle_message(json!({"type": "get_coaching_stats"})).await?;
        assert_eq!(stats["total_users"], 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_message_maps_to_unknown() -> Result<()> {
        let agent = PersonalSustainabilityCoach::new();
        let response = agent.handle_message(json!({"type": "do_magic"})).await?;
        assert_eq!(response["status"], "unknown_message_type");
        Ok(())
    }
}
