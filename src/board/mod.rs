//! Mission board: the state behind the dashboard.
//!
//! Holds the missions shown to users, the connected user's participations
//! and stats, the latest price snapshot and the data mode. In demo mode all
//! actions apply locally; in live mode missions are loaded from the
//! mission controller (see `chain`).
//!
//! Amounts here are display units (KALE, USD), not stroops.

pub mod chain;
pub mod seed;
pub mod simulation;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::MissionError;

// ---------------------------------------------------------------------------
// View types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionType {
    Liquidity,
    Stability,
    Emergency,
    Community,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub target_liquidity: f64,
    pub current_progress: f64,
    pub reward_pool: f64,
    pub deadline: DateTime<Utc>,
    pub participants_count: u32,
    pub trigger_price: f64,
    pub active: bool,
    pub difficulty: Difficulty,
    pub mission_type: MissionType,
}

impl MissionView {
    /// Progress toward the target in percent (not clamped).
    pub fn progress_pct(&self) -> f64 {
        if self.target_liquidity <= 0.0 {
            0.0
        } else {
            self.current_progress / self.target_liquidity * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub mission_id: String,
    pub stake_amount: f64,
    pub contribution_amount: f64,
    pub rewards_earned: f64,
    pub enlisted_at: DateTime<Utc>,
    pub last_contribution: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_staked: f64,
    pub missions_participated: u32,
    pub total_rewards: f64,
    pub missions_completed: u32,
    pub success_rate: f64,
    pub average_contribution: f64,
    pub rank: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub current_price: f64,
    pub price_change_24h: f64,
    pub chart_data: Vec<PricePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Demo,
    Live,
}

/// Admin mission form. Every field is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MissionForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_liquidity: Option<f64>,
    pub reward_pool: Option<f64>,
    pub duration_hours: Option<f64>,
    pub trigger_price: Option<f64>,
}

impl MissionForm {
    /// Names of fields that are absent, blank or zero.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let text = [("title", &self.title), ("description", &self.description)];
        for (name, value) in text {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                missing.push(name.to_string());
            }
        }
        let numbers = [
            ("target_liquidity", self.target_liquidity),
            ("reward_pool", self.reward_pool),
            ("duration_hours", self.duration_hours),
            ("trigger_price", self.trigger_price),
        ];
        for (name, value) in numbers {
            if value.map_or(true, |v| v == 0.0 || v.is_nan()) {
                missing.push(name.to_string());
            }
        }
        missing
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub active_missions: usize,
    pub total_liquidity_deployed: f64,
    pub total_reward_pool: f64,
    pub total_participants: u64,
    pub completed_missions: usize,
    pub critical_missions: usize,
    /// Average progress ratio × 100, clamped to 0–100.
    pub ecosystem_health: f64,
    /// "HIGH" when any critical mission exists, else "STABLE".
    pub threat_level: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionWithParticipation {
    #[serde(flatten)]
    pub mission: MissionView,
    pub participation: Participation,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyMissions {
    pub active: Vec<MissionWithParticipation>,
    pub completed: Vec<MissionWithParticipation>,
    pub total_rewards_to_claim: f64,
    pub stats: UserStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionDetail {
    pub mission: MissionView,
    pub progress_pct: f64,
    /// `"{h}h {m}m"` or `"EXPIRED"`.
    pub time_left: String,
    /// Fewer than 12 whole hours left.
    pub urgent: bool,
    /// Hours left, rounded up.
    pub hours_left: i64,
    pub participation: Option<Participation>,
}

/// `"{h}h {m}m"` until `deadline`, or `"EXPIRED"`, plus the urgency flag.
pub fn time_left(deadline: DateTime<Utc>, now: DateTime<Utc>) -> (String, bool) {
    let diff = deadline - now;
    if diff <= Duration::zero() {
        return ("EXPIRED".to_string(), false);
    }
    let hours = diff.num_hours();
    let minutes = diff.num_minutes() % 60;
    (format!("{hours}h {minutes}m"), hours < 12)
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Board shared between the API handlers and the background updaters.
pub type SharedBoard = Arc<RwLock<MissionBoard>>;

#[derive(Debug, Clone)]
pub struct MissionBoard {
    pub missions: Vec<MissionView>,
    pub participations: Vec<Participation>,
    pub user_stats: UserStats,
    pub price: PriceSnapshot,
    pub loading: bool,
    pub mode: DataMode,
}

impl MissionBoard {
    /// Demo board seeded relative to `now`.
    pub fn demo(now: DateTime<Utc>) -> Self {
        Self {
            missions: seed::missions(now),
            participations: seed::participations(now),
            user_stats: seed::user_stats(),
            price: seed::initial_price(),
            loading: false,
            mode: DataMode::Demo,
        }
    }

    /// Put the demo missions, participations and stats back.
    pub fn restore_demo(&mut self, now: DateTime<Utc>) {
        self.missions = seed::missions(now);
        self.participations = seed::participations(now);
        self.user_stats = seed::user_stats();
    }

    pub fn mission(&self, id: &str) -> Option<&MissionView> {
        self.missions.iter().find(|m| m.id == id)
    }

    fn mission_mut(&mut self, id: &str) -> Result<&mut MissionView, MissionError> {
        self.missions
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MissionError::MissionNotFound(id.to_string()))
    }

    pub fn participation(&self, mission_id: &str) -> Option<&Participation> {
        self.participations.iter().find(|p| p.mission_id == mission_id)
    }

    pub fn set_missions(&mut self, missions: Vec<MissionView>) {
        self.missions = missions;
    }

    pub fn update_price_data(&mut self, price: PriceSnapshot) {
        self.price = price;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn update_mission_progress(
        &mut self,
        id: &str,
        progress: f64,
        participants: u32,
    ) -> Result<(), MissionError> {
        let mission = self.mission_mut(id)?;
        mission.current_progress = progress;
        mission.participants_count = participants;
        Ok(())
    }

    /// Add a mission from the admin form (demo mode).
    pub fn create_mission(
        &mut self,
        form: &MissionForm,
        now: DateTime<Utc>,
    ) -> Result<MissionView, MissionError> {
        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(MissionError::MissingFields(missing));
        }
        let number = |v: Option<f64>| v.unwrap_or_default();
        let (target, reward, hours, trigger) = (
            number(form.target_liquidity),
            number(form.reward_pool),
            number(form.duration_hours),
            number(form.trigger_price),
        );
        if [target, reward, hours, trigger].iter().any(|v| !v.is_finite()) {
            return Err(MissionError::Validation("amounts must be finite numbers".into()));
        }
        if target < 0.0 || reward < 0.0 || hours < 0.0 || trigger < 0.0 {
            return Err(MissionError::Validation("amounts must be positive".into()));
        }
        let deadline = mission_deadline(now, hours).ok_or_else(|| {
            MissionError::Validation(format!("duration_hours {hours} is out of range"))
        })?;

        let mission = MissionView {
            id: format!("mission-{}", now.timestamp_millis()),
            title: form.title.clone().unwrap_or_default().trim().to_string(),
            description: form.description.clone().unwrap_or_default().trim().to_string(),
            target_liquidity: target,
            current_progress: 0.0,
            reward_pool: reward,
            deadline,
            participants_count: 0,
            trigger_price: trigger,
            active: true,
            difficulty: Difficulty::Medium,
            mission_type: MissionType::Liquidity,
        };
        info!(id = %mission.id, title = %mission.title, "Mission created");
        self.missions.push(mission.clone());
        Ok(mission)
    }

    /// Stake `stake` KALE in a mission.
    pub fn enlist(
        &mut self,
        mission_id: &str,
        stake: f64,
        now: DateTime<Utc>,
    ) -> Result<(), MissionError> {
        if !(stake > 0.0) {
            return Err(MissionError::Validation(format!("stake must be positive, got {stake}")));
        }
        if self.participation(mission_id).is_some() {
            warn!(mission_id, "User already enlisted");
            return Err(MissionError::AlreadyEnlisted(mission_id.to_string()));
        }
        self.mission_mut(mission_id)?.participants_count += 1;

        self.participations.push(Participation {
            mission_id: mission_id.to_string(),
            stake_amount: stake,
            contribution_amount: 0.0,
            rewards_earned: 0.0,
            enlisted_at: now,
            last_contribution: now,
        });
        self.user_stats.total_staked += stake;
        self.user_stats.missions_participated += 1;
        info!(mission_id, stake, "Enlisted in mission");
        Ok(())
    }

    /// Contribute `amount` toward a mission's target. Joins the mission
    /// first if the user has not enlisted.
    pub fn add_contribution(
        &mut self,
        mission_id: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<MissionView, MissionError> {
        if !(amount > 0.0) {
            return Err(MissionError::Validation(format!("amount must be positive, got {amount}")));
        }
        // Validate the id before touching participations.
        self.mission_mut(mission_id)?;

        let is_new = match self.participations.iter_mut().find(|p| p.mission_id == mission_id) {
            Some(p) => {
                p.contribution_amount += amount;
                p.last_contribution = now;
                false
            }
            None => {
                self.participations.push(Participation {
                    mission_id: mission_id.to_string(),
                    stake_amount: 0.0,
                    contribution_amount: amount,
                    rewards_earned: 0.0,
                    enlisted_at: now,
                    last_contribution: now,
                });
                true
            }
        };

        let total: f64 = self.participations.iter().map(|p| p.contribution_amount).sum();
        self.user_stats.average_contribution = total / self.participations.len() as f64;
        if is_new {
            self.user_stats.missions_participated += 1;
        }

        let mission = self.mission_mut(mission_id)?;
        mission.current_progress += amount;
        if is_new {
            mission.participants_count += 1;
        }
        mission.active = mission.current_progress < mission.target_liquidity;
        if !mission.active {
            info!(mission_id, "Mission target reached");
        }
        Ok(mission.clone())
    }

    pub fn summary(&self) -> DashboardSummary {
        let n = self.missions.len();
        let avg_progress = if n == 0 {
            0.0
        } else {
            self.missions
                .iter()
                .map(|m| {
                    if m.target_liquidity > 0.0 {
                        m.current_progress / m.target_liquidity
                    } else {
                        0.0
                    }
                })
                .sum::<f64>()
                / n as f64
        };
        let critical = self
            .missions
            .iter()
            .filter(|m| m.difficulty == Difficulty::Critical)
            .count();

        DashboardSummary {
            active_missions: self.missions.iter().filter(|m| m.active).count(),
            total_liquidity_deployed: self.missions.iter().map(|m| m.current_progress).sum(),
            total_reward_pool: self.missions.iter().map(|m| m.reward_pool).sum(),
            total_participants: self.missions.iter().map(|m| u64::from(m.participants_count)).sum(),
            completed_missions: self.missions.iter().filter(|m| !m.active).count(),
            critical_missions: critical,
            ecosystem_health: (avg_progress * 100.0).clamp(0.0, 100.0),
            threat_level: if critical > 0 { "HIGH" } else { "STABLE" },
        }
    }

    pub fn my_missions(&self) -> MyMissions {
        let joined: Vec<MissionWithParticipation> = self
            .participations
            .iter()
            .filter_map(|p| {
                self.mission(&p.mission_id).map(|m| MissionWithParticipation {
                    mission: m.clone(),
                    participation: p.clone(),
                })
            })
            .collect();
        let (active, completed): (Vec<_>, Vec<_>) =
            joined.into_iter().partition(|m| m.mission.active);
        let total_rewards_to_claim = completed.iter().map(|m| m.participation.rewards_earned).sum();

        MyMissions {
            active,
            completed,
            total_rewards_to_claim,
            stats: self.user_stats.clone(),
        }
    }

    pub fn detail(&self, id: &str, now: DateTime<Utc>) -> Option<MissionDetail> {
        let mission = self.mission(id)?.clone();
        let (time_left, urgent) = time_left(mission.deadline, now);
        let secs = (mission.deadline - now).num_seconds();
        let hours_left = if secs <= 0 { 0 } else { (secs + 3599) / 3600 };
        Some(MissionDetail {
            progress_pct: mission.progress_pct(),
            time_left,
            urgent,
            hours_left,
            participation: self.participation(id).cloned(),
            mission,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

fn mission_deadline(now: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    // Float to int casts saturate; try_seconds rejects what Duration can't hold.
    let span = Duration::try_seconds((hours * 3600.0) as i64)?;
    now.checked_add_signed(span)
}
