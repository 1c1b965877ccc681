//! Live mode: missions read from the mission controller contract.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{DataMode, Difficulty, MissionType, MissionView, SharedBoard};
use crate::contracts::MissionControllerClient;
use crate::types::{to_units, Mission, STROOP_DECIMALS};

/// Difficulty from the hours left before the deadline.
pub fn difficulty_for(hours_left: i64) -> Difficulty {
    match hours_left {
        h if h < 12 => Difficulty::Critical,
        h if h < 24 => Difficulty::Hard,
        h if h < 48 => Difficulty::Medium,
        _ => Difficulty::Easy,
    }
}

pub fn mission_view_from_chain(mission: &Mission, now: DateTime<Utc>) -> MissionView {
    let deadline = mission.deadline_at();
    let trigger = to_units(mission.trigger_price, STROOP_DECIMALS);
    MissionView {
        id: mission.id.to_string(),
        title: format!("Emergency Mission #{}", mission.id),
        description: format!(
            "Emergency liquidity mission opened after the price fell to ${trigger:.4}."
        ),
        target_liquidity: to_units(mission.target_liquidity, STROOP_DECIMALS),
        current_progress: to_units(mission.current_progress, STROOP_DECIMALS),
        reward_pool: to_units(mission.reward_pool, STROOP_DECIMALS),
        deadline,
        participants_count: mission.participants_count,
        trigger_price: trigger,
        active: mission.active,
        difficulty: difficulty_for((deadline - now).num_hours()),
        mission_type: MissionType::Emergency,
    }
}

/// Source of live missions for the board.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MissionFetcher: Send + Sync {
    async fn fetch_missions(&self) -> Result<Vec<MissionView>>;
}

/// Fetches missions `1..` from the mission controller.
pub struct ChainMissions {
    controller: MissionControllerClient,
    max_missions: u64,
}

impl ChainMissions {
    pub fn new(controller: MissionControllerClient, max_missions: u64) -> Self {
        Self {
            controller,
            max_missions,
        }
    }
}

#[async_trait]
impl MissionFetcher for ChainMissions {
    async fn fetch_missions(&self) -> Result<Vec<MissionView>> {
        let now = Utc::now();
        let missions = self.controller.list_missions(self.max_missions).await?;
        Ok(missions.iter().map(|m| mission_view_from_chain(m, now)).collect())
    }
}

/// Flip between demo and live data. Going live loads missions from
/// `fetcher`; on failure the board stays in demo mode. A switch to live
/// while another load is in flight is refused. Returns the new mode.
pub async fn toggle_data_source(
    board: &SharedBoard,
    fetcher: Option<&dyn MissionFetcher>,
) -> Result<DataMode> {
    // Mode and loading flag are checked under the same write guard.
    let mut b = board.write().await;
    if b.mode == DataMode::Live {
        b.mode = DataMode::Demo;
        b.restore_demo(Utc::now());
        info!("Switched to demo data");
        return Ok(DataMode::Demo);
    }
    let Some(fetcher) = fetcher else {
        anyhow::bail!("live data needs a configured mission controller");
    };
    if b.loading {
        anyhow::bail!("a live data load is already in progress");
    }
    b.set_loading(true);
    drop(b);

    let fetched = fetcher.fetch_missions().await;

    let mut b = board.write().await;
    b.set_loading(false);
    match fetched {
        Ok(missions) => {
            info!(count = missions.len(), "Switched to live data");
            b.set_missions(missions);
            b.participations.clear();
            b.mode = DataMode::Live;
            Ok(DataMode::Live)
        }
        Err(e) => {
            warn!(error = %e, "Failed to load on-chain missions");
            Err(e)
        }
    }
}
