//! Demo data: four crisis missions, two participations and a price chart.

use chrono::{DateTime, Duration, Utc};

use super::{
    Difficulty, MissionType, MissionView, Participation, PricePoint, PriceSnapshot, UserStats,
};

/// Seed price of the demo chart.
pub const DEMO_PRICE: f64 = 0.0847;

/// Price 24 h before the end of the demo chart; demo changes are measured
/// against it.
pub const DEMO_PRICE_24H_AGO: f64 = 0.0925;

#[allow(clippy::too_many_arguments)]
fn mission(
    id: &str,
    title: &str,
    description: &str,
    target: f64,
    progress: f64,
    reward: f64,
    deadline: DateTime<Utc>,
    participants: u32,
    trigger: f64,
    difficulty: Difficulty,
    mission_type: MissionType,
) -> MissionView {
    MissionView {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        target_liquidity: target,
        current_progress: progress,
        reward_pool: reward,
        deadline,
        participants_count: participants,
        trigger_price: trigger,
        active: true,
        difficulty,
        mission_type,
    }
}

pub fn missions(now: DateTime<Utc>) -> Vec<MissionView> {
    vec![
        mission(
            "mission-001",
            "XLM/USDC Liquidity Crisis",
            "Massive sell-off detected in XLM/USDC pair. Deploy emergency liquidity to prevent further market destabilization. Critical priority mission.",
            100_000.0,
            67_500.0,
            50_000.0,
            now + Duration::hours(18),
            127,
            0.08,
            Difficulty::Critical,
            MissionType::Liquidity,
        ),
        mission(
            "mission-002",
            "Stellar Network Stability",
            "Network congestion threatening transaction throughput. Validators needed to maintain consensus and process backlog.",
            75_000.0,
            32_100.0,
            35_000.0,
            now + Duration::hours(36),
            89,
            0.082,
            Difficulty::Hard,
            MissionType::Stability,
        ),
        mission(
            "mission-003",
            "Community Defense Protocol",
            "Coordinated attack detected on ecosystem tokens. Rally the community to defend key liquidity pools and maintain market confidence.",
            50_000.0,
            43_800.0,
            28_000.0,
            now + Duration::hours(8),
            156,
            0.075,
            Difficulty::Medium,
            MissionType::Community,
        ),
        mission(
            "mission-004",
            "Bridge Stabilization",
            "Cross-chain bridge showing irregular activity patterns. Deploy monitoring and backup liquidity to ensure seamless transfers.",
            25_000.0,
            19_750.0,
            15_000.0,
            now + Duration::hours(72),
            43,
            0.083,
            Difficulty::Easy,
            MissionType::Stability,
        ),
    ]
}

pub fn participations(now: DateTime<Utc>) -> Vec<Participation> {
    vec![
        Participation {
            mission_id: "mission-001".into(),
            stake_amount: 5_000.0,
            contribution_amount: 2_000.0,
            rewards_earned: 150.0,
            enlisted_at: now - Duration::hours(10),
            last_contribution: now - Duration::hours(1),
        },
        Participation {
            mission_id: "mission-003".into(),
            stake_amount: 2_500.0,
            contribution_amount: 1_000.0,
            rewards_earned: 75.0,
            enlisted_at: now - Duration::hours(20),
            last_contribution: now - Duration::hours(2),
        },
    ]
}

pub fn user_stats() -> UserStats {
    UserStats {
        total_staked: 7_500.0,
        missions_participated: 2,
        total_rewards: 225.0,
        missions_completed: 0,
        success_rate: 0.0,
        average_contribution: 1_500.0,
        rank: "Scout".into(),
    }
}

/// Price shown before the first feed update.
pub fn initial_price() -> PriceSnapshot {
    PriceSnapshot {
        current_price: 0.12,
        price_change_24h: -2.5,
        chart_data: Vec::new(),
    }
}

/// The demo chart: seven points over the last 24 hours.
pub fn price_data(now: DateTime<Utc>) -> PriceSnapshot {
    let points = [
        (24, DEMO_PRICE_24H_AGO),
        (20, 0.0918),
        (16, 0.0896),
        (12, 0.0875),
        (8, 0.0859),
        (4, 0.0851),
        (0, DEMO_PRICE),
    ];
    PriceSnapshot {
        current_price: DEMO_PRICE,
        price_change_24h: -8.3,
        chart_data: points
            .iter()
            .map(|(hours_ago, price)| PricePoint {
                timestamp: (now - Duration::hours(*hours_ago)).timestamp_millis(),
                price: *price,
            })
            .collect(),
    }
}
