//! Demo-mode activity: a price tick every 5 s and a mission progress tick
//! every 15 s. Ticks are skipped while the board is in live mode.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::seed::{self, DEMO_PRICE, DEMO_PRICE_24H_AGO};
use super::{DataMode, MissionBoard, PricePoint, PriceSnapshot, SharedBoard};

pub const PRICE_TICK: Duration = Duration::from_secs(5);
pub const MISSION_TICK: Duration = Duration::from_secs(15);

/// Largest swing of a demo price tick, either side of the seed price.
const PRICE_SWING: f64 = 0.001;
const MIN_PRICE: f64 = 0.001;
const MAX_PROGRESS_STEP: f64 = 500.0;

/// Next demo price snapshot. The chart window slides by one point.
pub fn price_tick<R: Rng>(rng: &mut R, current: &PriceSnapshot, now: DateTime<Utc>) -> PriceSnapshot {
    let change = (rng.gen::<f64>() - 0.5) * 2.0 * PRICE_SWING;
    let price = (DEMO_PRICE + change).max(MIN_PRICE);

    let base = if current.chart_data.is_empty() {
        seed::price_data(now).chart_data
    } else {
        current.chart_data.clone()
    };
    let mut chart_data: Vec<PricePoint> = base.into_iter().skip(1).collect();
    chart_data.push(PricePoint {
        timestamp: now.timestamp_millis(),
        price,
    });

    PriceSnapshot {
        current_price: price,
        price_change_24h: (price - DEMO_PRICE_24H_AGO) / DEMO_PRICE_24H_AGO * 100.0,
        chart_data,
    }
}

/// Random progress (up to 500) and 0–1 new participants for every active
/// mission below its target. Progress never exceeds the target.
pub fn mission_tick<R: Rng>(rng: &mut R, board: &mut MissionBoard) {
    let updates: Vec<(String, f64, u32)> = board
        .missions
        .iter()
        .filter(|m| m.active && m.current_progress < m.target_liquidity)
        .map(|m| {
            let progress = (m.current_progress + rng.gen::<f64>() * MAX_PROGRESS_STEP)
                .min(m.target_liquidity);
            let participants = m.participants_count + rng.gen_range(0..=1);
            (m.id.clone(), progress, participants)
        })
        .collect();

    for (id, progress, participants) in updates {
        // Ids come from the board itself.
        let _ = board.update_mission_progress(&id, progress, participants);
    }
}

/// Run both ticks until `shutdown` flips to true.
pub fn spawn(board: SharedBoard, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut price_interval = tokio::time::interval(PRICE_TICK);
        let mut mission_interval = tokio::time::interval(MISSION_TICK);
        let mut rng = StdRng::from_entropy();

        loop {
            tokio::select! {
                _ = price_interval.tick() => {
                    let mut b = board.write().await;
                    if b.mode == DataMode::Demo {
                        let next = price_tick(&mut rng, &b.price, Utc::now());
                        debug!(price = next.current_price, "Demo price tick");
                        b.update_price_data(next);
                    }
                }
                _ = mission_interval.tick() => {
                    let mut b = board.write().await;
                    if b.mode == DataMode::Demo {
                        mission_tick(&mut rng, &mut b);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Demo simulation stopped");
    })
}
