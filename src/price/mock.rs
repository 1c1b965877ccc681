//! Generated prices for demo mode and as the last live fallback.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::board::{PricePoint, PriceSnapshot};

/// Bounds the mock base price can be moved within.
pub const MOCK_PRICE_MIN: f64 = 0.05;
pub const MOCK_PRICE_MAX: f64 = 0.20;

const SPOT_SWING: f64 = 0.008;
const CHANGE_SWING: f64 = 15.0;
const HOURLY_SWING: f64 = 0.003;
const HISTORY_MIN: f64 = 0.08;
const HISTORY_MAX: f64 = 0.15;
const HISTORY_POINTS: i64 = 24;

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Random-walk price generator around a movable base price.
#[derive(Debug, Clone)]
pub struct MockFeed {
    base: f64,
}

impl MockFeed {
    pub fn new(base: f64) -> Self {
        Self {
            base: base.clamp(MOCK_PRICE_MIN, MOCK_PRICE_MAX),
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Move the base price, clamped to [0.05, 0.20]. Returns the new base.
    pub fn set_base(&mut self, price: f64) -> f64 {
        self.base = price.clamp(MOCK_PRICE_MIN, MOCK_PRICE_MAX);
        self.base
    }

    /// Base ±0.4 %, a 24 h change within ±7.5 % and a fresh hourly chart.
    pub fn snapshot<R: Rng>(&self, rng: &mut R, now: DateTime<Utc>) -> PriceSnapshot {
        let variation = (rng.gen::<f64>() - 0.5) * SPOT_SWING;
        PriceSnapshot {
            current_price: round_to(self.base + variation, 6),
            price_change_24h: round_to((rng.gen::<f64>() - 0.5) * CHANGE_SWING, 2),
            chart_data: self.history(rng, now),
        }
    }

    /// 24 hourly points ending at `now`, walking from the base price and
    /// clamped to [0.08, 0.15].
    pub fn history<R: Rng>(&self, rng: &mut R, now: DateTime<Utc>) -> Vec<PricePoint> {
        let mut price = self.base;
        (0..HISTORY_POINTS)
            .rev()
            .map(|hours_ago| {
                let step = (rng.gen::<f64>() - 0.5) * HOURLY_SWING;
                price = (price + step).clamp(HISTORY_MIN, HISTORY_MAX);
                PricePoint {
                    timestamp: (now - Duration::hours(hours_ago)).timestamp_millis(),
                    price: round_to(price, 6),
                }
            })
            .collect()
    }
}
