//! Bounded price history and drop arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::types::{rescale, to_units};

/// One observed oracle price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Raw fixed-point price as reported by the oracle.
    pub price: i128,
    pub decimals: u32,
    /// Oracle timestamp (seconds).
    pub timestamp: u64,
    /// When the monitor took the sample.
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn as_f64(&self) -> f64 {
        to_units(self.price, self.decimals)
    }

    /// The price re-expressed with `decimals` decimals.
    pub fn scaled_to(&self, decimals: u32) -> i128 {
        rescale(self.price, self.decimals, decimals)
    }
}

/// Relative change between two consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub previous: PriceSample,
    pub current: PriceSample,
    /// Positive when the price fell: `(previous - current) / previous * 100`.
    pub drop_pct: Decimal,
}

impl PriceChange {
    pub fn exceeds(&self, threshold_pct: u32) -> bool {
        self.drop_pct >= Decimal::from(threshold_pct)
    }
}

/// `(previous - current) * 100 / previous`, or `None` when `previous` is
/// not positive.
pub fn drop_percent(previous: i128, current: i128) -> Option<Decimal> {
    if previous <= 0 {
        return None;
    }
    let prev = Decimal::try_from_i128_with_scale(previous, 0).ok()?;
    let cur = Decimal::try_from_i128_with_scale(current, 0).ok()?;
    (prev - cur)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(prev)
}

/// Keeps the most recent `capacity` samples, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    capacity: usize,
    samples: VecDeque<PriceSample>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            samples: VecDeque::with_capacity(capacity.max(2)),
        }
    }

    /// Rebuild from persisted samples, keeping only the newest `capacity`.
    pub fn from_samples(capacity: usize, samples: Vec<PriceSample>) -> Self {
        let mut history = Self::new(capacity);
        for s in samples {
            history.push(s);
        }
        history
    }

    pub fn push(&mut self, sample: PriceSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    /// The sample before the latest one.
    pub fn previous(&self) -> Option<&PriceSample> {
        let n = self.samples.len();
        if n < 2 {
            None
        } else {
            self.samples.get(n - 2)
        }
    }

    /// Change from the previous sample to the latest one.
    pub fn latest_change(&self) -> Option<PriceChange> {
        let previous = self.previous()?;
        let current = self.latest()?;
        let prev = previous.scaled_to(current.decimals);
        let drop_pct = drop_percent(prev, current.price)?;
        Some(PriceChange {
            previous: previous.clone(),
            current: current.clone(),
            drop_pct,
        })
    }

    pub fn to_vec(&self) -> Vec<PriceSample> {
        self.samples.iter().cloned().collect()
    }
}
