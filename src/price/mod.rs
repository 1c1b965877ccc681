//! XLM price feed for the dashboard.
//!
//! Demo mode serves generated prices. Live mode asks the reflector reader
//! contract first, then CoinGecko, and falls back to generated prices when
//! both fail. Snapshots are broadcast to subscribers and, in live mode,
//! written into the mission board by the periodic updater.

pub mod coingecko;
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::{DataMode, PricePoint, PriceSnapshot, SharedBoard};
use crate::contracts::ReflectorReaderClient;
use crate::types::to_units;
use mock::{round_to, MockFeed};

/// Asset symbol queried from the reflector reader.
pub const ORACLE_SYMBOL: &str = "XLM";

const SUBSCRIBER_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Feed seams
// ---------------------------------------------------------------------------

/// On-chain spot price in USD.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OracleFeed: Send + Sync {
    async fn spot_usd(&self, symbol: &str) -> Result<f64>;
    fn label(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotQuote {
    pub price: f64,
    pub change_24h: f64,
}

/// Off-chain market data: spot with 24 h change, plus hourly history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn spot(&self) -> Result<SpotQuote>;
    async fn history(&self) -> Result<Vec<PricePoint>>;
}

/// Reflector reader prices scaled by the oracle's decimals.
pub struct ReflectorFeed {
    reader: ReflectorReaderClient,
    fallback_decimals: u32,
}

impl ReflectorFeed {
    pub fn new(reader: ReflectorReaderClient, fallback_decimals: u32) -> Self {
        Self {
            reader,
            fallback_decimals,
        }
    }
}

#[async_trait]
impl OracleFeed for ReflectorFeed {
    async fn spot_usd(&self, symbol: &str) -> Result<f64> {
        let price = self.reader.get_price(symbol).await?;
        if price.is_missing() {
            anyhow::bail!("reflector has no price for {symbol}");
        }
        let decimals = match self.reader.get_oracle_decimals().await {
            Ok(d) if d > 0 => d,
            _ => self.fallback_decimals,
        };
        Ok(to_units(price.price, decimals))
    }

    fn label(&self) -> String {
        format!("reflector_reader:{}", self.reader.contract_id())
    }
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Percent change from the oldest history point to `current`, two places.
pub fn price_change_24h(history: &[PricePoint], current: f64) -> f64 {
    match history.first() {
        Some(oldest) if oldest.price > 0.0 => {
            round_to((current - oldest.price) / oldest.price * 100.0, 2)
        }
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceStats {
    pub current: f64,
    pub change_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// (high - low) / low in percent.
    pub volatility: f64,
}

impl PriceStats {
    pub fn from_snapshot(snapshot: &PriceSnapshot) -> Self {
        let prices = snapshot.chart_data.iter().map(|p| p.price);
        let (high, low) = prices.fold(None, |acc: Option<(f64, f64)>, p| match acc {
            None => Some((p, p)),
            Some((h, l)) => Some((h.max(p), l.min(p))),
        })
        .unwrap_or((snapshot.current_price, snapshot.current_price));

        let volatility = if low > 0.0 {
            round_to((high - low) / low * 100.0, 2)
        } else {
            0.0
        };
        Self {
            current: snapshot.current_price,
            change_24h: snapshot.price_change_24h,
            high_24h: round_to(high, 6),
            low_24h: round_to(low, 6),
            volatility,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceFeedStatus {
    pub running: bool,
    pub subscriber_count: usize,
    pub last_known_price: f64,
    pub mock_base_price: f64,
    pub oracle: Option<String>,
    pub market_data: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct PriceService {
    oracle: Option<Arc<dyn OracleFeed>>,
    market: Option<Arc<dyn MarketFeed>>,
    mock: RwLock<MockFeed>,
    last_known: RwLock<f64>,
    updates: broadcast::Sender<PriceSnapshot>,
    running: AtomicBool,
}

impl PriceService {
    pub fn new(
        oracle: Option<Arc<dyn OracleFeed>>,
        market: Option<Arc<dyn MarketFeed>>,
        mock_base_price: f64,
    ) -> Self {
        let (updates, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let mock = MockFeed::new(mock_base_price);
        Self {
            oracle,
            market,
            last_known: RwLock::new(mock.base()),
            mock: RwLock::new(mock),
            updates,
            running: AtomicBool::new(false),
        }
    }

    /// Demo-only service with no external feeds.
    pub fn demo(mock_base_price: f64) -> Self {
        Self::new(None, None, mock_base_price)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceSnapshot> {
        self.updates.subscribe()
    }

    async fn mock_snapshot(&self) -> PriceSnapshot {
        let mock = self.mock.read().await;
        mock.snapshot(&mut rand::thread_rng(), Utc::now())
    }

    async fn mock_history(&self) -> Vec<PricePoint> {
        let mock = self.mock.read().await;
        mock.history(&mut rand::thread_rng(), Utc::now())
    }

    /// CoinGecko history, or a generated one when unavailable.
    async fn history_or_mock(&self) -> Vec<PricePoint> {
        if let Some(market) = &self.market {
            match market.history().await {
                Ok(h) if !h.is_empty() => return h,
                Ok(_) => warn!("CoinGecko returned an empty history"),
                Err(e) => warn!(error = %e, "CoinGecko history unavailable"),
            }
        }
        self.mock_history().await
    }

    async fn live_snapshot(&self) -> PriceSnapshot {
        if let Some(oracle) = &self.oracle {
            match oracle.spot_usd(ORACLE_SYMBOL).await {
                Ok(price) if price > 0.0 => {
                    debug!(price, source = %oracle.label(), "Oracle price");
                    let history = self.history_or_mock().await;
                    return PriceSnapshot {
                        current_price: price,
                        price_change_24h: price_change_24h(&history, price),
                        chart_data: history,
                    };
                }
                Ok(_) => warn!("Oracle reported a zero price"),
                Err(e) => warn!(error = %e, "Oracle unavailable, trying CoinGecko"),
            }
        }

        if let Some(market) = &self.market {
            match market.spot().await {
                Ok(quote) => {
                    let history = self.history_or_mock().await;
                    return PriceSnapshot {
                        current_price: quote.price,
                        price_change_24h: quote.change_24h,
                        chart_data: history,
                    };
                }
                Err(e) => warn!(error = %e, "CoinGecko unavailable, using generated prices"),
            }
        }

        self.mock_snapshot().await
    }

    /// Current snapshot for `mode`. Never fails: live mode degrades to
    /// generated prices.
    pub async fn current_prices(&self, mode: DataMode) -> PriceSnapshot {
        let snapshot = match mode {
            DataMode::Demo => self.mock_snapshot().await,
            DataMode::Live => self.live_snapshot().await,
        };
        *self.last_known.write().await = snapshot.current_price;
        snapshot
    }

    pub async fn latest_price(&self, mode: DataMode) -> f64 {
        self.current_prices(mode).await.current_price
    }

    pub async fn last_known_price(&self) -> f64 {
        *self.last_known.read().await
    }

    /// True when the current price is at or below `trigger`.
    pub async fn check_trigger_price(&self, trigger: f64, mode: DataMode) -> bool {
        let current = self.latest_price(mode).await;
        let triggered = current <= trigger;
        if triggered {
            warn!(current, trigger, "Mission trigger price reached");
        }
        triggered
    }

    pub async fn price_stats(&self, mode: DataMode) -> PriceStats {
        PriceStats::from_snapshot(&self.current_prices(mode).await)
    }

    /// Move the demo base price. Returns the clamped value.
    pub async fn update_mock_price(&self, price: f64) -> f64 {
        let base = self.mock.write().await.set_base(price);
        info!(base, "Updated mock price");
        base
    }

    /// Fetch now and publish to subscribers.
    pub async fn refresh_now(&self, mode: DataMode) -> PriceSnapshot {
        let snapshot = self.current_prices(mode).await;
        self.publish(&snapshot);
        snapshot
    }

    fn publish(&self, snapshot: &PriceSnapshot) {
        // No receivers is fine.
        let _ = self.updates.send(snapshot.clone());
    }

    pub async fn status(&self) -> PriceFeedStatus {
        PriceFeedStatus {
            running: self.running.load(Ordering::Relaxed),
            subscriber_count: self.updates.receiver_count(),
            last_known_price: self.last_known_price().await,
            mock_base_price: self.mock.read().await.base(),
            oracle: self.oracle.as_ref().map(|o| o.label()),
            market_data: self.market.is_some(),
        }
    }

    /// Periodic updates. Each tick follows the board's data mode; live
    /// snapshots are also written into the board (demo prices belong to
    /// the board simulation).
    pub fn spawn_updates(
        self: Arc<Self>,
        board: SharedBoard,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.running.store(true, Ordering::Relaxed);
            info!(interval_secs = interval.as_secs(), "Price updates started");
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mode = board.read().await.mode;
                        let snapshot = self.refresh_now(mode).await;
                        if mode == DataMode::Live {
                            board.write().await.update_price_data(snapshot);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            self.running.store(false, Ordering::Relaxed);
            info!("Price updates stopped");
        })
    }
}
