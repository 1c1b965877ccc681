//! CoinGecko market data for XLM.
//!
//! Endpoints: `/simple/price` (spot + 24 h change) and
//! `/coins/{id}/market_chart` (hourly history). No API key; the public
//! tier is rate limited, so the feed is only polled on the price interval.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::mock::round_to;
use super::{MarketFeed, SpotQuote};
use crate::board::PricePoint;

const COIN_ID: &str = "stellar";
const VS_CURRENCY: &str = "usd";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CoinQuote {
    usd: f64,
    #[serde(default)]
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

fn parse_spot(body: &str) -> Result<SpotQuote> {
    let quotes: HashMap<String, CoinQuote> =
        serde_json::from_str(body).context("Failed to parse CoinGecko price")?;
    let quote = quotes
        .get(COIN_ID)
        .with_context(|| format!("CoinGecko response has no '{COIN_ID}' entry"))?;
    Ok(SpotQuote {
        price: quote.usd,
        change_24h: quote.usd_24h_change.unwrap_or_default(),
    })
}

fn parse_history(body: &str) -> Result<Vec<PricePoint>> {
    let chart: MarketChart =
        serde_json::from_str(body).context("Failed to parse CoinGecko market chart")?;
    Ok(chart
        .prices
        .into_iter()
        .map(|(ts, price)| PricePoint {
            timestamp: ts as i64,
            price: round_to(price, 6),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoinGeckoFeed {
    http: Client,
    base_url: String,
}

impl CoinGeckoFeed {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("kale-missions/0.1.0")
            .build()
            .context("Failed to build CoinGecko HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .context("CoinGecko request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGecko API error: {status}");
        }
        resp.text().await.context("Failed to read CoinGecko response")
    }
}

#[async_trait]
impl MarketFeed for CoinGeckoFeed {
    async fn spot(&self) -> Result<SpotQuote> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true",
            self.base_url,
            urlencoding::encode(COIN_ID),
            VS_CURRENCY,
        );
        let body = self.get_text(&url, Duration::from_secs(10)).await?;
        let quote = parse_spot(&body)?;
        debug!(price = quote.price, change = quote.change_24h, "CoinGecko spot");
        Ok(quote)
    }

    async fn history(&self) -> Result<Vec<PricePoint>> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days=1&interval=hourly",
            self.base_url,
            urlencoding::encode(COIN_ID),
            VS_CURRENCY,
        );
        let body = self.get_text(&url, Duration::from_secs(15)).await?;
        parse_history(&body)
    }
}
