// Market-data API client for current and historical prices
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::error::EngineError;
use crate::models::{now_ms, parse_usd_micros, PriceSample};

const COINCAP_API_BASE: &str = "https://rest.coincap.io/v3";

/// Delay callers must insert between sequential historical requests. The
/// oracle has no multi-asset historical endpoint, so multi-asset lookups are
/// one request per asset and rate limits apply.
pub const HISTORICAL_FETCH_DELAY_MS: u64 = 100;

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Batched current prices. One request for the whole id list.
    async fn fetch_current(&self, asset_ids: &[String]) -> Result<Vec<PriceSample>, EngineError>;

    /// Minute-granularity price series for one asset, ascending by time.
    async fn fetch_historical(
        &self,
        asset_id: &str,
        window_start_ms: i64,
        window_end_ms: i64,
    ) -> Result<Vec<PriceSample>, EngineError>;
}

/// CoinCap REST client. Constructed explicitly with its endpoint and
/// credentials so tests can substitute deterministic feeds.
pub struct CoinCapClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinCapClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(COINCAP_API_BASE, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[derive(Debug, Deserialize)]
struct AssetsResponse {
    data: Vec<AssetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetEntry {
    id: String,
    price_usd: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    data: Vec<HistoryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryPoint {
    time: i64,
    price_usd: String,
}

#[async_trait]
impl PriceOracle for CoinCapClient {
    async fn fetch_current(&self, asset_ids: &[String]) -> Result<Vec<PriceSample>, EngineError> {
        let url = format!("{}/assets?slugs={}", self.base_url, asset_ids.join(","));

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::OracleUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::OracleUnavailable(format!(
                "assets request returned {}",
                response.status()
            )));
        }

        let body: AssetsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::OracleUnavailable(format!("malformed assets body: {}", e)))?;

        let observed_at = now_ms();
        let samples = body
            .data
            .into_iter()
            .filter_map(|asset| {
                let price_micros = parse_usd_micros(&asset.price_usd)?;
                Some(PriceSample {
                    asset_id: asset.id,
                    price_micros,
                    timestamp_ms: observed_at,
                })
            })
            .collect();

        Ok(samples)
    }

    async fn fetch_historical(
        &self,
        asset_id: &str,
        window_start_ms: i64,
        window_end_ms: i64,
    ) -> Result<Vec<PriceSample>, EngineError> {
        let url = format!(
            "{}/assets/{}/history?interval=m1&start={}&end={}",
            self.base_url, asset_id, window_start_ms, window_end_ms
        );

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::OracleUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::OracleUnavailable(format!(
                "history request for {} returned {}",
                asset_id,
                response.status()
            )));
        }

        let body: HistoryResponse = response
            .json()
            .await
            .map_err(|e| EngineError::OracleUnavailable(format!("malformed history body: {}", e)))?;

        debug!(
            "Fetched {} historical samples for {} in [{}, {}]",
            body.data.len(),
            asset_id,
            window_start_ms,
            window_end_ms
        );

        let samples = body
            .data
            .into_iter()
            .filter_map(|point| {
                let price_micros = parse_usd_micros(&point.price_usd)?;
                Some(PriceSample {
                    asset_id: asset_id.to_string(),
                    price_micros,
                    timestamp_ms: point.time,
                })
            })
            .collect();

        Ok(samples)
    }
}
