// Matches a target time + asset set to a price snapshot
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use log::warn;
use tokio::time::sleep;

use crate::error::EngineError;
use crate::models::{now_ms, PriceSample, PriceSnapshot};
use crate::oracle::{PriceOracle, HISTORICAL_FETCH_DELAY_MS};

/// Matcher tuning knobs.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Targets closer to now than this are served from current prices.
    pub freshness_threshold_ms: i64,
    /// Historical lookup window on each side of the target.
    pub lookback_window_ms: i64,
    /// Concurrent historical fetches for independent assets.
    pub fetch_concurrency: usize,
    /// Delay applied within each fetch slot to respect oracle rate limits.
    pub inter_request_delay_ms: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            freshness_threshold_ms: 60_000,
            lookback_window_ms: 300_000,
            fetch_concurrency: 4,
            inter_request_delay_ms: HISTORICAL_FETCH_DELAY_MS,
        }
    }
}

pub struct SnapshotMatcher {
    oracle: Arc<dyn PriceOracle>,
    config: MatcherConfig,
}

impl SnapshotMatcher {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self::with_config(oracle, MatcherConfig::default())
    }

    pub fn with_config(oracle: Arc<dyn PriceOracle>, config: MatcherConfig) -> Self {
        Self { oracle, config }
    }

    /// Best-estimate prices for `asset_ids` at `target_ms`. The returned
    /// snapshot carries the requested target time, not the matched sample
    /// times. Assets without a usable sample are omitted rather than failing
    /// the whole call.
    pub async fn snapshot_at(
        &self,
        target_ms: i64,
        asset_ids: &[String],
    ) -> Result<PriceSnapshot, EngineError> {
        if now_ms() - target_ms < self.config.freshness_threshold_ms {
            return self.snapshot_from_current(target_ms, asset_ids).await;
        }
        Ok(self.snapshot_from_history(target_ms, asset_ids).await)
    }

    /// Recent targets: a single batched current-price call. Skipping the
    /// historical lookup also avoids a lookback that may not yet have indexed
    /// the most recent minute.
    async fn snapshot_from_current(
        &self,
        target_ms: i64,
        asset_ids: &[String],
    ) -> Result<PriceSnapshot, EngineError> {
        let samples = self.oracle.fetch_current(asset_ids).await?;

        let mut snapshot = PriceSnapshot::new(target_ms);
        for sample in samples {
            snapshot.prices.insert(sample.asset_id, sample.price_micros);
        }

        for asset_id in asset_ids {
            if !snapshot.prices.contains_key(asset_id) {
                warn!("No current price for {}; snapshot is partial", asset_id);
            }
        }

        Ok(snapshot)
    }

    async fn snapshot_from_history(&self, target_ms: i64, asset_ids: &[String]) -> PriceSnapshot {
        let window = self.config.lookback_window_ms;
        let delay = self.config.inter_request_delay_ms;

        let fetches = stream::iter(asset_ids.iter().cloned())
            .map(|asset_id| {
                let oracle = Arc::clone(&self.oracle);
                async move {
                    let result = oracle
                        .fetch_historical(&asset_id, target_ms - window, target_ms + window)
                        .await;
                    sleep(Duration::from_millis(delay)).await;
                    (asset_id, result)
                }
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1));

        let results: Vec<(String, Result<Vec<PriceSample>, EngineError>)> = fetches.collect().await;

        let mut snapshot = PriceSnapshot::new(target_ms);
        for (asset_id, result) in results {
            match result {
                Ok(samples) => match closest_sample(&samples, target_ms) {
                    Some(sample) => {
                        snapshot.prices.insert(asset_id, sample.price_micros);
                    }
                    None => {
                        let missing = EngineError::OracleDataMissing {
                            asset_id,
                            window_ms: window,
                        };
                        warn!("{}; snapshot is partial", missing);
                    }
                },
                // Per-asset failure must not abort sibling fetches.
                Err(e) => warn!("Historical fetch for {} failed: {}", asset_id, e),
            }
        }

        snapshot
    }
}

/// Sample minimising |t - target|. Ties prefer the earlier sample, so the
/// choice is deterministic regardless of the oracle's ordering.
fn closest_sample(samples: &[PriceSample], target_ms: i64) -> Option<&PriceSample> {
    let mut best: Option<&PriceSample> = None;
    for sample in samples {
        let diff = (sample.timestamp_ms - target_ms).abs();
        let better = match best {
            None => true,
            Some(current) => {
                let current_diff = (current.timestamp_ms - target_ms).abs();
                diff < current_diff
                    || (diff == current_diff && sample.timestamp_ms < current.timestamp_ms)
            }
        };
        if better {
            best = Some(sample);
        }
    }
    best
}
