// Data model for the snapshot & settlement engine
use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Micro-units per currency unit. All prices inside the engine are integer
/// micro-units; floats appear only in derived percentages and at the display
/// boundary.
pub const MICROS_PER_USD: u64 = 1_000_000;

/// One observed price point from the market-data API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample {
    pub asset_id: String,
    pub price_micros: u64,
    pub timestamp_ms: i64,
}

/// Per-asset prices captured at a contest boundary. May be partial: assets
/// with no sample in the lookup window are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp_ms: i64,
    pub prices: HashMap<String, u64>,
}

impl PriceSnapshot {
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            prices: HashMap::new(),
        }
    }

    pub fn price_of(&self, asset_id: &str) -> Option<u64> {
        self.prices.get(asset_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Contest lifecycle states. Transitions are monotonic; the engine only ever
/// attempts forward transitions and the backend is the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContestStatus {
    Pending,
    Active,
    Ended,
    Settled,
}

impl ContestStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" | "Pending" => Some(Self::Pending),
            "ACTIVE" | "Active" => Some(Self::Active),
            "ENDED" | "Ended" => Some(Self::Ended),
            "SETTLED" | "Settled" => Some(Self::Settled),
            _ => None,
        }
    }
}

/// Read-through view of a contest owned by the external backend. Possibly
/// stale; never mutated locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    pub status: ContestStatus,
    pub participant_count: u32,
    pub max_participants: u32,
    pub asset_universe: Vec<String>,
    pub start_time_ms: Option<i64>,
    pub end_time_ms: Option<i64>,
    pub start_snapshot: Option<PriceSnapshot>,
    pub end_snapshot: Option<PriceSnapshot>,
}

impl Contest {
    pub fn is_full(&self) -> bool {
        self.participant_count >= self.max_participants
    }
}

/// A price-range prediction submitted by a player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub player: String,
    pub min_price_micros: u64,
    pub max_price_micros: u64,
    /// 0..=100
    pub confidence: u8,
    pub ai_assisted: bool,
    pub submitted_at_ms: i64,
}

impl Prediction {
    /// Range sanity check, applied before any network call.
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_range(self.min_price_micros, self.max_price_micros)
    }
}

pub fn validate_range(min_price_micros: u64, max_price_micros: u64) -> Result<(), EngineError> {
    if min_price_micros == 0 || max_price_micros == 0 || max_price_micros <= min_price_micros {
        return Err(EngineError::InvalidRange {
            min_price_micros,
            max_price_micros,
        });
    }
    Ok(())
}

/// Per-asset price change between two snapshots. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnResult {
    pub asset_id: String,
    pub start_price_micros: u64,
    pub end_price_micros: u64,
    pub percent_change: f64,
}

/// Ranking input: one participant's holdings and submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub account: String,
    pub holdings: Vec<String>,
    pub submitted_at_ms: i64,
}

/// One row of the settlement leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRank {
    pub participant: String,
    pub aggregate_return: f64,
    pub rank: u32,
}

/// Settlement outcome of a single range prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub player: String,
    pub in_range: bool,
    pub multiplier: Option<f64>,
    pub reward_micros: Option<u64>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a decimal price string from the market-data API into micro-units.
/// Returns None for malformed, non-positive, or non-finite values.
pub fn parse_usd_micros(s: &str) -> Option<u64> {
    let usd: f64 = s.trim().parse().ok()?;
    if !usd.is_finite() || usd <= 0.0 {
        return None;
    }
    Some((usd * MICROS_PER_USD as f64).round() as u64)
}

/// Display-boundary conversion. Engine-internal math never round-trips
/// through this.
pub fn micros_to_usd(price_micros: u64) -> f64 {
    price_micros as f64 / MICROS_PER_USD as f64
}

/// The contest backend timestamps in epoch microseconds; the engine uses
/// epoch milliseconds. These two are the only crossing points.
pub fn ms_to_micros(timestamp_ms: i64) -> i64 {
    timestamp_ms * 1_000
}

pub fn micros_to_ms(timestamp_micros: i64) -> i64 {
    timestamp_micros / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usd_micros() {
        assert_eq!(parse_usd_micros("84714.00"), Some(84_714_000_000));
        assert_eq!(parse_usd_micros("0.000012"), Some(12));
        assert_eq!(parse_usd_micros("2739.21"), Some(2_739_210_000));
        assert_eq!(parse_usd_micros("0"), None);
        assert_eq!(parse_usd_micros("-5"), None);
        assert_eq!(parse_usd_micros("not-a-price"), None);
    }

    #[test]
    fn test_timestamp_unit_conversions() {
        let ms = 1_700_000_000_123i64;
        assert_eq!(ms_to_micros(ms), 1_700_000_000_123_000);
        assert_eq!(micros_to_ms(ms_to_micros(ms)), ms);
    }

    #[test]
    fn test_status_parse_and_ordering() {
        assert_eq!(ContestStatus::parse("PENDING"), Some(ContestStatus::Pending));
        assert_eq!(ContestStatus::parse("Active"), Some(ContestStatus::Active));
        assert_eq!(ContestStatus::parse("bogus"), None);
        assert!(ContestStatus::Pending < ContestStatus::Active);
        assert!(ContestStatus::Active < ContestStatus::Ended);
        assert!(ContestStatus::Ended < ContestStatus::Settled);
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(1_000_000, 2_000_000).is_ok());
        assert!(validate_range(2_000_000, 1_000_000).is_err());
        assert!(validate_range(1_000_000, 1_000_000).is_err());
        assert!(validate_range(0, 1_000_000).is_err());
    }
}
