use thiserror::Error;

/// Engine error taxonomy. Transient infrastructure failures are retried with
/// backoff; data-correctness errors are surfaced immediately.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("no price sample for {asset_id} within {window_ms}ms of target")]
    OracleDataMissing { asset_id: String, window_ms: i64 },

    #[error("contest backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend rejected {action}: {reason}")]
    BackendRejected { action: String, reason: String },

    #[error("invalid price range: min={min_price_micros} max={max_price_micros}")]
    InvalidRange {
        min_price_micros: u64,
        max_price_micros: u64,
    },
}

impl EngineError {
    /// Whether the retry helper may re-attempt the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::OracleUnavailable(_) | EngineError::BackendUnavailable(_)
        )
    }
}
