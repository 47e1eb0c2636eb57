// Market snapshot & settlement engine for crypto draft contests
pub mod backend;
pub mod error;
pub mod format;
pub mod models;
pub mod multiplier;
pub mod oracle;
pub mod orchestrator;
pub mod returns;
pub mod snapshot;

pub use backend::{ContestBackend, GraphQlBackend, TransitionOutcome};
pub use error::EngineError;
pub use models::{
    Contest, ContestStatus, Participant, Prediction, PredictionOutcome, PriceSample, PriceSnapshot,
    ReturnResult, SettlementRank,
};
pub use multiplier::{compute_multiplier, settle_predictions};
pub use oracle::{CoinCapClient, PriceOracle};
pub use orchestrator::{LifecycleOrchestrator, PollPolicy, RetryPolicy, TriggerOutcome};
pub use returns::{aggregate_return, compute_returns, rank};
pub use snapshot::{MatcherConfig, SnapshotMatcher};
