// GraphQL RPC client for the contest backend
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::EngineError;
use crate::models::{micros_to_ms, ms_to_micros, Contest, ContestStatus, Prediction, PriceSnapshot};

/// Result of a lifecycle mutation. The backend owns the state machine; a
/// repeated transition comes back as `AlreadyDone`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyDone,
}

#[async_trait]
pub trait ContestBackend: Send + Sync {
    async fn contest(&self, contest_id: &str) -> Result<Contest, EngineError>;

    async fn start_contest(
        &self,
        contest_id: &str,
        snapshot: &PriceSnapshot,
    ) -> Result<TransitionOutcome, EngineError>;

    async fn end_contest(
        &self,
        contest_id: &str,
        snapshot: &PriceSnapshot,
    ) -> Result<TransitionOutcome, EngineError>;

    async fn submit_prediction(
        &self,
        contest_id: &str,
        prediction: &Prediction,
    ) -> Result<(), EngineError>;

    async fn settle_market(
        &self,
        contest_id: &str,
        final_price_micros: u64,
        players: &[String],
    ) -> Result<TransitionOutcome, EngineError>;
}

const CONTEST_QUERY: &str = r#"
query Contest($contestId: String!) {
  contest(contestId: $contestId) {
    id
    status
    participantCount
    maxParticipants
    assetUniverse
    startTimeMicros
    endTimeMicros
    startSnapshot { timestampMicros prices { assetId priceMicros } }
    endSnapshot { timestampMicros prices { assetId priceMicros } }
  }
}"#;

const START_CONTEST_MUTATION: &str = r#"
mutation StartContest($contestId: String!, $snapshot: PriceSnapshotInput!) {
  startContest(contestId: $contestId, snapshot: $snapshot)
}"#;

const END_CONTEST_MUTATION: &str = r#"
mutation EndContest($contestId: String!, $snapshot: PriceSnapshotInput!) {
  endContest(contestId: $contestId, snapshot: $snapshot)
}"#;

const SUBMIT_PREDICTION_MUTATION: &str = r#"
mutation SubmitPrediction($contestId: String!, $player: String!, $minPriceMicros: Int!, $maxPriceMicros: Int!, $confidence: Int!, $aiAssisted: Boolean!) {
  submitPrediction(contestId: $contestId, player: $player, minPriceMicros: $minPriceMicros, maxPriceMicros: $maxPriceMicros, confidence: $confidence, aiAssisted: $aiAssisted)
}"#;

const SETTLE_MARKET_MUTATION: &str = r#"
mutation SettleMarket($contestId: String!, $finalPriceMicros: Int!, $players: [String!]!) {
  settleMarket(contestId: $contestId, finalPriceMicros: $finalPriceMicros, players: $players)
}"#;

/// Contest backend reached over GraphQL/HTTP. Explicitly constructed with
/// its endpoint so tests can substitute a mock backend behind the trait.
pub struct GraphQlBackend {
    client: Client,
    endpoint: String,
}

impl GraphQlBackend {
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    async fn execute(
        &self,
        action: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, EngineError> {
        debug!("Executing {} against {}", action, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::BackendUnavailable(format!(
                "{} returned {}",
                action,
                response.status()
            )));
        }

        let envelope: GraphQlEnvelope = response
            .json()
            .await
            .map_err(|e| EngineError::BackendUnavailable(format!("malformed response: {}", e)))?;

        if let Some(errors) = envelope.errors {
            if let Some(first) = errors.first() {
                return Err(EngineError::BackendRejected {
                    action: action.to_string(),
                    reason: first.message.clone(),
                });
            }
        }

        envelope
            .data
            .ok_or_else(|| EngineError::BackendUnavailable("response without data".to_string()))
    }

    /// Lifecycle mutations: a recognised repeat of an applied transition is
    /// reported as `AlreadyDone` instead of an error.
    async fn transition(
        &self,
        action: &str,
        query: &str,
        variables: Value,
    ) -> Result<TransitionOutcome, EngineError> {
        match self.execute(action, query, variables).await {
            Ok(_) => Ok(TransitionOutcome::Applied),
            Err(EngineError::BackendRejected { ref reason, .. }) if is_already_done(reason) => {
                Ok(TransitionOutcome::AlreadyDone)
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContestDto {
    id: String,
    status: String,
    participant_count: u32,
    max_participants: u32,
    asset_universe: Vec<String>,
    start_time_micros: Option<i64>,
    end_time_micros: Option<i64>,
    start_snapshot: Option<SnapshotDto>,
    end_snapshot: Option<SnapshotDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDto {
    timestamp_micros: i64,
    prices: Vec<PriceEntryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceEntryDto {
    asset_id: String,
    price_micros: u64,
}

/// Backend timestamps are epoch microseconds; engine time is milliseconds.
fn snapshot_from_dto(dto: SnapshotDto) -> PriceSnapshot {
    let mut snapshot = PriceSnapshot::new(micros_to_ms(dto.timestamp_micros));
    for entry in dto.prices {
        snapshot.prices.insert(entry.asset_id, entry.price_micros);
    }
    snapshot
}

fn snapshot_to_variable(snapshot: &PriceSnapshot) -> Value {
    let mut prices: Vec<(&String, &u64)> = snapshot.prices.iter().collect();
    prices.sort_by(|a, b| a.0.cmp(b.0));

    json!({
        "timestampMicros": ms_to_micros(snapshot.timestamp_ms),
        "prices": prices
            .into_iter()
            .map(|(asset_id, price_micros)| json!({
                "assetId": asset_id,
                "priceMicros": price_micros,
            }))
            .collect::<Vec<Value>>(),
    })
}

fn parse_contest(data: Value) -> Result<Contest, EngineError> {
    let dto: ContestDto = serde_json::from_value(
        data.get("contest")
            .cloned()
            .ok_or_else(|| EngineError::BackendUnavailable("response without contest".to_string()))?,
    )
    .map_err(|e| EngineError::BackendUnavailable(format!("malformed contest: {}", e)))?;

    let status = ContestStatus::parse(&dto.status).ok_or_else(|| {
        EngineError::BackendUnavailable(format!("unknown contest status: {}", dto.status))
    })?;

    Ok(Contest {
        id: dto.id,
        status,
        participant_count: dto.participant_count,
        max_participants: dto.max_participants,
        asset_universe: dto.asset_universe,
        start_time_ms: dto.start_time_micros.map(micros_to_ms),
        end_time_ms: dto.end_time_micros.map(micros_to_ms),
        start_snapshot: dto.start_snapshot.map(snapshot_from_dto),
        end_snapshot: dto.end_snapshot.map(snapshot_from_dto),
    })
}

/// Whether a rejection message signals a transition that already happened.
fn is_already_done(reason: &str) -> bool {
    reason.to_lowercase().contains("already")
}

#[async_trait]
impl ContestBackend for GraphQlBackend {
    async fn contest(&self, contest_id: &str) -> Result<Contest, EngineError> {
        let data = self
            .execute(
                "contestQuery",
                CONTEST_QUERY,
                json!({ "contestId": contest_id }),
            )
            .await?;
        parse_contest(data)
    }

    async fn start_contest(
        &self,
        contest_id: &str,
        snapshot: &PriceSnapshot,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(
            "startContest",
            START_CONTEST_MUTATION,
            json!({
                "contestId": contest_id,
                "snapshot": snapshot_to_variable(snapshot),
            }),
        )
        .await
    }

    async fn end_contest(
        &self,
        contest_id: &str,
        snapshot: &PriceSnapshot,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(
            "endContest",
            END_CONTEST_MUTATION,
            json!({
                "contestId": contest_id,
                "snapshot": snapshot_to_variable(snapshot),
            }),
        )
        .await
    }

    async fn submit_prediction(
        &self,
        contest_id: &str,
        prediction: &Prediction,
    ) -> Result<(), EngineError> {
        // Rejected locally before any network call
        prediction.validate()?;

        self.execute(
            "submitPrediction",
            SUBMIT_PREDICTION_MUTATION,
            json!({
                "contestId": contest_id,
                "player": prediction.player,
                "minPriceMicros": prediction.min_price_micros,
                "maxPriceMicros": prediction.max_price_micros,
                "confidence": prediction.confidence,
                "aiAssisted": prediction.ai_assisted,
            }),
        )
        .await?;

        Ok(())
    }

    async fn settle_market(
        &self,
        contest_id: &str,
        final_price_micros: u64,
        players: &[String],
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(
            "settleMarket",
            SETTLE_MARKET_MUTATION,
            json!({
                "contestId": contest_id,
                "finalPriceMicros": final_price_micros,
                "players": players,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_already_done() {
        assert!(is_already_done("contest already active"));
        assert!(is_already_done("Already settled"));
        assert!(!is_already_done("contest not yet full"));
        assert!(!is_already_done("unknown contest"));
    }

    #[test]
    fn test_parse_contest() {
        let data = json!({
            "contest": {
                "id": "contest_1",
                "status": "Pending",
                "participantCount": 3,
                "maxParticipants": 4,
                "assetUniverse": ["bitcoin", "ethereum"],
                "startTimeMicros": 1_700_000_000_000_000i64,
                "endTimeMicros": 1_700_003_600_000_000i64,
                "startSnapshot": null,
                "endSnapshot": null,
            }
        });

        let contest = parse_contest(data).unwrap();
        assert_eq!(contest.id, "contest_1");
        assert_eq!(contest.status, ContestStatus::Pending);
        assert!(!contest.is_full());
        assert_eq!(contest.start_time_ms, Some(1_700_000_000_000));
        assert_eq!(contest.end_time_ms, Some(1_700_003_600_000));
    }

    #[test]
    fn test_parse_contest_with_snapshot() {
        let data = json!({
            "contest": {
                "id": "contest_2",
                "status": "Active",
                "participantCount": 4,
                "maxParticipants": 4,
                "assetUniverse": ["bitcoin"],
                "startTimeMicros": 1_700_000_000_000_000i64,
                "endTimeMicros": null,
                "startSnapshot": {
                    "timestampMicros": 1_700_000_000_000_000i64,
                    "prices": [{ "assetId": "bitcoin", "priceMicros": 84_714_000_000u64 }],
                },
                "endSnapshot": null,
            }
        });

        let contest = parse_contest(data).unwrap();
        let snapshot = contest.start_snapshot.unwrap();
        assert_eq!(snapshot.timestamp_ms, 1_700_000_000_000);
        assert_eq!(snapshot.price_of("bitcoin"), Some(84_714_000_000));
    }

    #[test]
    fn test_parse_contest_unknown_status() {
        let data = json!({
            "contest": {
                "id": "contest_3",
                "status": "Paused",
                "participantCount": 0,
                "maxParticipants": 4,
                "assetUniverse": [],
                "startTimeMicros": null,
                "endTimeMicros": null,
                "startSnapshot": null,
                "endSnapshot": null,
            }
        });
        assert!(parse_contest(data).is_err());
    }

    #[test]
    fn test_snapshot_variable_uses_microsecond_timestamps() {
        let mut snapshot = PriceSnapshot::new(1_700_000_000_123);
        snapshot.prices.insert("bitcoin".to_string(), 84_714_000_000);

        let variable = snapshot_to_variable(&snapshot);
        assert_eq!(
            variable["timestampMicros"].as_i64(),
            Some(1_700_000_000_123_000)
        );
        assert_eq!(variable["prices"][0]["assetId"].as_str(), Some("bitcoin"));
        assert_eq!(
            variable["prices"][0]["priceMicros"].as_u64(),
            Some(84_714_000_000)
        );
    }
}
