// Best-effort lifecycle triggers: auto-start when full, auto-settle at the boundary
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use rand::Rng;
use tokio::time::sleep;

use crate::backend::{ContestBackend, TransitionOutcome};
use crate::error::EngineError;
use crate::models::{now_ms, Contest, ContestStatus};
use crate::snapshot::SnapshotMatcher;

/// Bounded retry with exponential backoff for transient failures. Scoped per
/// trigger invocation; nothing is carried across invocations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

/// Bounded poll-with-increasing-backoff against the authoritative contest
/// query, replacing blind fixed sleeps while waiting for state propagation.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 200,
            max_interval_ms: 2_000,
            max_wait_ms: 10_000,
        }
    }
}

/// What a trigger invocation observed. Triggers are advisory; none of these
/// outcomes is surfaced to the user action that fired the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    Settled,
    AlreadyDone,
    NotReady,
}

pub struct LifecycleOrchestrator {
    backend: Arc<dyn ContestBackend>,
    matcher: SnapshotMatcher,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl LifecycleOrchestrator {
    pub fn new(backend: Arc<dyn ContestBackend>, matcher: SnapshotMatcher) -> Self {
        Self::with_policies(backend, matcher, RetryPolicy::default(), PollPolicy::default())
    }

    pub fn with_policies(
        backend: Arc<dyn ContestBackend>,
        matcher: SnapshotMatcher,
        retry: RetryPolicy,
        poll: PollPolicy,
    ) -> Self {
        Self {
            backend,
            matcher,
            retry,
            poll,
        }
    }

    /// Fire-and-forget auto-start check, called after a successful portfolio
    /// submission. Failures are logged, never surfaced to the submitter.
    pub fn spawn_auto_start_check(self: &Arc<Self>, contest_id: String) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.auto_start_check(&contest_id).await {
                Ok(outcome) => info!("Auto-start check for {}: {:?}", contest_id, outcome),
                Err(e) => error!("Auto-start check for {} failed: {}", contest_id, e),
            }
        });
    }

    /// Fire-and-forget auto-settle check, invoked at or after the contest's
    /// scheduled end time.
    pub fn spawn_auto_settle_check(self: &Arc<Self>, contest_id: String) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match orchestrator.auto_settle_check(&contest_id).await {
                Ok(outcome) => info!("Auto-settle check for {}: {:?}", contest_id, outcome),
                Err(e) => error!("Auto-settle check for {} failed: {}", contest_id, e),
            }
        });
    }

    /// Start the contest if the backend confirms it is full and still
    /// pending. Two concurrent invocations may both attempt the start
    /// mutation; the backend rejecting the second is the correctness
    /// mechanism, and that rejection is reported as `AlreadyDone`.
    pub async fn auto_start_check(&self, contest_id: &str) -> Result<TriggerOutcome, EngineError> {
        let contest = self
            .poll_contest(contest_id, |c| {
                c.status != ContestStatus::Pending || c.is_full()
            })
            .await?;

        if contest.status != ContestStatus::Pending {
            info!(
                "Contest {} is {:?}, nothing to start",
                contest_id, contest.status
            );
            return Ok(TriggerOutcome::AlreadyDone);
        }
        if !contest.is_full() {
            info!(
                "Contest {} has {}/{} participants, not starting",
                contest_id, contest.participant_count, contest.max_participants
            );
            return Ok(TriggerOutcome::NotReady);
        }

        let snapshot = self
            .with_retry("startSnapshot", || {
                self.matcher.snapshot_at(now_ms(), &contest.asset_universe)
            })
            .await?;
        if snapshot.prices.len() < contest.asset_universe.len() {
            warn!(
                "Start snapshot for {} is partial: {}/{} assets",
                contest_id,
                snapshot.prices.len(),
                contest.asset_universe.len()
            );
        }

        match self
            .with_retry("startContest", || {
                self.backend.start_contest(contest_id, &snapshot)
            })
            .await
        {
            Ok(TransitionOutcome::Applied) => {
                info!("Started contest {}", contest_id);
                Ok(TriggerOutcome::Started)
            }
            Ok(TransitionOutcome::AlreadyDone) => Ok(TriggerOutcome::AlreadyDone),
            // Explicit rejection is a benign no-op for lifecycle triggers
            Err(EngineError::BackendRejected { reason, .. }) => {
                info!("Start of {} rejected by backend: {}", contest_id, reason);
                Ok(TriggerOutcome::NotReady)
            }
            Err(e) => Err(e),
        }
    }

    /// End the contest if it is active and its scheduled end time has
    /// passed. The end snapshot is taken at the scheduled end, clamped to be
    /// strictly later than the recorded start snapshot.
    pub async fn auto_settle_check(&self, contest_id: &str) -> Result<TriggerOutcome, EngineError> {
        let contest = self
            .with_retry("contestQuery", || self.backend.contest(contest_id))
            .await?;

        match contest.status {
            ContestStatus::Ended | ContestStatus::Settled => {
                info!(
                    "Contest {} is {:?}, nothing to settle",
                    contest_id, contest.status
                );
                Ok(TriggerOutcome::AlreadyDone)
            }
            ContestStatus::Pending => Ok(TriggerOutcome::NotReady),
            ContestStatus::Active => {
                let scheduled_end = contest.end_time_ms.unwrap_or_else(now_ms);
                if now_ms() < scheduled_end {
                    return Ok(TriggerOutcome::NotReady);
                }

                let mut target_ms = scheduled_end;
                if let Some(start) = &contest.start_snapshot {
                    // An end snapshot must be strictly later than its start
                    if target_ms <= start.timestamp_ms {
                        target_ms = start.timestamp_ms + 1;
                    }
                }

                let snapshot = self
                    .with_retry("endSnapshot", || {
                        self.matcher.snapshot_at(target_ms, &contest.asset_universe)
                    })
                    .await?;

                match self
                    .with_retry("endContest", || {
                        self.backend.end_contest(contest_id, &snapshot)
                    })
                    .await
                {
                    Ok(TransitionOutcome::Applied) => {
                        info!("Ended contest {}", contest_id);
                        Ok(TriggerOutcome::Settled)
                    }
                    Ok(TransitionOutcome::AlreadyDone) => Ok(TriggerOutcome::AlreadyDone),
                    Err(EngineError::BackendRejected { reason, .. }) => {
                        info!("End of {} rejected by backend: {}", contest_id, reason);
                        Ok(TriggerOutcome::NotReady)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Poll the authoritative contest query until `ready` holds or the poll
    /// budget runs out; the latest view is returned either way.
    async fn poll_contest(
        &self,
        contest_id: &str,
        ready: impl Fn(&Contest) -> bool,
    ) -> Result<Contest, EngineError> {
        let deadline = now_ms() + self.poll.max_wait_ms as i64;
        let mut interval_ms = self.poll.initial_interval_ms;

        loop {
            let contest = self
                .with_retry("contestQuery", || self.backend.contest(contest_id))
                .await?;

            if ready(&contest) || now_ms() + interval_ms as i64 > deadline {
                return Ok(contest);
            }

            sleep(Duration::from_millis(interval_ms)).await;
            interval_ms = (interval_ms * 2).min(self.poll.max_interval_ms);
        }
    }

    /// Retry transient failures with exponential backoff and jitter. Data
    /// errors and explicit rejections pass straight through.
    async fn with_retry<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut backoff_ms = self.retry.initial_backoff_ms;
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 4 + 1);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {}ms",
                        op, attempt, self.retry.max_attempts, e, backoff_ms
                    );
                    sleep(Duration::from_millis(backoff_ms + jitter)).await;
                    backoff_ms = (backoff_ms * 2).min(self.retry.max_backoff_ms);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
