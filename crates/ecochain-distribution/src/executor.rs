use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use ecochain_types::{
    BackoffConfig, DistributionPlan, DistributionRecord, DistributionStatus, PlanId, RecordKey,
    RetryPolicy,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ExecutorError, ExecutorResult, LedgerError};
use crate::ledger::{Ledger, LedgerTxStatus};
use crate::store::RecordStore;

/// Executor tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Transfer attempts per record, with backoff between them
    #[serde(default = "default_retry")]
    pub retry: RetryPolicy,

    /// Timeout for a single ledger call (milliseconds)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Concurrent ledger calls while running a plan
    #[serde(default = "default_confirmation_workers")]
    pub confirmation_workers: usize,

    /// Pause between confirmation rounds (milliseconds)
    #[serde(default = "default_confirmation_interval_ms")]
    pub confirmation_interval_ms: u64,

    /// Confirmation rounds before `run_plan` returns with records still
    /// Submitted
    #[serde(default = "default_max_confirmation_rounds")]
    pub max_confirmation_rounds: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: default_retry(),
            call_timeout_ms: default_call_timeout_ms(),
            confirmation_workers: default_confirmation_workers(),
            confirmation_interval_ms: default_confirmation_interval_ms(),
            max_confirmation_rounds: default_max_confirmation_rounds(),
        }
    }
}

fn default_retry() -> RetryPolicy {
    RetryPolicy::new(5, BackoffConfig::default())
}

fn default_call_timeout_ms() -> u64 {
    5_000
}

fn default_confirmation_workers() -> usize {
    8
}

fn default_confirmation_interval_ms() -> u64 {
    1_000
}

fn default_max_confirmation_rounds() -> u32 {
    30
}

/// State of a plan after a `run_plan` pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan_id: PlanId,
    pub records: Vec<DistributionRecord>,
    /// Every record is Confirmed or Failed.
    pub complete: bool,
}

impl PlanOutcome {
    fn from_records(plan_id: PlanId, records: Vec<DistributionRecord>) -> Self {
        let complete = records.iter().all(|r| r.status.is_terminal());
        Self {
            plan_id,
            records,
            complete,
        }
    }

    pub fn count(&self, status: DistributionStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }
}

/// Drives distribution records through the ledger.
///
/// The record store is the source of truth: every step reloads the record
/// under its key lock, so a stale copy held by the caller can never trigger
/// a second transfer.
pub struct DistributionExecutor {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn RecordStore>,
    config: ExecutorConfig,
    locks: DashMap<RecordKey, Arc<Mutex<()>>>,
    cancelled: DashSet<PlanId>,
}

impl DistributionExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn RecordStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            config,
            locks: DashMap::new(),
            cancelled: DashSet::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn lock_for(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.call_timeout_ms.max(1))
    }

    async fn load(&self, key: &RecordKey) -> ExecutorResult<DistributionRecord> {
        self.store
            .get(key)
            .await?
            .ok_or_else(|| ExecutorError::RecordNotFound(key.clone()))
    }

    /// One record per positive allocation, starting Pending.
    ///
    /// Records that already exist are returned as stored, so submitting a
    /// plan again never resets progress.
    pub async fn submit(
        &self,
        plan: &DistributionPlan,
    ) -> ExecutorResult<Vec<DistributionRecord>> {
        let mut records = Vec::with_capacity(plan.allocations.len());
        for (operation_id, amount) in &plan.allocations {
            let fresh =
                DistributionRecord::pending(plan.plan_id.clone(), operation_id.clone(), *amount);
            let stored = self.store.insert_if_absent(fresh).await?;
            if stored.status != DistributionStatus::Pending || stored.attempts > 0 {
                debug!(
                    record = %stored.key(),
                    status = %stored.status,
                    "Record already in progress"
                );
            }
            records.push(stored);
        }
        Ok(records)
    }

    /// Stop submitting further Pending records of `plan_id`.
    ///
    /// Submitted records are still confirmed; funds may already be moving.
    pub fn cancel(&self, plan_id: &PlanId) {
        if self.cancelled.insert(plan_id.clone()) {
            info!(plan_id = %plan_id, "Plan cancelled");
        }
    }

    pub fn is_cancelled(&self, plan_id: &PlanId) -> bool {
        self.cancelled.contains(plan_id)
    }

    /// Push a Pending record through `transfer`.
    ///
    /// Anything not Pending in the store is returned untouched; this is the
    /// duplicate-submission guard. Each attempt is persisted before the
    /// ledger is called, so a Pending record whose last attempt was never
    /// answered is failed for reconciliation instead of being paid again.
    /// Transient ledger errors are retried within the budget, a rejection
    /// fails the record immediately.
    #[instrument(skip(self, record), fields(key = %record.key()))]
    pub async fn advance(&self, record: &DistributionRecord) -> ExecutorResult<DistributionRecord> {
        let key = record.key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut current = self.load(&key).await?;
        if current.status != DistributionStatus::Pending {
            debug!(status = %current.status, "Not pending, skipping transfer");
            self.release_if_terminal(&current);
            return Ok(current);
        }
        if current.transfer_in_flight {
            error!(
                attempts = current.attempts,
                "Unacknowledged transfer attempt, failing record for reconciliation"
            );
            current.mark_failed(format!(
                "transfer attempt {} was never acknowledged; reconcile with the ledger",
                current.attempts
            ))?;
            self.persist(&current).await?;
            self.release_if_terminal(&current);
            return Ok(current);
        }
        if self.is_cancelled(&current.plan_id) {
            debug!("Plan cancelled, leaving record pending");
            return Ok(current);
        }

        let policy = &self.config.retry;
        let timeout = self.call_timeout();
        loop {
            current.begin_attempt();
            self.store.put(current.clone()).await?;

            let result = match tokio::time::timeout(
                timeout,
                self.ledger.transfer(&current.operation_id, current.amount),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(tx) => {
                    info!(attempts = current.attempts, tx = %tx, "Transfer submitted");
                    current.mark_submitted(tx)?;
                    break;
                }
                Err(err) if err.is_transient() && policy.allows_retry(current.attempts) => {
                    let delay = policy.backoff.delay_for_attempt(current.attempts);
                    warn!(
                        attempt = current.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient ledger failure, retrying"
                    );
                    current.attempt_refused(err.to_string());
                    self.persist(&current).await?;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(attempts = current.attempts, error = %err, "Transfer failed");
                    current.mark_failed(err.to_string())?;
                    break;
                }
            }
        }

        self.persist(&current).await?;
        self.release_if_terminal(&current);
        Ok(current)
    }

    /// Write a record that reflects a ledger answer, retrying store errors
    /// within the retry budget while the key lock is held.
    async fn persist(&self, record: &DistributionRecord) -> ExecutorResult<()> {
        let policy = &self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.put(record.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if policy.allows_retry(attempt) => {
                    let delay = policy.backoff.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Record write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        attempts = attempt,
                        error = %err,
                        status = %record.status,
                        "Record write failed"
                    );
                    return Err(err.into());
                }
            }
        }
    }

    /// Drop the key lock of a record that can no longer change.
    fn release_if_terminal(&self, record: &DistributionRecord) {
        if record.status.is_terminal() {
            self.locks.remove(&record.key());
        }
    }

    /// Poll the ledger once for a Submitted record.
    ///
    /// Ledger errors leave the record Submitted for a later poll.
    #[instrument(skip(self, record), fields(key = %record.key()))]
    pub async fn confirm(&self, record: &DistributionRecord) -> ExecutorResult<DistributionRecord> {
        let key = record.key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut current = self.load(&key).await?;
        let tx = match (&current.status, &current.tx_handle) {
            (DistributionStatus::Submitted, Some(tx)) => tx.clone(),
            _ => {
                self.release_if_terminal(&current);
                return Ok(current);
            }
        };

        let timeout = self.call_timeout();
        let status = match tokio::time::timeout(timeout, self.ledger.get_status(&tx)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
        };

        match status {
            Ok(LedgerTxStatus::Confirmed) => {
                info!(tx = %tx, "Transfer confirmed");
                current.mark_confirmed()?;
            }
            Ok(LedgerTxStatus::Failed) => {
                warn!(tx = %tx, "Ledger reported transfer failure");
                current.mark_failed(format!("ledger reported {tx} failed"))?;
            }
            Ok(LedgerTxStatus::Pending) => return Ok(current),
            Err(err) => {
                warn!(tx = %tx, error = %err, "Status poll failed");
                current.note_error(err.to_string());
            }
        }

        self.persist(&current).await?;
        self.release_if_terminal(&current);
        Ok(current)
    }

    /// Submit, advance and confirm a whole plan.
    ///
    /// Records are independent: one failing never blocks the others, and a
    /// store error on one record is logged while its siblings finish. Returns
    /// once every record is terminal or the confirmation rounds run out;
    /// calling it again resumes from the stored records.
    #[instrument(skip(self, plan), fields(plan_id = %plan.plan_id))]
    pub async fn run_plan(&self, plan: &DistributionPlan) -> ExecutorResult<PlanOutcome> {
        let workers = self.config.confirmation_workers.max(1);
        let records = self.submit(plan).await?;

        let pending: Vec<DistributionRecord> = records
            .into_iter()
            .filter(|r| r.status == DistributionStatus::Pending)
            .collect();
        let advanced: Vec<ExecutorResult<DistributionRecord>> = stream::iter(pending)
            .map(|record| async move { self.advance(&record).await })
            .buffer_unordered(workers)
            .collect()
            .await;
        log_step_errors("advance", advanced);

        let interval = Duration::from_millis(self.config.confirmation_interval_ms);
        for round in 0..self.config.max_confirmation_rounds {
            let submitted: Vec<DistributionRecord> = self
                .store
                .list_for_plan(&plan.plan_id)
                .await?
                .into_iter()
                .filter(|r| r.status == DistributionStatus::Submitted)
                .collect();
            if submitted.is_empty() {
                break;
            }
            if round > 0 {
                tokio::time::sleep(interval).await;
            }
            debug!(round, submitted = submitted.len(), "Confirmation round");
            let confirmed: Vec<ExecutorResult<DistributionRecord>> = stream::iter(submitted)
                .map(|record| async move { self.confirm(&record).await })
                .buffer_unordered(workers)
                .collect()
                .await;
            log_step_errors("confirm", confirmed);
        }

        let outcome = PlanOutcome::from_records(
            plan.plan_id.clone(),
            self.store.list_for_plan(&plan.plan_id).await?,
        );
        info!(
            complete = outcome.complete,
            confirmed = outcome.count(DistributionStatus::Confirmed),
            failed = outcome.count(DistributionStatus::Failed),
            "Plan run finished"
        );
        Ok(outcome)
    }

    /// Whether another `run_plan` pass can still move this outcome forward.
    ///
    /// Submitted records always need polling; Pending records only while the
    /// plan is not cancelled.
    pub fn needs_resume(&self, outcome: &PlanOutcome) -> bool {
        outcome.count(DistributionStatus::Submitted) > 0
            || (outcome.count(DistributionStatus::Pending) > 0
                && !self.is_cancelled(&outcome.plan_id))
    }

    /// Current records of one plan.
    pub async fn outcome(&self, plan_id: &PlanId) -> ExecutorResult<PlanOutcome> {
        let records = self.store.list_for_plan(plan_id).await?;
        Ok(PlanOutcome::from_records(plan_id.clone(), records))
    }

    pub async fn all_records(&self) -> ExecutorResult<Vec<DistributionRecord>> {
        Ok(self.store.list_all().await?)
    }

    /// Live per-record locks.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

fn log_step_errors(step: &'static str, results: Vec<ExecutorResult<DistributionRecord>>) {
    for err in results.into_iter().filter_map(Result::err) {
        error!(step, error = %err, "Distribution step failed, record left for the next run");
    }
}
