//! Epoch pipeline: Normalizer -> Scorer -> Proof Gateway -> Planner -> Executor.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use ecochain_attest::{AttestationSummary, ClaimSet, ProofGateway, Verifier};
use ecochain_distribution::{
    DistributionExecutor, DistributionPlanner, InMemoryRecordStore, Ledger, PlanError, PlanOutcome,
    PlanRegistry, RecordStore,
};
use ecochain_scoring::{
    IngestOutcome, RawReading, ReadingBuffer, SustainabilityScorer, TelemetryNormalizer,
    ValidationError,
};
use ecochain_types::{
    Attestation, DistributionPlan, DistributionRecord, DistributionStatus, Epoch, EpochClock,
    OperationId, OperationRecord, PlanId, ProofHandle, ScoreResult,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult, PipelineError, PipelineResult};

/// Concurrent verifier calls while closing an epoch.
const ATTESTATION_CONCURRENCY: usize = 8;

/// What closing one epoch produced.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: Epoch,
    pub scored: usize,
    pub qualifying: usize,
    /// Records the scorer refused, with the reason.
    pub score_failures: Vec<(OperationId, String)>,
    /// Qualifying operations left without a definitive attestation.
    pub verification_failures: Vec<(OperationId, String)>,
    /// `None` when the epoch was skipped for an empty pool.
    pub plan: Option<DistributionPlan>,
    pub outcome: Option<PlanOutcome>,
}

impl EpochReport {
    /// Closed with every distribution record terminal, or nothing to pay.
    pub fn is_settled(&self) -> bool {
        self.outcome.as_ref().map_or(true, |o| o.complete)
    }
}

/// Counts from [`EcoPipeline::ingest_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    /// Valid readings for an epoch that was already closed.
    pub late: usize,
    pub rejected: usize,
}

/// The assembled scoring and reward pipeline.
pub struct EcoPipeline {
    clock: EpochClock,
    buffer: Mutex<ReadingBuffer>,
    scorer: SustainabilityScorer,
    gateway: ProofGateway,
    planner: DistributionPlanner,
    registry: PlanRegistry,
    executor: DistributionExecutor,
    pool_per_epoch: i64,
    /// Score book keyed by (operation, epoch).
    scores: DashMap<(OperationId, Epoch), ScoreResult>,
    /// Capacity weights in milli-TH of records not yet planned.
    capacities: DashMap<(OperationId, Epoch), u64>,
    /// Latest report per closed epoch.
    reports: DashMap<Epoch, EpochReport>,
    closing: Mutex<()>,
}

impl EcoPipeline {
    pub fn new(
        config: &DaemonConfig,
        verifier: Arc<dyn Verifier>,
        ledger: Arc<dyn Ledger>,
    ) -> DaemonResult<Self> {
        Self::with_store(config, verifier, ledger, Arc::new(InMemoryRecordStore::new()))
    }

    pub fn with_store(
        config: &DaemonConfig,
        verifier: Arc<dyn Verifier>,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn RecordStore>,
    ) -> DaemonResult<Self> {
        config
            .scoring
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;

        let clock = config.epoch.clock();
        Ok(Self {
            clock,
            buffer: Mutex::new(ReadingBuffer::new(TelemetryNormalizer::new(clock))),
            scorer: SustainabilityScorer::new(config.scoring.clone()),
            gateway: ProofGateway::new(verifier, config.attestation.clone(), clock),
            planner: DistributionPlanner::new(config.distribution.planner()),
            registry: PlanRegistry::new(),
            executor: DistributionExecutor::new(ledger, store, config.distribution.executor()),
            pool_per_epoch: config.distribution.pool_per_epoch,
            scores: DashMap::new(),
            capacities: DashMap::new(),
            reports: DashMap::new(),
            closing: Mutex::new(()),
        })
    }

    pub fn clock(&self) -> EpochClock {
        self.clock
    }

    pub async fn ingest(&self, raw: &RawReading) -> Result<IngestOutcome, ValidationError> {
        self.buffer.lock().await.ingest(raw)
    }

    /// Ingest many readings; invalid and late ones are logged and counted.
    pub async fn ingest_all(&self, readings: &[RawReading]) -> IngestSummary {
        let mut buffer = self.buffer.lock().await;
        let mut summary = IngestSummary::default();
        for raw in readings {
            match buffer.ingest(raw) {
                Ok(IngestOutcome::Late { .. }) => summary.late += 1,
                Ok(_) => summary.accepted += 1,
                Err(e) => {
                    warn!(operation_id = %raw.operation_id, error = %e, "Rejected reading");
                    summary.rejected += 1;
                }
            }
        }
        summary
    }

    pub async fn buffered_epochs(&self) -> Vec<Epoch> {
        self.buffer.lock().await.epochs()
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Score, attest, plan and execute everything buffered for `epoch`.
    ///
    /// The epoch stops accepting readings once closed. Closing it again
    /// retries outstanding attestations and resumes the registered plan.
    #[instrument(skip(self), fields(epoch = epoch.0))]
    pub async fn close_epoch(&self, epoch: Epoch) -> PipelineResult<EpochReport> {
        let _closing = self.closing.lock().await;

        let records = self.buffer.lock().await.take_epoch(epoch);
        let batch = self.scorer.score_all(&records);
        self.record_capacities(&records);
        let score_failures: Vec<(OperationId, String)> = batch
            .failed
            .iter()
            .map(|(id, err)| {
                warn!(operation_id = %id, error = %err, "Scoring failed");
                (id.clone(), err.to_string())
            })
            .collect();
        for score in batch.scored {
            self.scores
                .insert((score.operation_id.clone(), score.epoch), score);
        }

        let epoch_scores = self.scores(Some(epoch));
        let qualifying: Vec<ScoreResult> = epoch_scores
            .iter()
            .filter(|s| s.qualifies)
            .cloned()
            .collect();
        let verification_failures = self.attest_all(epoch, qualifying.clone()).await;

        let mut report = EpochReport {
            epoch,
            scored: epoch_scores.len(),
            qualifying: qualifying.len(),
            score_failures,
            verification_failures,
            plan: None,
            outcome: None,
        };

        let plan = match self.registry.for_epoch(epoch) {
            Some(existing) => existing,
            None => match self.plan_epoch(epoch, &epoch_scores) {
                Ok(plan) => plan,
                Err(PlanError::EmptyPool { total_pool, .. }) => {
                    warn!(total_pool, "Reward pool is empty, skipping distribution");
                    self.forget_capacities(epoch);
                    self.reports.insert(epoch, report.clone());
                    return Ok(report);
                }
                Err(e) => return Err(e.into()),
            },
        };
        let outcome = self.executor.run_plan(&plan).await?;

        info!(
            plan_id = %plan.plan_id,
            scored = report.scored,
            qualifying = report.qualifying,
            unverified = report.verification_failures.len(),
            allocations = plan.allocations.len(),
            complete = outcome.complete,
            "Epoch closed"
        );
        report.plan = Some(plan);
        report.outcome = Some(outcome);
        self.reports.insert(epoch, report.clone());
        Ok(report)
    }

    fn plan_epoch(
        &self,
        epoch: Epoch,
        epoch_scores: &[ScoreResult],
    ) -> Result<DistributionPlan, PlanError> {
        let attestations = self.gateway.list(Some(epoch));
        let capacities: HashMap<OperationId, u64> = self
            .capacities
            .iter()
            .filter(|entry| entry.key().1 == epoch)
            .map(|entry| (entry.key().0.clone(), *entry.value()))
            .collect();
        let plan = self.planner.plan(
            epoch,
            self.pool_per_epoch,
            epoch_scores,
            &attestations,
            &capacities,
        )?;
        let plan = self.registry.register(plan)?;
        self.forget_capacities(epoch);
        Ok(plan)
    }

    fn record_capacities(&self, records: &[OperationRecord]) {
        for record in records {
            let milli_th = (record.hash_rate_th * 1000.0).round();
            let weight = if milli_th.is_finite() && milli_th > 0.0 {
                milli_th as u64
            } else {
                0
            };
            self.capacities
                .insert((record.operation_id.clone(), record.epoch), weight);
        }
    }

    fn forget_capacities(&self, epoch: Epoch) {
        self.capacities.retain(|key, _| key.1 != epoch);
    }

    async fn attest_all(
        &self,
        epoch: Epoch,
        qualifying: Vec<ScoreResult>,
    ) -> Vec<(OperationId, String)> {
        let results: Vec<_> = stream::iter(qualifying)
            .map(|score| async move {
                let claims = ClaimSet::new(ProofHandle::derive(
                    &score.operation_id,
                    epoch,
                    score.overall_score,
                ))
                .with_score(score.overall_score);
                let result = self.gateway.attest(&score.operation_id, epoch, claims).await;
                (score.operation_id, result)
            })
            .buffer_unordered(ATTESTATION_CONCURRENCY)
            .collect()
            .await;

        let mut failures: Vec<(OperationId, String)> = results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(_) => None,
                Err(e) => {
                    warn!(operation_id = %id, error = %e, "Attestation unavailable");
                    Some((id, e.to_string()))
                }
            })
            .collect();
        failures.sort();
        failures
    }

    /// Run every registered plan that still has records to move.
    ///
    /// Submitted records are polled again however long ago their plan was
    /// closed. Returns how many plans are still unsettled afterwards.
    pub async fn resume_incomplete(&self) -> PipelineResult<usize> {
        let _closing = self.closing.lock().await;

        let mut unsettled = 0;
        for plan in self.registry.list() {
            let outcome = self.executor.outcome(&plan.plan_id).await?;
            if !self.executor.needs_resume(&outcome) {
                continue;
            }
            let outcome = match self.executor.run_plan(&plan).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(plan_id = %plan.plan_id, error = %e, "Resuming plan failed");
                    unsettled += 1;
                    continue;
                }
            };
            info!(
                plan_id = %plan.plan_id,
                epoch = plan.epoch.0,
                complete = outcome.complete,
                "Resumed plan"
            );
            if self.executor.needs_resume(&outcome) {
                unsettled += 1;
            }
            if let Some(mut report) = self.reports.get_mut(&plan.epoch) {
                report.outcome = Some(outcome);
            }
        }
        Ok(unsettled)
    }

    /// Stop submitting the Pending records of a plan.
    ///
    /// Submitted records keep being polled by [`EcoPipeline::resume_incomplete`].
    pub async fn cancel_plan(&self, plan_id: &PlanId) -> PipelineResult<PlanOutcome> {
        if self.registry.get(plan_id).is_none() {
            return Err(PipelineError::UnknownPlan(plan_id.clone()));
        }
        self.executor.cancel(plan_id);
        Ok(self.executor.outcome(plan_id).await?)
    }

    /// Cancel every plan that still holds Pending records. Returns their ids.
    pub async fn cancel_in_flight(&self) -> PipelineResult<Vec<PlanId>> {
        let mut cancelled = Vec::new();
        for plan in self.registry.list() {
            let outcome = self.executor.outcome(&plan.plan_id).await?;
            if outcome.count(DistributionStatus::Pending) > 0
                && !self.executor.is_cancelled(&plan.plan_id)
            {
                self.executor.cancel(&plan.plan_id);
                cancelled.push(plan.plan_id);
            }
        }
        Ok(cancelled)
    }

    pub fn is_cancelled(&self, plan_id: &PlanId) -> bool {
        self.executor.is_cancelled(plan_id)
    }

    /// Report of the last close of `epoch`.
    pub fn epoch_report(&self, epoch: Epoch) -> Option<EpochReport> {
        self.reports.get(&epoch).map(|entry| entry.value().clone())
    }

    /// Reports of every closed epoch, oldest first.
    pub fn epoch_reports(&self) -> Vec<EpochReport> {
        let mut reports: Vec<EpochReport> = self
            .reports
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        reports.sort_by_key(|r| r.epoch);
        reports
    }

    /// Scores in the book, optionally for one epoch, by (epoch, operation).
    pub fn scores(&self, epoch: Option<Epoch>) -> Vec<ScoreResult> {
        let mut scores: Vec<ScoreResult> = self
            .scores
            .iter()
            .filter(|entry| epoch.map_or(true, |e| entry.key().1 == e))
            .map(|entry| entry.value().clone())
            .collect();
        scores.sort_by(|a, b| (a.epoch, &a.operation_id).cmp(&(b.epoch, &b.operation_id)));
        scores
    }

    /// Every score of one operation, oldest epoch first.
    pub fn score_history(&self, operation_id: &OperationId) -> Vec<ScoreResult> {
        let mut scores: Vec<ScoreResult> = self
            .scores
            .iter()
            .filter(|entry| &entry.key().0 == operation_id)
            .map(|entry| entry.value().clone())
            .collect();
        scores.sort_by_key(|s| s.epoch);
        scores
    }

    pub fn attestations(&self, epoch: Option<Epoch>) -> Vec<Attestation> {
        self.gateway.list(epoch)
    }

    pub fn attestation_summary(&self, epoch: Option<Epoch>) -> AttestationSummary {
        self.gateway.summary(epoch)
    }

    pub fn plans(&self) -> Vec<DistributionPlan> {
        self.registry.list()
    }

    pub fn plan(&self, plan_id: &PlanId) -> Option<DistributionPlan> {
        self.registry.get(plan_id)
    }

    pub fn plan_for_epoch(&self, epoch: Epoch) -> Option<DistributionPlan> {
        self.registry.for_epoch(epoch)
    }

    pub async fn plan_outcome(&self, plan_id: &PlanId) -> PipelineResult<PlanOutcome> {
        Ok(self.executor.outcome(plan_id).await?)
    }

    pub async fn records(&self) -> PipelineResult<Vec<DistributionRecord>> {
        Ok(self.executor.all_records().await?)
    }
}
