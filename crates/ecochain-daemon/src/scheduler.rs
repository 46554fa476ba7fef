//! Epoch scheduler
//!
//! Closes each finished epoch that has buffered readings, once.

use crate::config::SchedulerConfig;
use crate::pipeline::EcoPipeline;
use dashmap::DashSet;
use ecochain_types::Epoch;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, Duration};

/// Scheduler state
pub struct Scheduler {
    config: SchedulerConfig,
    pipeline: Arc<EcoPipeline>,
    closed: DashSet<Epoch>,
    /// Epochs whose close failed after their readings were taken.
    retry: DashSet<Epoch>,
    running: Arc<RwLock<bool>>,
    shutdown: Notify,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig, pipeline: Arc<EcoPipeline>) -> Arc<Self> {
        Arc::new(Self {
            config,
            pipeline,
            closed: DashSet::new(),
            retry: DashSet::new(),
            running: Arc::new(RwLock::new(false)),
            shutdown: Notify::new(),
        })
    }

    /// Run the tick loop until [`Scheduler::stop`] is called.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(tick_secs = self.config.tick_secs, "Scheduler started");

        let mut ticker = interval(Duration::from_secs(self.config.tick_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }

            let running = *self.running.read().await;
            if !running {
                break;
            }

            let closed = self.tick().await;
            if closed > 0 {
                tracing::debug!(closed, "Scheduler tick closed epochs");
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        self.shutdown.notify_one();
    }

    /// Close every finished, not yet closed epoch, then resume plans that
    /// still have records in flight. Returns how many epochs closed.
    ///
    /// An epoch that fails to close is retried on the next tick.
    pub async fn tick(&self) -> usize {
        let current = self.pipeline.clock().current();
        let mut due: BTreeSet<Epoch> = self
            .pipeline
            .buffered_epochs()
            .await
            .into_iter()
            .filter(|e| *e < current && !self.closed.contains(e))
            .collect();
        due.extend(self.retry.iter().map(|e| *e));

        let mut closed = 0;
        for epoch in due {
            match self.pipeline.close_epoch(epoch).await {
                Ok(report) => {
                    tracing::info!(
                        epoch = epoch.0,
                        scored = report.scored,
                        planned = report.plan.is_some(),
                        settled = report.is_settled(),
                        "Closed epoch"
                    );
                    for (operation_id, reason) in &report.verification_failures {
                        tracing::warn!(
                            epoch = epoch.0,
                            operation_id = %operation_id,
                            reason = %reason,
                            "Qualifying operation left unattested"
                        );
                    }
                    self.retry.remove(&epoch);
                    self.closed.insert(epoch);
                    closed += 1;
                }
                Err(e) => {
                    tracing::error!(epoch = epoch.0, error = %e, "Closing epoch failed");
                    self.retry.insert(epoch);
                }
            }
        }

        match self.pipeline.resume_incomplete().await {
            Ok(0) => {}
            Ok(unsettled) => tracing::debug!(unsettled, "Plans still settling"),
            Err(e) => tracing::error!(error = %e, "Resuming plans failed"),
        }
        closed
    }

    pub fn is_closed(&self, epoch: Epoch) -> bool {
        self.closed.contains(&epoch)
    }
}
