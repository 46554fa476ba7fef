//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::pipeline::EcoPipeline;
use crate::scheduler::Scheduler;
use crate::simulated::{SimulatedLedger, SimulatedVerifier};
use ecochain_scoring::RawReading;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// EcoChain daemon server
pub struct Server {
    config: DaemonConfig,
    pipeline: Arc<EcoPipeline>,
    scheduler: Arc<Scheduler>,
}

impl Server {
    /// Create a new server backed by the simulated collaborators
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let verifier = Arc::new(SimulatedVerifier::from_config(&config.simulation));
        let ledger = Arc::new(SimulatedLedger::from_config(&config.simulation));
        let pipeline = Arc::new(EcoPipeline::new(&config, verifier, ledger)?);

        if let Some(seed) = &config.scheduler.seed_file {
            let readings = load_readings(seed).await?;
            let summary = pipeline.ingest_all(&readings).await;
            tracing::info!(
                path = %seed.display(),
                accepted = summary.accepted,
                late = summary.late,
                rejected = summary.rejected,
                "Ingested seed readings"
            );
        }

        let scheduler = Scheduler::new(config.scheduler.clone(), pipeline.clone());

        Ok(Self {
            config,
            pipeline,
            scheduler,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.pipeline.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("EcoChain daemon listening on {}", addr);
        tracing::info!(
            epoch_secs = self.pipeline.clock().length_secs(),
            policy = %self.config.distribution.policy,
            pool = self.config.distribution.pool_per_epoch,
            "Pipeline configured"
        );

        // Start scheduler in background
        let scheduler = self.scheduler.clone();
        let scheduler_handle = tokio::spawn(async move {
            scheduler.start().await;
        });

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("EcoChain daemon shutting down");

        // Submitted transfers still settle on the next start.
        match self.pipeline.cancel_in_flight().await {
            Ok(cancelled) if !cancelled.is_empty() => {
                tracing::info!(plans = cancelled.len(), "Cancelled in-flight plans");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Cancelling in-flight plans failed"),
        }
        self.scheduler.stop().await;
        if let Err(e) = scheduler_handle.await {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }

        Ok(())
    }
}

/// Read a JSON array of raw readings
pub async fn load_readings(path: &Path) -> DaemonResult<Vec<RawReading>> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DaemonError::Seed(format!("{}: {}", path.display(), e)))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
