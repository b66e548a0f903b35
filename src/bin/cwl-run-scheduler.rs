//! Scheduler daemon entry point.
//!
//! Exit codes: 0 on a clean SIGINT/SIGTERM shutdown, nonzero on a startup
//! failure (bad config, unreachable store, unreachable event bus).

use std::sync::Arc;

use cwl_run::events::InMemoryEventBus;
use cwl_run::scheduler::{Scheduler, SchedulerConfig};
use cwl_run::store::InMemoryStateStore;

const EXIT_OK: i32 = 0;
const EXIT_STARTUP_FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(InMemoryStateStore::new());
    let event_bus = Arc::new(InMemoryEventBus::default());
    let executor = match build_executor() {
        Ok(executor) => executor,
        Err(e) => {
            tracing::error!(error = %e, "failed to start executor");
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    };
    let loader: cwl_run::scheduler::DocumentLoader = Arc::new(|path: &str| {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading workflow document at {path}"))
            .map_err(|e| cwl_run::WorkflowError::Internal(e.to_string()))?;
        cwl_run::document::parse_document(&text)
    });

    let scheduler = Scheduler::new(store, event_bus, executor, loader, SchedulerConfig::default());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received interrupt, shutting down");
        let _ = shutdown_tx.send(());
    });

    match scheduler.run(shutdown_rx).await {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            tracing::error!(error = %e, "scheduler loop exited with error");
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    }
}

fn build_executor() -> cwl_run::WorkflowResult<Arc<dyn cwl_run::executor::Executor>> {
    Err(cwl_run::WorkflowError::Internal(
        "no Executor implementation configured; wire a concrete task runner before starting the daemon".into(),
    ))
}
