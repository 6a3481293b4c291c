mod cli;
mod events;
mod members;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use guard_core::{default_settings_path, GuardSettings};
use link_store::{IdentityLinkStore, SharedLinkStore};
use members::FileDirectory;
use officer_sweep::{LinkService, Reconciler};
use prometheus::Registry;
use prometheus_bridge::GuardMetrics;
use std::io::BufReader;
use std::sync::Arc;
use tracing::{info, warn};

fn log_metrics(metrics: &GuardMetrics) {
    match metrics.render() {
        Ok(text) => info!(metrics = %text, "final metrics"),
        Err(err) => warn!(error = %err, "could not render metrics"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.log_json);

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let settings = GuardSettings::load(&settings_path)?;
    info!(
        settings = %settings_path.display(),
        guild = %settings.server_id,
        officer_roles = settings.ladder().officer_roles().len(),
        "starting mps-guard"
    );

    let store = IdentityLinkStore::load(&settings.link_db_path)?;
    let directory = FileDirectory::open(&args.members)?;
    info!(members = directory.len(), links = store.len(), "state loaded");
    let metrics = GuardMetrics::new(Registry::new()).context("registering metrics")?;
    metrics.observe_link_count(store.len());

    let reconciler = Reconciler::new(
        SharedLinkStore::new(store),
        directory,
        settings.ladder(),
        metrics,
    );
    let service = Arc::new(LinkService::new(reconciler));

    if args.once {
        let report = service.reconciler().run_pass().await;
        info!(report = %serde_json::to_string(&report)?, "single pass complete");
        log_metrics(service.reconciler().metrics());
        return Ok(());
    }

    service
        .start_reconciliation_loop(settings.sweep_interval(), async {})
        .await;

    let event_pump = if args.role_events_stdin {
        let lines = events::spawn_line_reader(BufReader::new(std::io::stdin()))
            .context("starting role event reader")?;
        let service = Arc::clone(&service);
        Some(tokio::spawn(async move {
            let removed = events::pump_role_events(lines, &service).await;
            info!(removed, "role event pump finished");
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown requested");

    if let Some(event_pump) = event_pump {
        event_pump.abort();
    }
    service.stop_reconciliation_loop().await;
    log_metrics(service.reconciler().metrics());
    Ok(())
}
