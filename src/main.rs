use feeding_sync::{
    AuthSession, Config, FeedingStore, NetworkMonitor, RemoteClient, SyncState,
    grouping::{DEFAULT_INTERVAL_MINUTES, group},
    stats::summarize,
};
use std::{env, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let once = env::args().skip(1).any(|arg| arg == "--once");

    let session = AuthSession::new(config.token.clone());
    let client = RemoteClient::new(&config, session.clone(), NetworkMonitor::default())?;
    let store = FeedingStore::new(Arc::new(client), session);

    if once {
        let result = store.mount().await;
        println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
        result?;
        return Ok(());
    }

    info!(base_url = %config.base_url, environment = %config.environment, "starting feeding sync");
    if let Err(err) = store.mount().await {
        warn!("initial refresh failed: {err}");
    }
    report(&store.snapshot());

    let poller = store.start_polling(config.poll_interval);
    let mut updates = store.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            report(&state);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    poller.stop().await;
    reporter.abort();

    Ok(())
}

fn report(state: &SyncState) {
    if state.loading {
        return;
    }
    if let Some(err) = &state.error {
        warn!(error = %err, "showing last known data");
    }
    let Some(current) = &state.current else {
        return;
    };

    info!(
        date = %current.date,
        fed = current.amount_fed,
        target = current.target,
        percent = current.percent_of_goal().round(),
        status = %current.status(),
        "today"
    );
    for bucket in group(&current.events, DEFAULT_INTERVAL_MINUTES) {
        info!(
            time = %bucket.label,
            cups = bucket.total_amount,
            feedings = bucket.events.len(),
            "feeding"
        );
    }

    let summary = summarize(&state.history);
    info!(
        days = summary.total_entries,
        avg = summary.avg_amount,
        on_target = summary.days_on_target,
        "history"
    );
}
