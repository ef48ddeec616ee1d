use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::EnvFilter;

use pricewatch::{
    config,
    routes,
    services::{
        fetcher::HttpFetcher,
        notifier::{Notifier, TelegramNotifier},
        scheduler::{Scheduler, SchedulerOptions},
        store::Store,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = config::load();
    tracing::info!(db = %settings.db_file.display(), "pricewatch starting");

    let store = Store::open_or_recreate(&settings.db_file)?;

    if !settings.has_notifier_credentials() {
        tracing::warn!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set; alerts will only be logged");
    }
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::from_settings(&settings));
    let fetcher = Arc::new(HttpFetcher::new(settings.request_timeout)?);

    let (events_tx, _events_rx) = tokio::sync::broadcast::channel::<String>(64);

    let scheduler = Scheduler::new(
        store.clone(),
        fetcher,
        Arc::clone(&notifier),
        SchedulerOptions::from_settings(&settings),
        events_tx.clone(),
    );
    let handle = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run());

    let state = AppState {
        store,
        settings: settings.clone(),
        scheduler: handle.clone(),
        notifier,
        events_tx,
    };
    let app = routes::app(state);

    let addr = SocketAddr::from((settings.host.parse::<std::net::IpAddr>()?, settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let stop = handle.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let token = stop.cancellation_token();
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("ctrl-c received, shutting down"),
                _ = token.cancelled() => {}
            }
            // also ends open SSE streams so the server can drain
            stop.shutdown();
        })
        .await?;

    if let Err(e) = scheduler_task.await {
        tracing::error!("scheduler task failed: {e}");
    }

    Ok(())
}
