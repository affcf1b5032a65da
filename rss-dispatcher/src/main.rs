use anyhow::{bail, Context};
use clap::Parser;
use rss_dispatcher::config::{Cli, Command, PublisherKind};
use rss_dispatcher::{
    api, registration, DiffEngine, EventPublisher, Fetcher, HttpPublisher, PgOutboxPublisher,
    PgWatermarkStore, SweepOrchestrator, SweepTrigger, WatermarkStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rss_dispatcher=info,warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    info!("Connecting to database: {}", cli.masked_database_url());
    let store = PgWatermarkStore::connect(&cli.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database. Make sure PostgreSQL is running:");
            error!("  Check connection string: {}", cli.masked_database_url());
            e
        })?;
    let pool = store.pool().clone();
    let store = Arc::new(store);

    match &cli.command {
        Command::Migrate => {
            store.migrate().await?;
        }
        Command::Register { url } => {
            let feed_id = registration::register(store.as_ref(), url).await?;
            println!("{}", feed_id);
        }
        Command::List => {
            let feeds = registration::list_feeds(store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&feeds)?);
        }
        Command::Sweep { feed } => {
            let orchestrator = build_orchestrator(&cli, store.clone(), pool)?;
            match feed {
                Some(feed_id) => {
                    let outcome = orchestrator.sweep_feed(*feed_id).await;
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                None => {
                    let summary = orchestrator.run_sweep().await?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
        Command::Watch { interval_secs } => {
            let orchestrator = build_orchestrator(&cli, store.clone(), pool)?;
            let trigger = SweepTrigger::new(Arc::new(orchestrator));
            trigger
                .run_every(Duration::from_secs(*interval_secs), shutdown_signal())
                .await;
        }
        Command::Serve {
            bind,
            interval_secs,
        } => {
            let orchestrator = build_orchestrator(&cli, store.clone(), pool)?;
            let trigger = SweepTrigger::new(Arc::new(orchestrator));

            if let Some(secs) = *interval_secs {
                let background = trigger.clone();
                tokio::spawn(async move {
                    background
                        .run_every(Duration::from_secs(secs), shutdown_signal())
                        .await;
                });
            }

            let app = api::router(api::AppState::new(store.clone(), trigger));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {}", bind))?;
            info!("Listening on {}", bind);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

fn build_orchestrator(
    cli: &Cli,
    store: Arc<PgWatermarkStore>,
    pool: sqlx::PgPool,
) -> anyhow::Result<SweepOrchestrator> {
    let publisher: Arc<dyn EventPublisher> = match cli.publish.publisher {
        PublisherKind::Http => {
            let Some(endpoint) = cli.publish.publish_endpoint.clone() else {
                bail!("PUBLISH_ENDPOINT is required when PUBLISHER=http");
            };
            info!("Publishing events to {}", endpoint);
            Arc::new(HttpPublisher::new(
                endpoint,
                cli.publish.publish_token.clone(),
                cli.publish.publish_timeout_secs,
            )?)
        }
        PublisherKind::Outbox => {
            info!("Publishing events to the dispatch_events outbox");
            Arc::new(PgOutboxPublisher::new(pool))
        }
    };

    let sweep_config = cli.sweep_config();
    let source = Arc::new(Fetcher::new(cli.fetch_config())?);
    let store: Arc<dyn WatermarkStore> = store;
    let engine = DiffEngine::new(source, store, publisher)
        .with_max_items_per_sweep(sweep_config.max_items_per_sweep);

    Ok(SweepOrchestrator::new(engine, sweep_config))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
