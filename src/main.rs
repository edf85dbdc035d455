use std::sync::Arc;
use std::time::Duration;

use payments_ledger_core::api::{create_router, AppState};
use payments_ledger_core::cache::RateLimiter;
use payments_ledger_core::config::Settings;
use payments_ledger_core::events::broker::{consumer_config, run_consumer, BrokerPort};
use payments_ledger_core::events::consumer::EventConsumer;
use payments_ledger_core::idempotency::{IdempotencyCleanupJob, IdempotencyHandler, IdempotencyHandlerConfig};
use payments_ledger_core::observability::{
    init_logging, init_metrics, HealthChecker, LogConfig, LogFormat,
};
use payments_ledger_core::services::{
    create_gateway, InboundConsumer, OutboxDispatcher, ReconciliationScheduler, ReconciliationService,
    WebhookDispatcher,
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::new()?;

    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(settings.application.log_format.as_str()),
        include_target: true,
        include_file: false,
        include_line: false,
    };
    init_logging(&log_config);

    let metrics_handle = init_metrics();
    info!("configuration loaded, metrics initialized");

    info!("connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_seconds))
        .connect(&settings.database.url)
        .await?;
    info!("database connection established");

    info!("running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("migrations applied successfully");

    info!("connecting to redis");
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    let mut con = redis_client.get_multiplexed_async_connection().await?;
    let _: () = redis::cmd("PING").query_async(&mut con).await?;
    info!("redis connection established");

    info!("connecting to kafka broker");
    let mut broker = BrokerPort::new(vec![settings.kafka.brokers.clone()]);
    match tokio::time::timeout(Duration::from_secs(settings.kafka.connect_timeout_seconds), broker.connect()).await {
        Ok(Ok(())) => info!("kafka producer connected"),
        Ok(Err(e)) => tracing::warn!(error = %e, "kafka connection failed, continuing without event streaming"),
        Err(_) => tracing::warn!("kafka connection timed out, continuing without event streaming"),
    }
    let broker = Arc::new(broker);

    let health_checker = Arc::new(HealthChecker::new(pool.clone(), redis_client.clone(), None));

    let rate_limiter = RateLimiter::new(redis_client.clone(), &settings.rate_limit);
    let webhook_dispatcher = WebhookDispatcher::new(pool.clone(), &settings.webhook);

    let state = AppState::new(
        pool.clone(),
        redis_client.clone(),
        rate_limiter,
        settings.auth.clone(),
        &settings.idempotency,
        webhook_dispatcher,
    )
    .with_metrics(metrics_handle)
    .with_health_checker(health_checker);

    let cancellation = CancellationToken::new();

    let outbox_dispatcher = Arc::new(OutboxDispatcher::new(pool.clone(), broker.clone(), "payments-ledger-core"));
    let outbox_task = tokio::spawn(outbox_dispatcher.clone().run(cancellation.child_token()));

    let inbound_consumer = Arc::new(InboundConsumer::new(pool.clone()));
    let consumer = EventConsumer::new(consumer_config(vec![settings.kafka.brokers.clone()], "payments-ledger-core"));
    let consumer_task = tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            tokio::select! {
                _ = cancellation.cancelled() => {}
                result = run_consumer(consumer, inbound_consumer) => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "broker consumer stopped");
                    }
                }
            }
        }
    });

    let webhook_task = tokio::spawn(state.webhook_dispatcher.clone().run(cancellation.child_token()));

    let gateway = Arc::from(create_gateway(&settings.gateway));
    let reconciliation_scheduler = Arc::new(ReconciliationScheduler::new(
        pool.clone(),
        Arc::new(ReconciliationService::new(pool.clone())),
        gateway,
        settings.reconciliation.interval_minutes,
    ));
    let reconciliation_task = tokio::spawn(reconciliation_scheduler.run(cancellation.child_token()));

    let cleanup_job = IdempotencyCleanupJob::new(
        Arc::new(IdempotencyHandler::new(
            pool.clone(),
            redis_client.clone(),
            IdempotencyHandlerConfig { ttl_seconds: settings.idempotency.ttl_seconds },
        )),
        3600,
    );
    let cleanup_task = cleanup_job.start();

    let app = create_router(state);
    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    info!(%addr, "starting http server");
    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancellation.cancel();
    cleanup_task.abort();
    let _ = tokio::join!(outbox_task, consumer_task, webhook_task, reconciliation_task);

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
