//! # PulseOne Server
//!
//! Bootstrap binary for the PulseOne industrial data-acquisition
//! collector: loads ambient runtime configuration, assembles the
//! `Runtime` root (driver factory, pipeline, rule engine, worker
//! registry), spawns the seeded device fleet, and exposes the read-only
//! introspection and process-control HTTP surface over `axum` (§6).

mod errors;
mod handlers;
mod mirror;
mod routes;
mod seed;
mod sinks;
mod state;

use pulseone_config::RuntimeConfig;
use pulseone_core::pipeline::{HistorianBuffer, LiveValueCache, Pipeline};
use pulseone_core::registry::Runtime;
use pulseone_core::rules::RuleEngine;
use pulseone_core::drivers;
use state::{AppState, DeviceDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulseone_server=debug,pulseone_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(RuntimeConfig::load()?);
    config.validate()?;
    info!(dev_mode = config.dev_mode, "runtime configuration loaded");

    let (live_cache, mirror_rx) = LiveValueCache::with_mirror(
        config.pipeline.live_cache_mailbox_capacity,
        Duration::from_secs(config.cache.default_ttl_secs),
    );
    mirror::spawn(config.cache.redis_url.clone(), mirror_rx);

    let historian = Arc::new(HistorianBuffer::spawn(
        Arc::new(sinks::TracingHistorianSink),
        config.pipeline.historian_mailbox_capacity,
        config.historian.batch_size,
        Duration::from_millis(config.historian.flush_interval_ms),
        Duration::from_millis(config.historian.retry_backoff_ms),
        Duration::from_millis(config.historian.max_retry_backoff_ms),
    ));

    let (rule_engine, mut republish_rx) = RuleEngine::new(live_cache.clone(), Arc::new(sinks::TracingOccurrenceSink));
    let rule_engine = Arc::new(rule_engine);

    let fleet = seed::default_fleet();
    rule_engine.load_alarm_rules(fleet.alarm_rules);
    rule_engine.load_virtual_points(fleet.virtual_points);

    let pipeline = Arc::new(Pipeline::new(live_cache, historian, rule_engine.clone()));

    // Virtual-point results are published back into the pipeline out of
    // band (§4.5) rather than through a direct reference back to it, so
    // this is the one place that closes the loop.
    let republish_pipeline = pipeline.clone();
    tokio::spawn(async move {
        while let Some(sample) = republish_rx.recv().await {
            republish_pipeline
                .route(sample, pulseone_model::StorageType::OnChange, true)
                .await;
        }
    });

    // Drains the Virtual-Point Evaluator's timer wheel: sleeps until the
    // next scheduled point is due (or a fallback tick if none are
    // scheduled yet), then evaluates and reschedules everything due.
    let timer_engine = rule_engine.clone();
    tokio::spawn(async move {
        loop {
            let sleep_for = timer_engine
                .virtual_points()
                .next_timer_due_in()
                .unwrap_or(Duration::from_secs(1));
            tokio::time::sleep(sleep_for).await;
            timer_engine.virtual_points().run_due_timers().await;
        }
    });

    let factory = Arc::new(drivers::built_in_factory());
    let runtime = Arc::new(Runtime::new(factory, pipeline, rule_engine));

    let directory = DeviceDirectory::new(fleet.devices.clone(), fleet.points_by_device.clone());
    for device in &fleet.devices {
        let points = directory.points(device.id).to_vec();
        if let Err(err) = runtime.registry.spawn_worker(device.clone(), points).await {
            warn!(device_id = device.id.0, error = %err, "failed to start device worker");
        }
    }

    let state = AppState { runtime: runtime.clone(), directory, config: config.clone() };
    let app = routes::create_router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.introspection.host, config.introspection.port).parse()?;
    info!(%addr, "introspection surface listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.registry.stop_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
