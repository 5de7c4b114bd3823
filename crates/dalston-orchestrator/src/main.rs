// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator process entrypoint: wires the production (Postgres / Redis
//! / S3) backends into an [`AppCtx`] and runs two concurrent loops — the
//! durable-event consumer (§4.3, §4.6) and the periodic reconciler sweep
//! (§4.7) — until shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use dalston_dag::{CatalogEntry, DefaultEngines, ModelCatalog};
use dalston_orchestrator::config;
use dalston_orchestrator::ctx::{AppCtx, Tunables};
use dalston_orchestrator::error::{IntoCoreError, OrchestratorError};
use dalston_orchestrator::handlers::dispatch;
use dalston_orchestrator::reconcile;
use dalston_queue::{RedisConcurrencyCounter, RedisDistributedGuard, RedisEventBus, RedisTaskQueue};
use dalston_registry::{RedisEngineRegistry, S3ArtifactStore};
use dalston_storage::{PgJobStore, PgTaskStore};
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Every stage the default pipeline can route work to (§4.4); each backs a
/// distinct Redis stream that needs its consumer group created once.
const STAGES: [&str; 5] = ["prepare", "transcribe", "align", "diarize", "merge"];

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dalston_orchestrator=info,dalston_dag=info,dalston_queue=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if config::log_format() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Loads the catalog from `DALSTON_MODEL_CATALOG_PATH` if set. A missing
/// file, unreadable file, or malformed JSON all fall back to an empty
/// catalog rather than failing startup — `DefaultEngines` alone is enough
/// to route every stage (§4.4 "Fallback").
async fn load_catalog() -> ModelCatalog {
    let Some(path) = config::model_catalog_path() else {
        info!("no DALSTON_MODEL_CATALOG_PATH set, starting with an empty model catalog");
        return ModelCatalog::new(Vec::new());
    };
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%path, error = %e, "failed to read model catalog file, starting empty");
            return ModelCatalog::new(Vec::new());
        }
    };
    let entries: Vec<CatalogEntry> = serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(%path, error = %e, "model catalog file is not valid JSON, starting empty");
        Vec::new()
    });
    ModelCatalog::new(entries)
}

async fn build_artifact_store() -> Result<S3ArtifactStore, OrchestratorError> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(config::artifact_bucket()?)
        .with_region(config::artifact_region())
        .with_allow_http(config::artifact_allow_http());
    if let Some(endpoint) = config::artifact_endpoint() {
        builder = builder.with_endpoint(endpoint);
    }
    let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
    Ok(S3ArtifactStore::new(store))
}

async fn build_ctx() -> Result<AppCtx, OrchestratorError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(&config::database_url()?).await?;
    dalston_storage::MIGRATOR.run(&pool).await.map_err(|e| OrchestratorError::Sqlx(e.into()))?;

    let redis_client = redis::Client::open(config::redis_url()?)?;
    let conn = redis_client.get_connection_manager().await?;

    let bus = RedisEventBus::new(conn.clone());
    bus.ensure_group().await.map_err(IntoCoreError::into_core_error)?;

    let queue = RedisTaskQueue::new(conn.clone());
    for stage in STAGES {
        queue.ensure_group(stage).await.map_err(IntoCoreError::into_core_error)?;
    }

    let guard = RedisDistributedGuard::new(conn.clone());
    let registry = RedisEngineRegistry::with_heartbeat_period(conn.clone(), config::heartbeat_period());
    let concurrency = RedisConcurrencyCounter::new(conn);

    let artifacts = build_artifact_store().await?;
    let catalog = load_catalog().await;

    Ok(AppCtx {
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        tasks: Arc::new(PgTaskStore::new(pool)),
        queue: Arc::new(queue),
        bus: Arc::new(bus),
        artifacts: Arc::new(artifacts),
        registry: Arc::new(registry),
        guard: Arc::new(guard),
        concurrency: Arc::new(concurrency),
        catalog,
        default_engines: DefaultEngines::default(),
        tunables: Tunables {
            stale_threshold: config::stale_threshold(),
            reconcile_interval: config::reconcile_interval(),
            reconcile_lock_ttl: config::reconcile_lock_ttl(),
            event_poll_block: config::event_poll_block(),
            consumer_name: config::consumer_name(),
        },
    })
}

/// Drain this process's own un-ACKed durable entries from a prior run
/// before joining the `>` (new-entries) read (§4.3).
async fn drain_pending(ctx: &AppCtx) {
    match ctx.bus.read_pending(&ctx.tunables.consumer_name, 100).await {
        Ok(entries) if entries.is_empty() => {}
        Ok(entries) => {
            info!(count = entries.len(), "replaying pending entries from a prior run");
            for entry in entries {
                if let Err(e) = dispatch(ctx, entry.event.clone()).await {
                    error!(error = %e, stream_id = %entry.stream_id, "pending entry replay failed, will retry next pass");
                    continue;
                }
                if let Err(e) = ctx.bus.ack_durable(&entry.stream_id).await {
                    error!(error = %e, stream_id = %entry.stream_id, "failed to ack replayed entry");
                }
            }
        }
        Err(e) => error!(error = %e, "failed to read pending entries on startup"),
    }
}

/// The durable-event consumer loop: read, dispatch, ack. Never exits on a
/// handler error — an un-ACKed entry is simply redelivered (§4.2, §4.7).
async fn event_loop(ctx: Arc<AppCtx>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let entries = tokio::select! {
            result = ctx.bus.read_new(&ctx.tunables.consumer_name, ctx.tunables.event_poll_block) => result,
            _ = shutdown.changed() => return,
        };
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "durable stream read failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        for entry in entries {
            if let Err(e) = dispatch(&ctx, entry.event.clone()).await {
                error!(error = %e, stream_id = %entry.stream_id, "event handler failed, leaving unacked for redelivery");
                continue;
            }
            if let Err(e) = ctx.bus.ack_durable(&entry.stream_id).await {
                error!(error = %e, stream_id = %entry.stream_id, "failed to ack processed entry");
            }
        }
    }
}

/// The leader-elected reconciliation loop (§4.7): attempts the lock on
/// every tick regardless of whether this process won it last time.
async fn reconcile_loop(ctx: Arc<AppCtx>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.tunables.reconcile_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        match reconcile::tick(&ctx, ctx.tunables.reconcile_lock_ttl, ctx.tunables.stale_threshold).await {
            Ok(true) => info!("reconcile sweep complete"),
            Ok(false) => info!("stood down, another instance holds the reconciler lock"),
            Err(e) => error!(error = %e, "reconcile sweep failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), OrchestratorError> {
    init_tracing();
    info!("starting dalston-orchestrator");

    let ctx = Arc::new(build_ctx().await?);
    drain_pending(&ctx).await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let events = tokio::spawn(event_loop(ctx.clone(), shutdown_rx.clone()));
    let reconciler = tokio::spawn(reconcile_loop(ctx.clone(), shutdown_rx));

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown requested, draining in-flight work");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(events, reconciler);
    info!("dalston-orchestrator stopped");
    Ok(())
}
