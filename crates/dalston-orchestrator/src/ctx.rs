// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application context threaded through the scheduler, handlers,
//! reconciler, and gateway API. Trait objects let production (Postgres /
//! Redis / S3) and test (in-memory fake) backends share one call surface.

use std::sync::Arc;
use std::time::Duration;

use dalston_dag::{DefaultEngines, ModelCatalog};
use dalston_queue::{ConcurrencyCounter, DistributedGuard, EventBus, TaskQueue};
use dalston_registry::{ArtifactStore, EngineRegistry};
use dalston_storage::{JobStore, TaskStore};

/// Tunables read once at startup from [`crate::config`] and carried on the
/// context rather than re-read from the environment on every handler call.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub stale_threshold: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_lock_ttl: Duration,
    pub event_poll_block: Duration,
    pub consumer_name: String,
}

pub struct AppCtx {
    pub jobs: Arc<dyn JobStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub bus: Arc<dyn EventBus>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub registry: Arc<dyn EngineRegistry>,
    pub guard: Arc<dyn DistributedGuard>,
    pub concurrency: Arc<dyn ConcurrencyCounter>,
    pub catalog: ModelCatalog,
    pub default_engines: DefaultEngines,
    pub tunables: Tunables,
}
