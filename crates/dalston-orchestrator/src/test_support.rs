// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake-backed [`AppCtx`] construction shared by every module's unit tests.

use std::sync::Arc;
use std::time::Duration;

use dalston_dag::{CatalogEntry, DefaultEngines, ModelCatalog};
use dalston_queue::{FakeConcurrencyCounter, FakeDistributedGuard, FakeEventBus, FakeTaskQueue};
use dalston_registry::{FakeArtifactStore, FakeEngineRegistry};
use dalston_storage::{FakeJobStore, FakeTaskStore};

use crate::ctx::{AppCtx, Tunables};

pub struct Fakes {
    pub jobs: FakeJobStore,
    pub tasks: FakeTaskStore,
    pub queue: FakeTaskQueue,
    pub bus: FakeEventBus,
    pub artifacts: FakeArtifactStore,
    pub registry: FakeEngineRegistry,
    pub guard: FakeDistributedGuard,
    pub concurrency: FakeConcurrencyCounter,
}

/// Build an [`AppCtx`] wired to fresh in-memory fakes, plus handles to each
/// fake so a test can seed state or assert on it afterward.
pub fn fake_ctx() -> (AppCtx, Fakes) {
    let fakes = Fakes {
        jobs: FakeJobStore::new(),
        tasks: FakeTaskStore::new(),
        queue: FakeTaskQueue::new(),
        bus: FakeEventBus::new(),
        artifacts: FakeArtifactStore::new(),
        registry: FakeEngineRegistry::new(),
        guard: FakeDistributedGuard::new(),
        concurrency: FakeConcurrencyCounter::new(),
    };

    let ctx = AppCtx {
        jobs: Arc::new(fakes.jobs.clone()),
        tasks: Arc::new(fakes.tasks.clone()),
        queue: Arc::new(fakes.queue.clone()),
        bus: Arc::new(fakes.bus.clone()),
        artifacts: Arc::new(fakes.artifacts.clone()),
        registry: Arc::new(fakes.registry.clone()),
        guard: Arc::new(fakes.guard.clone()),
        concurrency: Arc::new(fakes.concurrency.clone()),
        catalog: ModelCatalog::new(sample_catalog()),
        default_engines: DefaultEngines::default(),
        tunables: Tunables {
            stale_threshold: Duration::from_secs(600),
            reconcile_interval: Duration::from_secs(300),
            reconcile_lock_ttl: Duration::from_secs(60),
            event_poll_block: Duration::from_secs(5),
            consumer_name: "orchestrator-test".to_string(),
        },
    };

    (ctx, fakes)
}

fn sample_catalog() -> Vec<CatalogEntry> {
    vec![CatalogEntry {
        model_id: "whisper-large".to_string(),
        aliases: vec![],
        runtime: dalston_core::id::EngineId::new("faster-whisper"),
        runtime_model_id: Some("large-v3".to_string()),
        native_word_timestamps: false,
        capabilities: ["transcribe".to_string()].into_iter().collect(),
    }]
}

/// Register a live, capable instance of every engine the default pipeline
/// needs, so `enqueue`'s liveness *and* capability checks pass without
/// per-test setup. Each instance declares the stage name it serves as its
/// capability, matching the convention `common::enqueue` checks against
/// (`Task::base_stage()`).
pub async fn register_default_engines(fakes: &Fakes, defaults: &DefaultEngines) {
    use dalston_core::id::InstanceId;
    use dalston_registry::{EngineRegistry, InstanceInfo, InstanceStatus};

    for (engine_id, stage) in [
        (&defaults.prepare, "prepare"),
        (&defaults.transcribe, "transcribe"),
        (&defaults.align, "align"),
        (&defaults.diarize, "diarize"),
        (&defaults.merge, "merge"),
    ] {
        let instance_id = InstanceId::new(engine_id);
        fakes
            .registry
            .register(&InstanceInfo {
                engine_id: engine_id.clone(),
                instance_id,
                status: InstanceStatus::Online,
                capabilities: vec![stage.to_string()],
            })
            .await
            .expect("fake registry register never fails");
    }
}
