// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dalston-registry: engine liveness tracking (§4.1) and an
//! object-storage-backed artifact existence/IO trait used by the scheduler
//! and reconciler (§4.5, §4.7).

pub mod artifact;
pub mod engine;

pub use artifact::{ArtifactError, ArtifactLookup, ArtifactStore, S3ArtifactStore};
pub use engine::{
    EngineRegistry, InstanceInfo, InstanceRecord, InstanceStatus, RedisEngineRegistry, RegistryError,
    ALIVE_WINDOW, DEFAULT_HEARTBEAT_PERIOD,
};

#[cfg(any(test, feature = "test-support"))]
pub use artifact::fake::FakeArtifactStore;
#[cfg(any(test, feature = "test-support"))]
pub use engine::fake::FakeEngineRegistry;
