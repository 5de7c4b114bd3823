// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the orchestrator binary: configuration plus the
//! transport errors `dalston-core::CoreError` wraps opaquely.

use dalston_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Folds a library-specific error into [`CoreError`] at call sites, since a
/// blanket `impl From<X> for CoreError` would implement a foreign trait for
/// a foreign type for every `X` here and the orphan rule forbids that.
pub trait IntoCoreError {
    fn into_core_error(self) -> CoreError;
}

impl IntoCoreError for sqlx::Error {
    fn into_core_error(self) -> CoreError {
        CoreError::storage(self)
    }
}

impl IntoCoreError for dalston_queue::QueueError {
    fn into_core_error(self) -> CoreError {
        CoreError::broker(self)
    }
}

impl IntoCoreError for dalston_queue::GuardError {
    fn into_core_error(self) -> CoreError {
        CoreError::broker(self)
    }
}

impl IntoCoreError for dalston_queue::BusError {
    fn into_core_error(self) -> CoreError {
        CoreError::broker(self)
    }
}

impl IntoCoreError for dalston_registry::RegistryError {
    fn into_core_error(self) -> CoreError {
        CoreError::broker(self)
    }
}

impl IntoCoreError for dalston_registry::ArtifactError {
    fn into_core_error(self) -> CoreError {
        CoreError::object_store(self)
    }
}

impl IntoCoreError for dalston_queue::CounterError {
    fn into_core_error(self) -> CoreError {
        CoreError::broker(self)
    }
}
