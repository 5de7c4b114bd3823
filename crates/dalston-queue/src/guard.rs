// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic SET-if-not-exists guard, backing two distinct uses that share the
//! same primitive: the per-job decrement-once key (§4.6) and the
//! reconciler's leader-election lock (§4.7). Kept separate from
//! `TaskQueue`'s per-stream idempotency keys since those are scoped to a
//! specific stage stream rather than a bare Redis key.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait DistributedGuard: Send + Sync {
    /// Attempt to create `key` with a TTL; returns `true` only for the
    /// caller that actually created it (SET NX semantics).
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, GuardError>;
}

pub struct RedisDistributedGuard {
    conn: ConnectionManager,
}

impl RedisDistributedGuard {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DistributedGuard for RedisDistributedGuard {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool, GuardError> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }
}

/// Key for the per-job decrement-once guard (§4.6).
pub fn decrement_once_key(job_id: impl std::fmt::Display) -> String {
    format!("dalston:decremented:{job_id}")
}

/// TTL on the decrement-once guard; only needs to outlive plausible
/// duplicate redelivery windows, not the job's lifetime.
pub const DECREMENT_ONCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key for the reconciler's leader-election lock (§4.7).
pub fn reconciler_lock_key() -> &'static str {
    "dalston:reconciler:lock"
}

/// Key for the tenant-scoped "job cancelled" marker engines consult
/// (§4.6 `job.cancel_requested`). Written via `try_acquire`; its return
/// value is ignored since the marker only needs to exist, not be won by a
/// particular caller.
pub fn cancel_marker_key(tenant_id: &str, job_id: impl std::fmt::Display) -> String {
    format!("dalston:cancelled:{tenant_id}:{job_id}")
}

/// TTL on the cancel marker; outlives any plausible in-flight task.
pub const CANCEL_MARKER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// In-memory guard for unit tests; TTLs are not actually timed out,
    /// since tests assert acquire-once behavior rather than expiry.
    #[derive(Clone, Default)]
    pub struct FakeDistributedGuard {
        held: Arc<Mutex<HashSet<String>>>,
    }

    impl FakeDistributedGuard {
        pub fn new() -> Self {
            Self::default()
        }

        /// Release a key early, simulating TTL expiry for reconciler
        /// stand-down tests.
        pub fn expire(&self, key: &str) {
            self.held.lock().remove(key);
        }
    }

    #[async_trait]
    impl DistributedGuard for FakeDistributedGuard {
        async fn try_acquire(&self, key: &str, _ttl: Duration) -> Result<bool, GuardError> {
            Ok(self.held.lock().insert(key.to_string()))
        }
    }
}
