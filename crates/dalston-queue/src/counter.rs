// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tenant concurrent-job counter (§5 "Backpressure"). Incremented once
//! at job acceptance (`gateway_api::submit_job`) and decremented exactly
//! once at a job's terminal transition, behind the decrement-once guard in
//! `dalston-orchestrator::common`. Grounded on the original's
//! `RedisRateLimiter` counter half (`KEY_PREFIX_JOBS:{tenant_id}`,
//! `rate_limiter.py`); the sliding-window request-rate half of that struct
//! is a gateway concern and stays out of scope here.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use thiserror::Error;

/// TTL refreshed on every increment so a tenant with no recent activity
/// doesn't carry a zombie counter from a crashed process forever (§5).
const COUNTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn counter_key(tenant_id: &str) -> String {
    format!("dalston:ratelimit:jobs:{tenant_id}")
}

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

#[async_trait]
pub trait ConcurrencyCounter: Send + Sync {
    /// Increment a tenant's in-flight job count at acceptance.
    async fn increment(&self, tenant_id: &str) -> Result<(), CounterError>;

    /// Decrement a tenant's in-flight job count. Floors at zero rather than
    /// going negative, matching the original's guard against a stray extra
    /// decrement leaving the counter permanently wrong.
    async fn decrement(&self, tenant_id: &str) -> Result<(), CounterError>;

    /// Current count, for the gateway's admission check (out of scope here
    /// beyond exposing the read).
    async fn current(&self, tenant_id: &str) -> Result<i64, CounterError>;
}

pub struct RedisConcurrencyCounter {
    conn: ConnectionManager,
}

impl RedisConcurrencyCounter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ConcurrencyCounter for RedisConcurrencyCounter {
    async fn increment(&self, tenant_id: &str) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let key = counter_key(tenant_id);
        let _: i64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        let _: () = redis::cmd("EXPIRE").arg(&key).arg(COUNTER_TTL.as_secs()).query_async(&mut conn).await?;
        Ok(())
    }

    async fn decrement(&self, tenant_id: &str) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let key = counter_key(tenant_id);
        let result: i64 = redis::cmd("DECR").arg(&key).query_async(&mut conn).await?;
        if result < 0 {
            let _: () = redis::cmd("SET").arg(&key).arg(0).query_async(&mut conn).await?;
        }
        Ok(())
    }

    async fn current(&self, tenant_id: &str) -> Result<i64, CounterError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET").arg(counter_key(tenant_id)).query_async(&mut conn).await?;
        Ok(value.unwrap_or(0))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeConcurrencyCounter {
        counts: Arc<Mutex<HashMap<String, i64>>>,
    }

    impl FakeConcurrencyCounter {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ConcurrencyCounter for FakeConcurrencyCounter {
        async fn increment(&self, tenant_id: &str) -> Result<(), CounterError> {
            *self.counts.lock().entry(tenant_id.to_string()).or_insert(0) += 1;
            Ok(())
        }

        async fn decrement(&self, tenant_id: &str) -> Result<(), CounterError> {
            let mut counts = self.counts.lock();
            let entry = counts.entry(tenant_id.to_string()).or_insert(0);
            *entry = (*entry - 1).max(0);
            Ok(())
        }

        async fn current(&self, tenant_id: &str) -> Result<i64, CounterError> {
            Ok(*self.counts.lock().get(tenant_id).unwrap_or(&0))
        }
    }
}
