// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine registry: tracks worker instances and liveness via heartbeats
//! (§4.1).
//!
//! Liveness is scoped to `instance_id`, never `engine_id` — a replacement
//! instance reusing the same logical engine name must never appear to
//! revive a dead predecessor's claims (§9, DESIGN.md Open Question #1).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dalston_core::id::{EngineId, InstanceId};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The alive window from §4.1: a heartbeat older than this is considered
/// dead even if the Redis key hasn't expired yet (e.g. a slow clock skew
/// between heartbeat period and TTL).
pub const ALIVE_WINDOW: Duration = Duration::from_secs(60);

/// Default heartbeat period; TTL is set to at least three periods (§4.1,
/// §6: "the TTL must exceed three heartbeat intervals").
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(20);

fn heartbeat_ttl_seconds(period: Duration) -> i64 {
    let three_periods = period.saturating_mul(3);
    three_periods.max(ALIVE_WINDOW).as_secs() as i64
}

fn engines_key() -> String {
    "dalston:engines".to_string()
}

fn instances_key(engine_id: &EngineId) -> String {
    format!("dalston:engine:{}:instances", engine_id.as_str())
}

fn heartbeat_key(instance_id: &InstanceId) -> String {
    format!("dalston:instance:{}", instance_id.as_str())
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Liveness status an instance reports on its own heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Online,
    Draining,
    Offline,
}

dalston_core::simple_display! {
    InstanceStatus {
        Online => "online",
        Draining => "draining",
        Offline => "offline",
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "draining" => Ok(Self::Draining),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// Information supplied at instance registration.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub engine_id: EngineId,
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    pub capabilities: Vec<String>,
}

/// A live instance as returned by `list_instances`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub capabilities: Vec<String>,
}

/// Engine liveness tracking (§4.1).
#[async_trait]
pub trait EngineRegistry: Send + Sync {
    async fn register(&self, instance: &InstanceInfo) -> Result<(), RegistryError>;
    async fn heartbeat(&self, instance_id: &InstanceId, status: InstanceStatus) -> Result<(), RegistryError>;
    async fn is_alive(&self, instance_id: &InstanceId) -> Result<bool, RegistryError>;
    async fn list_instances(&self, engine_id: &EngineId) -> Result<Vec<InstanceRecord>, RegistryError>;

    /// Whether any live instance of `engine_id` declares every capability in
    /// `required` (used by the scheduler's enqueue-time availability check
    /// and the DAG builder's capability-driven engine resolution, §4.4–4.5).
    async fn has_capable_live_instance(
        &self,
        engine_id: &EngineId,
        required: &[String],
    ) -> Result<bool, RegistryError> {
        let instances = self.list_instances(engine_id).await?;
        Ok(instances
            .iter()
            .any(|i| required.iter().all(|cap| i.capabilities.iter().any(|c| c == cap))))
    }

    /// Sweep expired heartbeat records out of the instance-set indices
    /// (§4.7 step 5, SPEC_FULL.md §4.1). Returns the engine ids whose
    /// instance set became empty and were removed from the global set.
    async fn prune_expired(&self) -> Result<Vec<EngineId>, RegistryError>;
}

pub struct RedisEngineRegistry {
    conn: ConnectionManager,
    heartbeat_period: Duration,
}

impl RedisEngineRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, heartbeat_period: DEFAULT_HEARTBEAT_PERIOD }
    }

    pub fn with_heartbeat_period(conn: ConnectionManager, period: Duration) -> Self {
        Self { conn, heartbeat_period: period }
    }

    async fn write_heartbeat(
        &self,
        instance_id: &InstanceId,
        status: InstanceStatus,
        capabilities: Option<&[String]>,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let key = heartbeat_key(instance_id);
        let now = Utc::now();
        let mut fields: Vec<(&str, String)> =
            vec![("status", status.to_string()), ("last_heartbeat", now.to_rfc3339())];
        let caps_json;
        if let Some(caps) = capabilities {
            caps_json = serde_json::to_string(caps)?;
            fields.push(("capabilities", caps_json));
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(&key);
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(heartbeat_ttl_seconds(self.heartbeat_period))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EngineRegistry for RedisEngineRegistry {
    async fn register(&self, instance: &InstanceInfo) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SADD").arg(engines_key()).arg(instance.engine_id.as_str()).query_async(&mut conn).await?;
        let _: () = redis::cmd("SADD")
            .arg(instances_key(&instance.engine_id))
            .arg(instance.instance_id.as_str())
            .query_async(&mut conn)
            .await?;
        self.write_heartbeat(&instance.instance_id, instance.status, Some(&instance.capabilities)).await
    }

    async fn heartbeat(&self, instance_id: &InstanceId, status: InstanceStatus) -> Result<(), RegistryError> {
        self.write_heartbeat(instance_id, status, None).await
    }

    async fn is_alive(&self, instance_id: &InstanceId) -> Result<bool, RegistryError> {
        let mut conn = self.conn.clone();
        let fields: Vec<(String, String)> =
            redis::cmd("HGETALL").arg(heartbeat_key(instance_id)).query_async(&mut conn).await?;
        if fields.is_empty() {
            return Ok(false);
        }
        let map: std::collections::HashMap<String, String> = fields.into_iter().collect();
        let status = map.get("status").and_then(|s| s.parse::<InstanceStatus>().ok());
        if status == Some(InstanceStatus::Offline) {
            return Ok(false);
        }
        let last_heartbeat = map
            .get("last_heartbeat")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        match last_heartbeat {
            Some(ts) => {
                let age = Utc::now().signed_duration_since(ts);
                Ok(age < chrono::Duration::from_std(ALIVE_WINDOW).unwrap_or_default())
            }
            None => Ok(false),
        }
    }

    async fn list_instances(&self, engine_id: &EngineId) -> Result<Vec<InstanceRecord>, RegistryError> {
        let mut conn = self.conn.clone();
        let instance_ids: Vec<String> =
            redis::cmd("SMEMBERS").arg(instances_key(engine_id)).query_async(&mut conn).await?;
        let mut live = Vec::new();
        for raw_id in instance_ids {
            let instance_id = InstanceId::from_string(raw_id);
            if !self.is_alive(&instance_id).await? {
                continue;
            }
            let fields: Vec<(String, String)> =
                redis::cmd("HGETALL").arg(heartbeat_key(&instance_id)).query_async(&mut conn).await?;
            let map: std::collections::HashMap<String, String> = fields.into_iter().collect();
            let status = map
                .get("status")
                .and_then(|s| s.parse::<InstanceStatus>().ok())
                .unwrap_or(InstanceStatus::Offline);
            let last_heartbeat = map
                .get("last_heartbeat")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let capabilities: Vec<String> =
                map.get("capabilities").and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default();
            live.push(InstanceRecord { instance_id, status, last_heartbeat, capabilities });
        }
        Ok(live)
    }

    async fn prune_expired(&self) -> Result<Vec<EngineId>, RegistryError> {
        let mut conn = self.conn.clone();
        let engine_ids: Vec<String> = redis::cmd("SMEMBERS").arg(engines_key()).query_async(&mut conn).await?;
        let mut removed_engines = Vec::new();
        for raw_engine in engine_ids {
            let engine_id = EngineId::new(raw_engine);
            let key = instances_key(&engine_id);
            let instance_ids: Vec<String> = redis::cmd("SMEMBERS").arg(&key).query_async(&mut conn).await?;
            for raw_instance in &instance_ids {
                let exists: bool =
                    redis::cmd("EXISTS").arg(heartbeat_key(&InstanceId::from_string(raw_instance.clone()))).query_async(&mut conn).await?;
                if !exists {
                    let _: () = redis::cmd("SREM").arg(&key).arg(raw_instance).query_async(&mut conn).await?;
                }
            }
            let remaining: i64 = redis::cmd("SCARD").arg(&key).query_async(&mut conn).await?;
            if remaining == 0 {
                let _: () = redis::cmd("SREM").arg(engines_key()).arg(engine_id.as_str()).query_async(&mut conn).await?;
                let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
                removed_engines.push(engine_id);
            }
        }
        Ok(removed_engines)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// In-memory registry for unit tests (used throughout
    /// `dalston-orchestrator`'s handler/reconciler tests so they don't need
    /// a live Redis instance).
    #[derive(Clone, Default)]
    pub struct FakeEngineRegistry {
        inner: Arc<Mutex<HashMap<String, InstanceRecord>>>,
        engine_of: Arc<Mutex<HashMap<String, EngineId>>>,
    }

    impl FakeEngineRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        /// Force an instance's last heartbeat backward in time, simulating a
        /// crashed worker for reconciler tests.
        pub fn expire(&self, instance_id: &InstanceId) {
            self.inner.lock().remove(instance_id.as_str());
        }

        pub fn set_status(&self, instance_id: &InstanceId, status: InstanceStatus) {
            if let Some(record) = self.inner.lock().get_mut(instance_id.as_str()) {
                record.status = status;
            }
        }
    }

    #[async_trait]
    impl EngineRegistry for FakeEngineRegistry {
        async fn register(&self, instance: &InstanceInfo) -> Result<(), RegistryError> {
            self.engine_of.lock().insert(instance.instance_id.as_str().to_string(), instance.engine_id.clone());
            self.inner.lock().insert(
                instance.instance_id.as_str().to_string(),
                InstanceRecord {
                    instance_id: instance.instance_id.clone(),
                    status: instance.status,
                    last_heartbeat: Utc::now(),
                    capabilities: instance.capabilities.clone(),
                },
            );
            Ok(())
        }

        async fn heartbeat(&self, instance_id: &InstanceId, status: InstanceStatus) -> Result<(), RegistryError> {
            if let Some(record) = self.inner.lock().get_mut(instance_id.as_str()) {
                record.status = status;
                record.last_heartbeat = Utc::now();
            }
            Ok(())
        }

        async fn is_alive(&self, instance_id: &InstanceId) -> Result<bool, RegistryError> {
            let guard = self.inner.lock();
            Ok(match guard.get(instance_id.as_str()) {
                Some(record) => {
                    record.status != InstanceStatus::Offline
                        && Utc::now().signed_duration_since(record.last_heartbeat)
                            < chrono::Duration::from_std(ALIVE_WINDOW).unwrap_or_default()
                }
                None => false,
            })
        }

        async fn list_instances(&self, engine_id: &EngineId) -> Result<Vec<InstanceRecord>, RegistryError> {
            let engine_of = self.engine_of.lock();
            let guard = self.inner.lock();
            let mut out = Vec::new();
            for (instance_key, record) in guard.iter() {
                if engine_of.get(instance_key) == Some(engine_id)
                    && record.status != InstanceStatus::Offline
                    && Utc::now().signed_duration_since(record.last_heartbeat)
                        < chrono::Duration::from_std(ALIVE_WINDOW).unwrap_or_default()
                {
                    out.push(record.clone());
                }
            }
            Ok(out)
        }

        async fn prune_expired(&self) -> Result<Vec<EngineId>, RegistryError> {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_at_least_three_heartbeat_periods() {
        assert_eq!(heartbeat_ttl_seconds(Duration::from_secs(20)), 60);
        assert_eq!(heartbeat_ttl_seconds(Duration::from_secs(1)), 60);
        assert_eq!(heartbeat_ttl_seconds(Duration::from_secs(30)), 90);
    }

    #[tokio::test]
    async fn fake_registry_round_trips_register_and_list() {
        let registry = fake::FakeEngineRegistry::new();
        let engine = EngineId::new("faster-whisper");
        let instance = InstanceId::new(&engine);
        registry
            .register(&InstanceInfo {
                engine_id: engine.clone(),
                instance_id: instance.clone(),
                status: InstanceStatus::Online,
                capabilities: vec!["word_timestamps".into()],
            })
            .await
            .unwrap();

        assert!(registry.is_alive(&instance).await.unwrap());
        let live = registry.list_instances(&engine).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(registry.has_capable_live_instance(&engine, &["word_timestamps".into()]).await.unwrap());
        assert!(!registry.has_capable_live_instance(&engine, &["diarization".into()]).await.unwrap());
    }

    #[tokio::test]
    async fn crashed_instance_is_not_alive_after_expiry() {
        let registry = fake::FakeEngineRegistry::new();
        let engine = EngineId::new("whisperx-align");
        let instance = InstanceId::new(&engine);
        registry
            .register(&InstanceInfo {
                engine_id: engine.clone(),
                instance_id: instance.clone(),
                status: InstanceStatus::Online,
                capabilities: vec![],
            })
            .await
            .unwrap();
        registry.expire(&instance);
        assert!(!registry.is_alive(&instance).await.unwrap());
        assert!(registry.list_instances(&engine).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replacement_instance_does_not_mask_predecessor_death() {
        let registry = fake::FakeEngineRegistry::new();
        let engine = EngineId::new("faster-whisper");
        let dead = InstanceId::new(&engine);
        registry
            .register(&InstanceInfo {
                engine_id: engine.clone(),
                instance_id: dead.clone(),
                status: InstanceStatus::Online,
                capabilities: vec![],
            })
            .await
            .unwrap();
        registry.expire(&dead);

        let replacement = InstanceId::new(&engine);
        registry
            .register(&InstanceInfo {
                engine_id: engine.clone(),
                instance_id: replacement.clone(),
                status: InstanceStatus::Online,
                capabilities: vec![],
            })
            .await
            .unwrap();

        assert!(!registry.is_alive(&dead).await.unwrap());
        assert!(registry.is_alive(&replacement).await.unwrap());
    }
}
