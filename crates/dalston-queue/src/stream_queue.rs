// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable, per-stage task queue backed by a Redis stream with a single
//! consumer group (§4.2).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dalston_core::id::{EngineId, InstanceId, JobId, TaskId};
use dalston_registry::EngineRegistry;
use dalston_wire::QueueMessage;
use dalston_wire::PendingEntry;
use redis::aio::ConnectionManager;
use redis::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Single consumer group name shared by every stage stream (§6).
pub const CONSUMER_GROUP: &str = "engines";

/// Default stale threshold for reclaiming work from a dead engine (§4.2).
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Advisory max-delivery count surfaced to callers; the queue itself never
/// refuses redelivery past this count (only the reconciler's stale-owner
/// check actually reclaims), matching the distilled spec's "advisory" framing.
pub const MAX_DELIVERY_ADVISORY: u64 = 3;

fn stream_key(stage: &str) -> String {
    format!("dalston:stream:{stage}")
}

fn idempotency_key(key: &str) -> String {
    format!("dalston:idem:{key}")
}

const IDEMPOTENCY_TTL_SECONDS: i64 = 6 * 60 * 60;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Fields carried on a queue message, beyond the `QueueMessage` shape, that
/// the caller supplies at `add` time.
#[derive(Debug, Clone)]
pub struct EnqueueFields {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub engine_id: EngineId,
    pub timeout_at: DateTime<Utc>,
    pub request_id: Option<String>,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append a message to `stage`'s stream. When `idempotency_key` is
    /// `Some`, a best-effort SET-NX guard (TTL'd) rejects the append if the
    /// key was already used — returns `Ok(None)` in that case rather than
    /// appending a duplicate (§4.2, used for retry-enqueue idempotency).
    async fn add(
        &self,
        stage: &str,
        fields: EnqueueFields,
        idempotency_key: Option<&str>,
    ) -> Result<Option<String>, QueueError>;

    /// Block for up to `block` for the next new message delivered to
    /// `consumer`; returns `None` on timeout. Always returns a message with
    /// `delivery_count == 1` (the first delivery of a fresh entry).
    async fn read_next(
        &self,
        stage: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<(String, QueueMessage)>, QueueError>;

    async fn get_pending(&self, stage: &str) -> Result<Vec<PendingEntry>, QueueError>;

    /// Reassign PEL ownership of `message_ids` to `consumer` (delivery
    /// count increments server-side).
    async fn claim(&self, stage: &str, consumer: &str, message_ids: &[String]) -> Result<(), QueueError>;

    async fn ack(&self, stage: &str, message_id: &str) -> Result<(), QueueError>;

    /// Compose `get_pending` + registry liveness + `claim`: the set of PEL
    /// entries whose idle time exceeds `threshold` *and* whose owning
    /// instance is not alive (§4.2's reclaim conjunction). Does not claim
    /// them itself — callers decide recovery semantics (the reconciler
    /// re-enqueues `ready` tasks before acking, and resolves `running` tasks
    /// by artifact lookup instead, per §4.7 steps 2 and 4).
    async fn stale_entries_from_dead_engines(
        &self,
        stage: &str,
        registry: &dyn EngineRegistry,
        threshold: Duration,
    ) -> Result<Vec<PendingEntry>, QueueError> {
        let pending = self.get_pending(stage).await?;
        let mut stale = Vec::new();
        for entry in pending {
            if !entry.is_idle_past(threshold) {
                continue;
            }
            let instance_id = InstanceId::from_string(entry.owner_instance().to_string());
            if !registry.is_alive(&instance_id).await.unwrap_or(false) {
                stale.push(entry);
            }
        }
        Ok(stale)
    }
}

pub struct RedisTaskQueue {
    conn: ConnectionManager,
}

impl RedisTaskQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Idempotently ensure the consumer group exists for a stage stream.
    /// Real deployments run this once at startup per known stage; tests and
    /// `add` both call it defensively since group creation is itself
    /// idempotent (`MKSTREAM` + ignoring `BUSYGROUP`).
    pub async fn ensure_group(&self, stage: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key(stage))
            .arg(CONSUMER_GROUP)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn message_fields(message: &QueueMessage) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("task_id", message.task_id.to_string()),
            ("job_id", message.job_id.to_string()),
            ("engine_id", message.engine_id.as_str().to_string()),
            ("enqueued_at", message.enqueued_at.to_rfc3339()),
            ("timeout_at", message.timeout_at.to_rfc3339()),
        ];
        if let Some(request_id) = &message.request_id {
            fields.push(("request_id", request_id.clone()));
        }
        fields
    }

    fn parse_message(map: &HashMap<String, String>) -> Option<QueueMessage> {
        Some(QueueMessage {
            task_id: map.get("task_id")?.parse().ok()?,
            job_id: map.get("job_id")?.parse().ok()?,
            engine_id: EngineId::new(map.get("engine_id")?.clone()),
            enqueued_at: DateTime::parse_from_rfc3339(map.get("enqueued_at")?).ok()?.with_timezone(&Utc),
            timeout_at: DateTime::parse_from_rfc3339(map.get("timeout_at")?).ok()?.with_timezone(&Utc),
            request_id: map.get("request_id").cloned(),
        })
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn add(
        &self,
        stage: &str,
        fields: EnqueueFields,
        idempotency_key: Option<&str>,
    ) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();

        if let Some(key) = idempotency_key {
            let set: Option<String> = redis::cmd("SET")
                .arg(idempotency_key(key))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(IDEMPOTENCY_TTL_SECONDS)
                .query_async(&mut conn)
                .await?;
            if set.is_none() {
                return Ok(None);
            }
        }

        self.ensure_group(stage).await?;

        let now = Utc::now();
        let message = QueueMessage {
            task_id: fields.task_id,
            job_id: fields.job_id,
            engine_id: fields.engine_id,
            enqueued_at: now,
            timeout_at: fields.timeout_at,
            request_id: fields.request_id,
        };

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_key(stage)).arg("*");
        for (field, value) in Self::message_fields(&message) {
            cmd.arg(field).arg(value);
        }
        let message_id: String = cmd.query_async(&mut conn).await?;
        Ok(Some(message_id))
    }

    async fn read_next(
        &self,
        stage: &str,
        consumer: &str,
        block: Duration,
    ) -> Result<Option<(String, QueueMessage)>, QueueError> {
        self.ensure_group(stage).await?;
        let mut conn = self.conn.clone();
        let reply: redis::RedisResult<Value> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(CONSUMER_GROUP)
            .arg(consumer)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block.as_millis() as i64)
            .arg("STREAMS")
            .arg(stream_key(stage))
            .arg(">")
            .query_async(&mut conn)
            .await;

        let reply = match reply {
            Ok(v) => v,
            Err(e) if e.is_timeout() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_single_entry(&reply).and_then(|(id, map)| Self::parse_message(&map).map(|m| (id, m))))
    }

    async fn get_pending(&self, stage: &str) -> Result<Vec<PendingEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XPENDING")
            .arg(stream_key(stage))
            .arg(CONSUMER_GROUP)
            .arg("-")
            .arg("+")
            .arg(10_000)
            .query_async(&mut conn)
            .await?;

        let mut entries = Vec::new();
        if let Value::Array(rows) = reply {
            for row in rows {
                if let Value::Array(fields) = row {
                    if fields.len() == 4 {
                        let message_id = redis_str(&fields[0]);
                        let consumer = redis_str(&fields[1]);
                        let idle_ms = redis_int(&fields[2]).unwrap_or(0).max(0) as u64;
                        let delivery_count = redis_int(&fields[3]).unwrap_or(1).max(1) as u64;

                        let task_id = self.task_id_for_message(stage, &message_id).await?;
                        if let Some(task_id) = task_id {
                            entries.push(PendingEntry { message_id, task_id, consumer, idle_ms, delivery_count });
                        }
                    }
                }
            }
        }
        Ok(entries)
    }

    async fn claim(&self, stage: &str, consumer: &str, message_ids: &[String]) -> Result<(), QueueError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream_key(stage)).arg(CONSUMER_GROUP).arg(consumer).arg(0);
        for id in message_ids {
            cmd.arg(id);
        }
        let _: Value = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn ack(&self, stage: &str, message_id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 =
            redis::cmd("XACK").arg(stream_key(stage)).arg(CONSUMER_GROUP).arg(message_id).query_async(&mut conn).await?;
        Ok(())
    }
}

impl RedisTaskQueue {
    async fn task_id_for_message(&self, stage: &str, message_id: &str) -> Result<Option<TaskId>, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Value =
            redis::cmd("XRANGE").arg(stream_key(stage)).arg(message_id).arg(message_id).query_async(&mut conn).await?;
        if let Value::Array(rows) = reply {
            if let Some(Value::Array(entry)) = rows.into_iter().next() {
                if entry.len() == 2 {
                    if let Value::Array(raw_fields) = &entry[1] {
                        let map = fields_to_map(raw_fields);
                        return Ok(map.get("task_id").and_then(|s| s.parse().ok()));
                    }
                }
            }
        }
        Ok(None)
    }
}

fn redis_str(value: &Value) -> String {
    match value {
        Value::BulkString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::SimpleString(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        _ => String::new(),
    }
}

fn redis_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        _ => None,
    }
}

fn fields_to_map(raw_fields: &[Value]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut iter = raw_fields.iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        map.insert(redis_str(k), redis_str(v));
    }
    map
}

/// Parses an `XREADGROUP ... COUNT 1` reply shaped
/// `[[stream_key, [[entry_id, [field, value, ...]]]]]` into the single
/// entry it carries, if any.
fn parse_single_entry(reply: &Value) -> Option<(String, HashMap<String, String>)> {
    let Value::Array(streams) = reply else { return None };
    let Value::Array(stream) = streams.first()? else { return None };
    let Value::Array(entries) = stream.get(1)? else { return None };
    let Value::Array(entry) = entries.first()? else { return None };
    let id = redis_str(entry.first()?);
    let Value::Array(raw_fields) = entry.get(1)? else { return None };
    Some((id, fields_to_map(raw_fields)))
}

/// Timeout above which `timeout_at` is deemed stale regardless of the
/// distributed reconcile sweep (advisory only — see module docs).
pub fn default_timeout_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + ChronoDuration::from_std(DEFAULT_STALE_THRESHOLD).unwrap_or_default()
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Entry {
        message_id: String,
        message: QueueMessage,
        consumer: Option<String>,
        delivery_count: u64,
        idle_ms: u64,
    }

    /// In-memory per-stage stream queue for scheduler/handler/reconciler unit
    /// tests. One FIFO list per stage name, plus a claimed-but-unacked set
    /// that `get_pending` reports exactly as the real PEL would.
    #[derive(Clone, Default)]
    pub struct FakeTaskQueue {
        streams: Arc<Mutex<HashMap<String, Vec<Entry>>>>,
        idempotency: Arc<Mutex<std::collections::HashSet<String>>>,
        next_id: Arc<Mutex<u64>>,
    }

    impl FakeTaskQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Total unacked entries across every stage, for assertions that a
        /// handler didn't leave dangling queue state.
        pub fn unacked_len(&self, stage: &str) -> usize {
            self.streams.lock().get(stage).map(|e| e.len()).unwrap_or(0)
        }

        /// Backdate a claimed entry's idle time, simulating a worker that
        /// stopped acking (reconciler stale-entry tests).
        pub fn set_idle_ms(&self, stage: &str, message_id: &str, idle_ms: u64) {
            if let Some(entries) = self.streams.lock().get_mut(stage) {
                if let Some(entry) = entries.iter_mut().find(|e| e.message_id == message_id) {
                    entry.idle_ms = idle_ms;
                }
            }
        }
    }

    #[async_trait]
    impl TaskQueue for FakeTaskQueue {
        async fn add(
            &self,
            stage: &str,
            fields: EnqueueFields,
            idempotency_key: Option<&str>,
        ) -> Result<Option<String>, QueueError> {
            if let Some(key) = idempotency_key {
                if !self.idempotency.lock().insert(key.to_string()) {
                    return Ok(None);
                }
            }
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            let message_id = format!("{next_id}-0");
            let message = QueueMessage {
                task_id: fields.task_id,
                job_id: fields.job_id,
                engine_id: fields.engine_id,
                enqueued_at: Utc::now(),
                timeout_at: fields.timeout_at,
                request_id: fields.request_id,
            };
            self.streams.lock().entry(stage.to_string()).or_default().push(Entry {
                message_id: message_id.clone(),
                message,
                consumer: None,
                delivery_count: 0,
                idle_ms: 0,
            });
            Ok(Some(message_id))
        }

        async fn read_next(
            &self,
            stage: &str,
            consumer: &str,
            _block: Duration,
        ) -> Result<Option<(String, QueueMessage)>, QueueError> {
            let mut streams = self.streams.lock();
            let Some(entries) = streams.get_mut(stage) else { return Ok(None) };
            for entry in entries.iter_mut() {
                if entry.consumer.is_none() {
                    entry.consumer = Some(consumer.to_string());
                    entry.delivery_count = 1;
                    return Ok(Some((entry.message_id.clone(), entry.message.clone())));
                }
            }
            Ok(None)
        }

        async fn get_pending(&self, stage: &str) -> Result<Vec<PendingEntry>, QueueError> {
            let streams = self.streams.lock();
            let Some(entries) = streams.get(stage) else { return Ok(Vec::new()) };
            Ok(entries
                .iter()
                .filter_map(|e| {
                    e.consumer.as_ref().map(|consumer| PendingEntry {
                        message_id: e.message_id.clone(),
                        task_id: e.message.task_id,
                        consumer: consumer.clone(),
                        idle_ms: e.idle_ms,
                        delivery_count: e.delivery_count,
                    })
                })
                .collect())
        }

        async fn claim(&self, stage: &str, consumer: &str, message_ids: &[String]) -> Result<(), QueueError> {
            let mut streams = self.streams.lock();
            let Some(entries) = streams.get_mut(stage) else { return Ok(()) };
            for entry in entries.iter_mut() {
                if message_ids.contains(&entry.message_id) {
                    entry.consumer = Some(consumer.to_string());
                    entry.delivery_count += 1;
                }
            }
            Ok(())
        }

        async fn ack(&self, stage: &str, message_id: &str) -> Result<(), QueueError> {
            let mut streams = self.streams.lock();
            if let Some(entries) = streams.get_mut(stage) {
                entries.retain(|e| e.message_id != message_id);
            }
            Ok(())
        }
    }
}
