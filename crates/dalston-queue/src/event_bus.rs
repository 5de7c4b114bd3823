// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual-transport event bus (§4.3): a lossy pub/sub fan-out channel plus a
//! durable, consumer-group-backed stream for the crash-critical event
//! subset.

use async_trait::async_trait;
use chrono::Utc;
use dalston_wire::{DurableEvent, Event};
use redis::aio::ConnectionManager;
use redis::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const FANOUT_CHANNEL: &str = "dalston:events:fanout";
const DURABLE_STREAM: &str = "dalston:events:durable";
/// Consumer group for the durable stream — one logical group shared by every
/// orchestrator process, so each event is delivered to exactly one of them
/// on its first attempt (§4.3, §5).
pub const DURABLE_GROUP: &str = "orchestrators";
/// Bounded retention: ~24h (§3 "Durable event ... Retained for ~24h,
/// trimmed to a bounded length"). Approximated as a length cap via
/// `MAXLEN ~` since the broker doesn't track write-time-based eviction.
const DURABLE_MAXLEN: usize = 200_000;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish to the lossy fan-out channel only. Used for non-critical,
    /// best-effort notification (e.g. a UI progress ping); every event in
    /// this system is currently durable too (see `Event::is_durable`), so
    /// callers publish both transports via `publish`.
    async fn publish_fanout(&self, event: &Event) -> Result<(), BusError>;

    /// Append to the durable stream (only called for `Event::is_durable()`
    /// events, which today is all of them).
    async fn publish_durable(&self, event: &Event) -> Result<String, BusError>;

    /// Convenience: publish to both transports, mirroring the original's
    /// dual-write in `emit_event`.
    async fn publish(&self, event: &Event) -> Result<(), BusError> {
        if event.is_durable() {
            self.publish_durable(event).await?;
        }
        self.publish_fanout(event).await?;
        Ok(())
    }

    /// Drain this orchestrator instance's own pending (unACKed) durable
    /// entries before consuming new ones (§4.3: "on startup, each
    /// orchestrator instance drains its own pending entries").
    async fn read_pending(&self, consumer: &str, count: usize) -> Result<Vec<DurableEvent>, BusError>;

    /// Read new durable entries (`>`), blocking up to `block`.
    async fn read_new(&self, consumer: &str, block: Duration) -> Result<Vec<DurableEvent>, BusError>;

    async fn ack_durable(&self, stream_id: &str) -> Result<(), BusError>;
}

pub struct RedisEventBus {
    conn: ConnectionManager,
}

impl RedisEventBus {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn ensure_group(&self) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(DURABLE_STREAM)
            .arg(DURABLE_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(&self, consumer: &str, id: &str, block: Option<Duration>) -> Result<Vec<DurableEvent>, BusError> {
        self.ensure_group().await?;
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(DURABLE_GROUP).arg(consumer).arg("COUNT").arg(100);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as i64);
        }
        cmd.arg("STREAMS").arg(DURABLE_STREAM).arg(id);

        let reply: redis::RedisResult<Value> = cmd.query_async(&mut conn).await;
        let reply = match reply {
            Ok(v) => v,
            Err(e) if e.is_timeout() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_entries(&reply))
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish_fanout(&self, event: &Event) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let _: i64 = redis::cmd("PUBLISH").arg(FANOUT_CHANNEL).arg(payload).query_async(&mut conn).await?;
        Ok(())
    }

    async fn publish_durable(&self, event: &Event) -> Result<String, BusError> {
        self.ensure_group().await?;
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let id: String = redis::cmd("XADD")
            .arg(DURABLE_STREAM)
            .arg("MAXLEN")
            .arg("~")
            .arg(DURABLE_MAXLEN)
            .arg("*")
            .arg("type")
            .arg(event.type_tag())
            .arg("timestamp")
            .arg(Utc::now().to_rfc3339())
            .arg("payload")
            .arg(payload)
            .arg("request_id")
            .arg(event.request_id().unwrap_or_default())
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn read_pending(&self, consumer: &str, count: usize) -> Result<Vec<DurableEvent>, BusError> {
        let mut events = self.read_group(consumer, "0", None).await?;
        events.truncate(count);
        Ok(events)
    }

    async fn read_new(&self, consumer: &str, block: Duration) -> Result<Vec<DurableEvent>, BusError> {
        self.read_group(consumer, ">", Some(block)).await
    }

    async fn ack_durable(&self, stream_id: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: i64 =
            redis::cmd("XACK").arg(DURABLE_STREAM).arg(DURABLE_GROUP).arg(stream_id).query_async(&mut conn).await?;
        Ok(())
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

fn fields_to_map(raw_fields: &[Value]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut iter = raw_fields.iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        map.insert(redis_str(k), redis_str(v));
    }
    map
}

fn parse_entries(reply: &Value) -> Vec<DurableEvent> {
    let mut out = Vec::new();
    let Value::Array(streams) = reply else { return out };
    for stream in streams {
        let Value::Array(stream) = stream else { continue };
        let Some(Value::Array(entries)) = stream.get(1) else { continue };
        for entry in entries {
            let Value::Array(entry) = entry else { continue };
            let Some(stream_id) = entry.first().map(redis_str) else { continue };
            let Some(Value::Array(raw_fields)) = entry.get(1) else { continue };
            let map = fields_to_map(raw_fields);
            let Some(payload) = map.get("payload") else { continue };
            let Ok(event) = serde_json::from_str::<Event>(payload) else { continue };
            let timestamp = map
                .get("timestamp")
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            out.push(DurableEvent { stream_id, event, timestamp });
        }
    }
    out
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// In-memory durable-stream-only event bus for handler/reconciler unit
    /// tests. Fan-out publishes are recorded but not delivered anywhere —
    /// tests assert against the durable queue, matching how the real
    /// handlers only treat the durable stream as load-bearing.
    #[derive(Clone, Default)]
    pub struct FakeEventBus {
        durable: Arc<Mutex<VecDeque<DurableEvent>>>,
        pending: Arc<Mutex<HashMap<String, DurableEvent>>>,
        fanout: Arc<Mutex<Vec<Event>>>,
        next_id: Arc<Mutex<u64>>,
    }

    impl FakeEventBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fanout_log(&self) -> Vec<Event> {
            self.fanout.lock().clone()
        }

        pub fn durable_len(&self) -> usize {
            self.durable.lock().len() + self.pending.lock().len()
        }
    }

    #[async_trait]
    impl EventBus for FakeEventBus {
        async fn publish_fanout(&self, event: &Event) -> Result<(), BusError> {
            self.fanout.lock().push(event.clone());
            Ok(())
        }

        async fn publish_durable(&self, event: &Event) -> Result<String, BusError> {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            let stream_id = format!("{next_id}-0");
            self.durable.lock().push_back(DurableEvent {
                stream_id: stream_id.clone(),
                event: event.clone(),
                timestamp: Utc::now(),
            });
            Ok(stream_id)
        }

        async fn read_pending(&self, _consumer: &str, count: usize) -> Result<Vec<DurableEvent>, BusError> {
            let pending = self.pending.lock();
            Ok(pending.values().take(count).cloned().collect())
        }

        async fn read_new(&self, _consumer: &str, _block: Duration) -> Result<Vec<DurableEvent>, BusError> {
            let mut durable = self.durable.lock();
            let mut pending = self.pending.lock();
            let mut out = Vec::new();
            while let Some(entry) = durable.pop_front() {
                pending.insert(entry.stream_id.clone(), entry.clone());
                out.push(entry);
            }
            Ok(out)
        }

        async fn ack_durable(&self, stream_id: &str) -> Result<(), BusError> {
            self.pending.lock().remove(stream_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalston_core::id::JobId;

    #[tokio::test]
    async fn fake_bus_delivers_new_then_tracks_pending_until_acked() {
        let bus = fake::FakeEventBus::new();
        let event = Event::JobCreated { job_id: JobId::new(), request_id: None };
        bus.publish(&event).await.unwrap();
        assert_eq!(bus.fanout_log(), vec![event.clone()]);

        let delivered = bus.read_new("orch-1", Duration::from_millis(10)).await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(bus.durable_len(), 1);

        bus.ack_durable(&delivered[0].stream_id).await.unwrap();
        assert_eq!(bus.durable_len(), 0);
    }

    #[tokio::test]
    async fn pending_entries_survive_until_explicitly_acked() {
        let bus = fake::FakeEventBus::new();
        bus.publish_durable(&Event::JobCompleted { job_id: JobId::new(), request_id: None }).await.unwrap();
        let _ = bus.read_new("orch-1", Duration::from_millis(10)).await.unwrap();
        let pending = bus.read_pending("orch-1", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
