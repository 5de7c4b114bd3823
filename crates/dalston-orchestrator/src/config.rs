// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the orchestrator binary.

use std::time::Duration;

use crate::error::ConfigError;

/// Postgres connection string (`DALSTON_DATABASE_URL`). Required.
pub fn database_url() -> Result<String, ConfigError> {
    std::env::var("DALSTON_DATABASE_URL").map_err(|_| ConfigError::MissingVar("DALSTON_DATABASE_URL"))
}

/// Redis connection string (`DALSTON_REDIS_URL`). Required.
pub fn redis_url() -> Result<String, ConfigError> {
    std::env::var("DALSTON_REDIS_URL").map_err(|_| ConfigError::MissingVar("DALSTON_REDIS_URL"))
}

/// S3-compatible bucket backing the artifact store (`DALSTON_ARTIFACT_BUCKET`). Required.
pub fn artifact_bucket() -> Result<String, ConfigError> {
    std::env::var("DALSTON_ARTIFACT_BUCKET").map_err(|_| ConfigError::MissingVar("DALSTON_ARTIFACT_BUCKET"))
}

/// Optional S3-compatible endpoint override, for MinIO/localstack-style deployments.
pub fn artifact_endpoint() -> Option<String> {
    std::env::var("DALSTON_ARTIFACT_ENDPOINT").ok().filter(|s| !s.is_empty())
}

pub fn artifact_region() -> String {
    std::env::var("DALSTON_ARTIFACT_REGION").unwrap_or_else(|_| "us-east-1".to_string())
}

pub fn artifact_allow_http() -> bool {
    std::env::var("DALSTON_ARTIFACT_ALLOW_HTTP").ok().and_then(|s| s.parse().ok()).unwrap_or(false)
}

/// Heartbeat period this process writes at, if it also runs an engine-side
/// component; for the orchestrator binary this only governs the engine
/// registry's TTL math used by the reconciler's liveness checks.
pub fn heartbeat_period() -> Duration {
    std::env::var("DALSTON_HEARTBEAT_PERIOD_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(dalston_registry::DEFAULT_HEARTBEAT_PERIOD)
}

/// Reconcile sweep interval (default 5 min, §4.7).
pub fn reconcile_interval() -> Duration {
    std::env::var("DALSTON_RECONCILE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(5 * 60))
}

/// Threshold above which a `running` task with no PEL entry is considered
/// orphaned, and above which a `ready` task's idle PEL entry is considered
/// stale (default 10 min, §4.2, §4.7).
pub fn stale_threshold() -> Duration {
    std::env::var("DALSTON_STALE_THRESHOLD_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(dalston_queue::DEFAULT_STALE_THRESHOLD)
}

/// TTL on the reconciler's leader-election lock key.
pub fn reconcile_lock_ttl() -> Duration {
    std::env::var("DALSTON_RECONCILE_LOCK_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60))
}

/// Bounded block duration for the durable event stream reader, so the main
/// loop stays responsive to shutdown signals (§5 "Timeouts").
pub fn event_poll_block() -> Duration {
    std::env::var("DALSTON_EVENT_POLL_BLOCK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Identifies this orchestrator process as a durable-stream consumer.
/// Stable across restarts unless overridden, so `read_pending` on startup
/// recovers this process's own un-ACKed entries (§4.3).
pub fn consumer_name() -> String {
    std::env::var("DALSTON_CONSUMER_NAME").unwrap_or_else(|_| {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "orchestrator".to_string());
        format!("orchestrator-{hostname}")
    })
}

/// `fmt` (human-readable) or `json` (structured), selecting the
/// `tracing-subscriber` layer at startup.
pub fn log_format() -> String {
    std::env::var("DALSTON_LOG_FORMAT").unwrap_or_else(|_| "fmt".to_string())
}

/// Path to the JSON-encoded model catalog (§4.4). Optional; an empty
/// catalog still works since `DefaultEngines` covers every stage.
pub fn model_catalog_path() -> Option<String> {
    std::env::var("DALSTON_MODEL_CATALOG_PATH").ok().filter(|s| !s.is_empty())
}
