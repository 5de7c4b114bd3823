// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle event envelope carried on both event-bus transports (§4.3).

use chrono::{DateTime, Utc};
use dalston_core::id::{JobId, TaskId};
use serde::{Deserialize, Serialize};

/// A lifecycle event. Serializes as `{"type": "job.created", ...fields}`;
/// unrecognized variants are a deserialization error rather than silently
/// absorbed, since a broker that can't name its payload would make
/// idempotent handling impossible.
///
/// The event types reaching the durable stream (§4.3) are exactly the
/// crash-critical subset named in the distilled spec: `JobCreated`,
/// `TaskStarted`, `TaskCompleted`, `TaskFailed`, `JobCancelRequested`,
/// `JobCompleted`, `JobFailed`, `JobCancelled`. Every variant below is
/// eligible for the durable stream; the fan-out pub/sub channel carries
/// all of them as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "job.created")]
    JobCreated {
        job_id: JobId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "task.started")]
    TaskStarted {
        task_id: TaskId,
        job_id: JobId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "task.completed")]
    TaskCompleted {
        task_id: TaskId,
        job_id: JobId,
        output_uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "task.failed")]
    TaskFailed {
        task_id: TaskId,
        job_id: JobId,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "job.cancel_requested")]
    JobCancelRequested {
        job_id: JobId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "job.completed")]
    JobCompleted {
        job_id: JobId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: JobId,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename = "job.cancelled")]
    JobCancelled {
        job_id: JobId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl Event {
    /// The `type` tag this event serializes under, used as the event name
    /// when appending to the fan-out channel or the durable stream.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job.created",
            Self::TaskStarted { .. } => "task.started",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskFailed { .. } => "task.failed",
            Self::JobCancelRequested { .. } => "job.cancel_requested",
            Self::JobCompleted { .. } => "job.completed",
            Self::JobFailed { .. } => "job.failed",
            Self::JobCancelled { .. } => "job.cancelled",
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobCreated { job_id, .. }
            | Self::TaskStarted { job_id, .. }
            | Self::TaskCompleted { job_id, .. }
            | Self::TaskFailed { job_id, .. }
            | Self::JobCancelRequested { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. } => *job_id,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::JobCreated { request_id, .. }
            | Self::TaskStarted { request_id, .. }
            | Self::TaskCompleted { request_id, .. }
            | Self::TaskFailed { request_id, .. }
            | Self::JobCancelRequested { request_id, .. }
            | Self::JobCompleted { request_id, .. }
            | Self::JobFailed { request_id, .. }
            | Self::JobCancelled { request_id, .. } => request_id.as_deref(),
        }
    }

    /// Every event type named in §4.3 as crash-critical. All current
    /// variants qualify; kept as an explicit predicate (rather than "always
    /// true") so a future non-critical event type has somewhere to opt out.
    pub fn is_durable(&self) -> bool {
        true
    }
}

/// An entry in the durable event stream: the event plus the broker-assigned
/// stream entry id, used by the reader to ACK after a handler completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableEvent {
    pub stream_id: String,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_created_round_trips_with_type_tag() {
        let event = Event::JobCreated { job_id: JobId::new(), request_id: Some("req-1".into()) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job.created");
        assert_eq!(json["request_id"], "req-1");
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn request_id_omitted_when_none() {
        let event = Event::JobCompleted { job_id: JobId::new(), request_id: None };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("request_id").is_none());
    }

    #[test]
    fn type_tag_matches_serialized_discriminant() {
        let event = Event::TaskFailed {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            error: "boom".into(),
            request_id: None,
        };
        assert_eq!(event.type_tag(), "task.failed");
    }
}
