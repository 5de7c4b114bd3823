// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types for jobs, tasks, and engine instances.
//!
//! `JobId`/`TaskId` wrap a UUID, matching the persisted schema's primary
//! keys. `EngineId`/`InstanceId` wrap an opaque string, since engine ids
//! are operator-assigned logical names (`faster-whisper`,
//! `whisperx-align`) rather than generated identifiers.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Define a newtype ID wrapper around [`Uuid`].
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id! {
    /// Identifies a batch transcription job.
    pub struct JobId;
}

define_uuid_id! {
    /// Identifies a single task within a job's DAG.
    pub struct TaskId;
}

/// Identifies a logical engine (a worker role, e.g. `faster-whisper`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub String);

impl EngineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EngineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EngineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for EngineId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl Borrow<str> for EngineId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identifies a single live process of an engine: `{engine_id}-{random}`.
///
/// Distinct from `EngineId` so that liveness can be scoped per-instance —
/// see `dalston-registry` and DESIGN.md's Open Question #1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// Mint a new instance id for the given logical engine.
    pub fn new(engine_id: &EngineId) -> Self {
        Self(format!("{}-{}", engine_id.as_str(), nanoid::nanoid!(8)))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical engine id this instance belongs to, recovered from the
    /// `{engine_id}-{suffix}` format.
    pub fn engine_id(&self) -> EngineId {
        match self.0.rsplit_once('-') {
            Some((prefix, _suffix)) => EngineId::new(prefix),
            None => EngineId::new(self.0.as_str()),
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
