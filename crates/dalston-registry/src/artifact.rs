// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-storage-backed artifact existence/IO, used by the scheduler to
//! write task input pointers and by the reconciler to check whether an
//! orphaned task's output actually landed (§4.5, §4.7 step 2).

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as _;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("object store error: {0}")]
    Backend(#[from] object_store::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Whether a storage lookup found the artifact, found nothing, or hit a
/// transient failure. The reconciler's orphan-detection step (§4.7 step 2)
/// treats these three outcomes differently: present -> resolve completed,
/// absent -> resolve failed, transient -> skip and retry next sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactLookup {
    Present,
    Absent,
    Transient,
}

/// Backend-agnostic artifact store: the reconciler's "does the output
/// exist" check and the scheduler's "write the input pointer" step both go
/// through this trait rather than talking to `object_store` directly.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write a small JSON pointer (the task's `previous_outputs` plus audio
    /// metadata) to `uri` and return that same `uri` as the task's
    /// `input_uri` (§4.5: "Enqueue writes the task's input artifact...").
    async fn write_json(&self, uri: &str, value: &serde_json::Value) -> Result<(), ArtifactError>;

    async fn read_json(&self, uri: &str) -> Result<serde_json::Value, ArtifactError>;

    /// Check for the presence of an expected output artifact without
    /// reading it (§4.7 step 2).
    async fn lookup(&self, uri: &str) -> ArtifactLookup;

    /// Best-effort delete, used by `delete_job` (§6) to purge a terminal
    /// job's artifacts. A missing object is not an error.
    async fn delete(&self, uri: &str) -> Result<(), ArtifactError>;
}

/// Splits a `scheme://bucket/key...` uri into the path portion
/// `object_store` expects (it owns bucket/credential config separately).
fn object_path(uri: &str) -> ObjectPath {
    let after_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    let key = after_scheme.split_once('/').map(|(_, key)| key).unwrap_or(after_scheme);
    ObjectPath::from(key)
}

pub struct S3ArtifactStore {
    store: Arc<dyn object_store::ObjectStore>,
}

impl S3ArtifactStore {
    pub fn new(store: Arc<dyn object_store::ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn write_json(&self, uri: &str, value: &serde_json::Value) -> Result<(), ArtifactError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.put(&object_path(uri), bytes.into()).await?;
        Ok(())
    }

    async fn read_json(&self, uri: &str) -> Result<serde_json::Value, ArtifactError> {
        let result = self.store.get(&object_path(uri)).await?;
        let bytes = result.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn lookup(&self, uri: &str) -> ArtifactLookup {
        match self.store.head(&object_path(uri)).await {
            Ok(_) => ArtifactLookup::Present,
            Err(object_store::Error::NotFound { .. }) => ArtifactLookup::Absent,
            Err(_) => ArtifactLookup::Transient,
        }
    }

    async fn delete(&self, uri: &str) -> Result<(), ArtifactError> {
        match self.store.delete(&object_path(uri)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc as StdArc;

    /// In-memory artifact store for unit tests.
    #[derive(Clone, Default)]
    pub struct FakeArtifactStore {
        objects: StdArc<Mutex<HashMap<String, serde_json::Value>>>,
        /// URIs that should report a transient lookup failure instead of a
        /// real answer, for testing the reconciler's "keep skipping" path.
        transient: StdArc<Mutex<std::collections::HashSet<String>>>,
    }

    impl FakeArtifactStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, uri: &str, value: serde_json::Value) {
            self.objects.lock().insert(uri.to_string(), value);
        }

        pub fn fail_transiently(&self, uri: &str) {
            self.transient.lock().insert(uri.to_string());
        }
    }

    #[async_trait]
    impl ArtifactStore for FakeArtifactStore {
        async fn write_json(&self, uri: &str, value: &serde_json::Value) -> Result<(), ArtifactError> {
            self.objects.lock().insert(uri.to_string(), value.clone());
            Ok(())
        }

        async fn read_json(&self, uri: &str) -> Result<serde_json::Value, ArtifactError> {
            self.objects
                .lock()
                .get(uri)
                .cloned()
                .ok_or_else(|| ArtifactError::Backend(object_store::Error::NotFound { path: uri.into(), source: "missing".into() }))
        }

        async fn lookup(&self, uri: &str) -> ArtifactLookup {
            if self.transient.lock().contains(uri) {
                return ArtifactLookup::Transient;
            }
            if self.objects.lock().contains_key(uri) {
                ArtifactLookup::Present
            } else {
                ArtifactLookup::Absent
            }
        }

        async fn delete(&self, uri: &str) -> Result<(), ArtifactError> {
            self.objects.lock().remove(uri);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_strips_scheme_and_bucket() {
        assert_eq!(object_path("s3://bucket/a/b.json").as_ref(), "a/b.json");
        assert_eq!(object_path("tasks/a/b.json").as_ref(), "a/b.json");
    }

    #[tokio::test]
    async fn fake_store_round_trips_write_and_lookup() {
        let store = fake::FakeArtifactStore::new();
        assert_eq!(store.lookup("s3://bucket/out.json").await, ArtifactLookup::Absent);
        store.write_json("s3://bucket/out.json", &serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(store.lookup("s3://bucket/out.json").await, ArtifactLookup::Present);
        let value = store.read_json("s3://bucket/out.json").await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn transient_lookup_is_distinct_from_absent() {
        let store = fake::FakeArtifactStore::new();
        store.fail_transiently("s3://bucket/flaky.json");
        assert_eq!(store.lookup("s3://bucket/flaky.json").await, ArtifactLookup::Transient);
    }
}
