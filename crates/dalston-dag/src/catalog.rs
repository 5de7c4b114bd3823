// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model catalog: resolves a user-facing model id (alias or canonical) to
//! the runtime engine that serves it (§4.4).

use dalston_core::id::EngineId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One catalog-declared model. `model_id` is canonical; `aliases` are
/// additional spellings accepted from job parameters (e.g. a version-less
/// shorthand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub model_id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub runtime: EngineId,
    #[serde(default)]
    pub runtime_model_id: Option<String>,
    /// Engines that produce native word timestamps skip the `align` stage
    /// regardless of the requested granularity (§4.4).
    #[serde(default)]
    pub native_word_timestamps: bool,
    #[serde(default)]
    pub capabilities: HashSet<String>,
}

/// Lookup table from model id/alias to catalog entry. Construction is
/// infallible; duplicate aliases silently prefer the later entry, matching
/// the way a `HashMap` insert would behave if this were built by hand.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
    by_lookup: HashMap<String, usize>,
}

impl ModelCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut by_lookup = HashMap::new();
        for (index, entry) in entries.iter().enumerate() {
            by_lookup.insert(entry.model_id.clone(), index);
            for alias in &entry.aliases {
                by_lookup.insert(alias.clone(), index);
            }
        }
        Self { entries, by_lookup }
    }

    pub fn resolve(&self, model_id_or_alias: &str) -> Option<&CatalogEntry> {
        self.by_lookup.get(model_id_or_alias).map(|&index| &self.entries[index])
    }

    /// Every catalog-declared entry, used by callers that need to snapshot
    /// liveness for every runtime the catalog might resolve to (the
    /// scheduler builds `DagInputs::live_capabilities` this way) rather than
    /// just the one entry a particular job's `model_id` resolves to.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// True when `engine_id` has a live instance declaring every capability
    /// in `required`. Passed a snapshot rather than a registry handle so
    /// this crate stays free of any broker dependency — the scheduler
    /// assembles the snapshot from `dalston-registry` before calling into
    /// the DAG builder.
    pub fn capable(
        live_capabilities: &HashMap<EngineId, HashSet<String>>,
        engine_id: &EngineId,
        required: &HashSet<String>,
    ) -> bool {
        live_capabilities.get(engine_id).is_some_and(|caps| required.is_subset(caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelCatalog {
        ModelCatalog::new(vec![
            CatalogEntry {
                model_id: "faster-whisper-large-v3".into(),
                aliases: vec!["whisper-large".into()],
                runtime: EngineId::new("faster-whisper"),
                runtime_model_id: Some("large-v3".into()),
                native_word_timestamps: false,
                capabilities: ["transcribe".into()].into_iter().collect(),
            },
            CatalogEntry {
                model_id: "whisperx-large-v3".into(),
                aliases: vec![],
                runtime: EngineId::new("whisperx"),
                runtime_model_id: Some("large-v3".into()),
                native_word_timestamps: true,
                capabilities: ["transcribe".into(), "word_timestamps".into()].into_iter().collect(),
            },
        ])
    }

    #[test]
    fn resolves_canonical_id_and_alias_to_same_entry() {
        let catalog = sample();
        let by_canonical = catalog.resolve("faster-whisper-large-v3").unwrap();
        let by_alias = catalog.resolve("whisper-large").unwrap();
        assert_eq!(by_canonical.runtime, by_alias.runtime);
    }

    #[test]
    fn unknown_model_id_resolves_to_none() {
        assert!(sample().resolve("does-not-exist").is_none());
    }

    #[test]
    fn native_word_timestamp_engines_are_flagged() {
        let catalog = sample();
        assert!(!catalog.resolve("faster-whisper-large-v3").unwrap().native_word_timestamps);
        assert!(catalog.resolve("whisperx-large-v3").unwrap().native_word_timestamps);
    }

    #[test]
    fn capable_requires_full_capability_subset() {
        let mut live: HashMap<EngineId, HashSet<String>> = HashMap::new();
        live.insert(EngineId::new("faster-whisper"), ["transcribe".into()].into_iter().collect());
        let needed: HashSet<String> = ["transcribe".into(), "word_timestamps".into()].into_iter().collect();
        assert!(!ModelCatalog::capable(&live, &EngineId::new("faster-whisper"), &needed));
        assert!(ModelCatalog::capable(
            &live,
            &EngineId::new("faster-whisper"),
            &["transcribe".into()].into_iter().collect()
        ));
    }
}
