// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage-named task graph assembled before engine ids are minted into
//! `TaskId`s — the shape §4.4 describes as "default / diarize /
//! per-channel".

use dalston_core::id::EngineId;
use std::collections::HashMap;

/// One not-yet-persisted task, addressed by its stage name rather than a
/// `TaskId` — dependencies are wired by name and resolved to ids once the
/// full shape is finalized (see [`crate::builder::build_task_dag`]).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub stage: String,
    pub engine_id: EngineId,
    pub dependencies: Vec<String>,
    pub config: HashMap<String, serde_json::Value>,
    pub required: bool,
}

impl TaskSpec {
    pub fn new(stage: impl Into<String>, engine_id: EngineId) -> Self {
        Self { stage: stage.into(), engine_id, dependencies: Vec::new(), config: HashMap::new(), required: true }
    }

    pub fn depends_on(mut self, stage: impl Into<String>) -> Self {
        self.dependencies.push(stage.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// An ordered, stage-named task graph under construction.
#[derive(Debug, Clone, Default)]
pub struct PipelineShape {
    tasks: Vec<TaskSpec>,
}

impl PipelineShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: TaskSpec) -> &mut Self {
        self.tasks.push(spec);
        self
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<TaskSpec> {
        self.tasks
    }

    /// Every stage with no pre-merge successor, used to wire `merge`'s
    /// dependency set (§4.4: "`merge` always depends on `prepare` plus
    /// every terminal pre-merge task").
    pub fn terminal_stages_before(&self, excluding: &str) -> Vec<String> {
        let depended_on: std::collections::HashSet<&str> =
            self.tasks.iter().filter(|t| t.stage != excluding).flat_map(|t| t.dependencies.iter().map(String::as_str)).collect();
        self.tasks
            .iter()
            .filter(|t| t.stage != excluding && !depended_on.contains(t.stage.as_str()))
            .map(|t| t.stage.clone())
            .collect()
    }

    /// Extension seam for inserting a stage between two existing stages,
    /// rewiring `after` to depend on the new stage instead of `before`
    /// directly. Exposed for a future PII pipeline (`pii_detect_ch{N}`,
    /// `audio_redact_ch{N}`) per §4.4; no caller wires a concrete stage
    /// through this yet since no dependency shape for PII stages is
    /// documented anywhere in the system this was modeled on.
    pub fn insert_between(&mut self, before: &str, after: &str, mut new_stage: TaskSpec) {
        if !new_stage.dependencies.iter().any(|d| d == before) {
            new_stage.dependencies.push(before.to_string());
        }
        for task in self.tasks.iter_mut() {
            if task.stage == after {
                for dep in task.dependencies.iter_mut() {
                    if dep == before {
                        *dep = new_stage.stage.clone();
                    }
                }
            }
        }
        self.tasks.push(new_stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(name: &str) -> EngineId {
        EngineId::new(name)
    }

    #[test]
    fn terminal_stages_before_merge_excludes_depended_on_stages() {
        let mut shape = PipelineShape::new();
        shape.push(TaskSpec::new("prepare", engine("dalston-prepare")));
        shape.push(TaskSpec::new("transcribe", engine("faster-whisper")).depends_on("prepare"));
        shape.push(TaskSpec::new("align", engine("whisperx-align")).depends_on("transcribe"));
        shape.push(TaskSpec::new("merge", engine("dalston-merge")).depends_on("prepare").depends_on("align"));

        let mut terminal = shape.terminal_stages_before("merge");
        terminal.sort();
        assert_eq!(terminal, vec!["align".to_string(), "prepare".to_string()]);
    }

    #[test]
    fn insert_between_rewires_the_successor_without_touching_unrelated_edges() {
        let mut shape = PipelineShape::new();
        shape.push(TaskSpec::new("align_ch0", engine("whisperx-align")).depends_on("transcribe_ch0"));
        shape.push(TaskSpec::new("merge", engine("dalston-merge")).depends_on("align_ch0").depends_on("prepare"));

        shape.insert_between(
            "align_ch0",
            "merge",
            TaskSpec::new("pii_detect_ch0", engine("pii-detector")),
        );

        let merge = shape.tasks().iter().find(|t| t.stage == "merge").unwrap();
        assert!(merge.dependencies.contains(&"pii_detect_ch0".to_string()));
        assert!(!merge.dependencies.contains(&"align_ch0".to_string()));
        assert!(merge.dependencies.contains(&"prepare".to_string()));

        let pii = shape.tasks().iter().find(|t| t.stage == "pii_detect_ch0").unwrap();
        assert_eq!(pii.dependencies, vec!["align_ch0".to_string()]);
    }
}
