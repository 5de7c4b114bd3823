// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translates a job's parameters into a task DAG (§4.4).

use crate::catalog::ModelCatalog;
use crate::pipeline::{PipelineShape, TaskSpec};
use dalston_core::id::{EngineId, JobId, TaskId};
use dalston_core::task::{Task, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("no dependency-free task in built dag for job {0}")]
    NoRootTask(JobId),
    #[error("task spec for stage '{stage}' depends on unknown stage '{missing}'")]
    DanglingDependency { stage: String, missing: String },
}

/// How precise word/segment timing must be (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampGranularity {
    Word,
    Segment,
    None,
}

/// Speaker-attribution mode (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerDetection {
    None,
    Diarize,
    PerChannel,
}

/// Hardcoded engine ids used when catalog/capability-driven selection can't
/// be satisfied (§4.4 "Fallback").
#[derive(Debug, Clone)]
pub struct DefaultEngines {
    pub prepare: EngineId,
    pub transcribe: EngineId,
    pub align: EngineId,
    pub diarize: EngineId,
    pub merge: EngineId,
}

impl Default for DefaultEngines {
    fn default() -> Self {
        Self {
            prepare: EngineId::new("dalston-prepare"),
            transcribe: EngineId::new("faster-whisper"),
            align: EngineId::new("whisperx-align"),
            diarize: EngineId::new("pyannote-diarize"),
            merge: EngineId::new("dalston-merge"),
        }
    }
}

/// Speaker-count hints folded into the `diarize` task's config.
#[derive(Debug, Clone, Default)]
pub struct SpeakerHints {
    pub num_speakers: Option<u32>,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,
}

/// Decision inputs for building a job's DAG (§4.4).
#[derive(Debug, Clone)]
pub struct DagInputs {
    pub model_id: String,
    pub timestamps_granularity: TimestampGranularity,
    pub speaker_detection: SpeakerDetection,
    pub channel_count: u32,
    pub speaker_hints: SpeakerHints,
    /// Whether a `diarize` task failure should fail the job (§8 scenario 4
    /// exercises `required = false`); default `true`.
    pub diarize_required: bool,
    /// Capability the catalog must declare for a transcribe engine to be
    /// selected; `word_timestamps` only matters when granularity is `word`.
    pub live_capabilities: HashMap<EngineId, HashSet<String>>,
}

/// Resolve the transcribe engine for `model_id`: prefer the catalog entry if
/// its runtime is live and capable, else fall back to the hardcoded default
/// (§4.4 "Fallback").
fn resolve_transcribe(catalog: &ModelCatalog, model_id: &str, defaults: &DefaultEngines, live: &HashMap<EngineId, HashSet<String>>) -> (EngineId, Option<String>, bool) {
    let required: HashSet<String> = ["transcribe".to_string()].into_iter().collect();
    if let Some(entry) = catalog.resolve(model_id) {
        if ModelCatalog::capable(live, &entry.runtime, &required) {
            return (entry.runtime.clone(), entry.runtime_model_id.clone(), entry.native_word_timestamps);
        }
    }
    (defaults.transcribe.clone(), None, false)
}

/// Build the task DAG for a job, returning tasks with real `TaskId`s and
/// resolved `dependencies` (§4.4).
pub fn build_task_dag(job_id: JobId, inputs: &DagInputs, catalog: &ModelCatalog, defaults: &DefaultEngines) -> Result<Vec<Task>, DagError> {
    let mut shape = PipelineShape::new();
    shape.push(TaskSpec::new("prepare", defaults.prepare.clone()).config(
        "split_channels",
        serde_json::Value::Bool(matches!(inputs.speaker_detection, SpeakerDetection::PerChannel)),
    ));

    let (transcribe_engine, runtime_model_id, native_word_timestamps) =
        resolve_transcribe(catalog, &inputs.model_id, defaults, &inputs.live_capabilities);

    let wants_align = matches!(inputs.timestamps_granularity, TimestampGranularity::Word) && !native_word_timestamps;

    let mut transcribe_config = HashMap::new();
    if let Some(model_id) = &runtime_model_id {
        transcribe_config.insert("runtime_model_id".to_string(), serde_json::Value::String(model_id.clone()));
    }

    // Stages `merge` must depend on beyond `prepare`. For the per-channel
    // shape this is every channel's transcribe *and* align task (§8
    // scenario 2: "merge depends on all five predecessors") since merge's
    // input resolution pulls the per-channel transcribe output directly in
    // addition to the aligned one. For the default/diarize shape it is only
    // each branch's terminal task (align-or-transcribe, and diarize),
    // matching §4.4's "every terminal pre-merge task in the graph".
    let mut merge_deps = Vec::new();

    match inputs.speaker_detection {
        SpeakerDetection::PerChannel => {
            for channel in 0..inputs.channel_count {
                let transcribe_stage = format!("transcribe_ch{channel}");
                shape.push(
                    TaskSpec { stage: transcribe_stage.clone(), engine_id: transcribe_engine.clone(), dependencies: vec!["prepare".to_string()], config: transcribe_config.clone(), required: true },
                );
                merge_deps.push(transcribe_stage.clone());
                if wants_align {
                    let align_stage = format!("align_ch{channel}");
                    shape.push(TaskSpec::new(align_stage.clone(), defaults.align.clone()).depends_on(transcribe_stage));
                    merge_deps.push(align_stage);
                }
            }
        }
        SpeakerDetection::None | SpeakerDetection::Diarize => {
            shape.push(TaskSpec { stage: "transcribe".to_string(), engine_id: transcribe_engine, dependencies: vec!["prepare".to_string()], config: transcribe_config, required: true });
            if wants_align {
                shape.push(TaskSpec::new("align", defaults.align.clone()).depends_on("transcribe"));
                merge_deps.push("align".to_string());
            } else {
                merge_deps.push("transcribe".to_string());
            }
            if matches!(inputs.speaker_detection, SpeakerDetection::Diarize) {
                let mut diarize = TaskSpec::new("diarize", defaults.diarize.clone()).depends_on("prepare").required(inputs.diarize_required);
                if let Some(n) = inputs.speaker_hints.num_speakers {
                    diarize = diarize.config("num_speakers", serde_json::Value::from(n));
                }
                if let Some(n) = inputs.speaker_hints.min_speakers {
                    diarize = diarize.config("min_speakers", serde_json::Value::from(n));
                }
                if let Some(n) = inputs.speaker_hints.max_speakers {
                    diarize = diarize.config("max_speakers", serde_json::Value::from(n));
                }
                shape.push(diarize);
                merge_deps.push("diarize".to_string());
            }
        }
    }

    let mut merge = TaskSpec::new("merge", defaults.merge.clone()).depends_on("prepare");
    for stage in merge_deps {
        merge = merge.depends_on(stage);
    }
    shape.push(merge);

    finalize(job_id, shape)
}

/// Resolve stage-name dependencies into `TaskId`s and mint the final
/// persisted `Task` rows.
fn finalize(job_id: JobId, shape: PipelineShape) -> Result<Vec<Task>, DagError> {
    let specs = shape.into_tasks();
    let mut ids: HashMap<String, TaskId> = HashMap::new();
    for spec in &specs {
        ids.insert(spec.stage.clone(), TaskId::new());
    }

    let mut tasks = Vec::with_capacity(specs.len());
    for spec in specs {
        let mut dependencies = Vec::with_capacity(spec.dependencies.len());
        for dep_stage in &spec.dependencies {
            let dep_id = ids.get(dep_stage).ok_or_else(|| DagError::DanglingDependency {
                stage: spec.stage.clone(),
                missing: dep_stage.clone(),
            })?;
            dependencies.push(*dep_id);
        }
        tasks.push(Task {
            id: ids[&spec.stage],
            job_id,
            stage: spec.stage,
            engine_id: spec.engine_id,
            status: TaskStatus::Pending,
            dependencies,
            config: spec.config,
            input_uri: None,
            output_uri: None,
            retries: 0,
            max_retries: 2,
            required: spec.required,
            error: None,
            started_at: None,
            completed_at: None,
        });
    }

    if tasks.iter().all(|t| !t.dependencies.is_empty()) {
        return Err(DagError::NoRootTask(job_id));
    }
    Ok(tasks)
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
