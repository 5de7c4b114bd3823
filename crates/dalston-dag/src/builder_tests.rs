use super::*;
use dalston_core::task::TaskStatus;

fn empty_catalog() -> ModelCatalog {
    ModelCatalog::new(Vec::new())
}

fn stage(tasks: &[Task], name: &str) -> Task {
    tasks.iter().find(|t| t.stage == name).cloned().unwrap_or_else(|| panic!("missing stage {name}"))
}

fn base_inputs() -> DagInputs {
    DagInputs {
        model_id: "faster-whisper-large-v3".to_string(),
        timestamps_granularity: TimestampGranularity::Word,
        speaker_detection: SpeakerDetection::None,
        channel_count: 1,
        speaker_hints: SpeakerHints::default(),
        diarize_required: true,
        live_capabilities: HashMap::new(),
    }
}

#[test]
fn happy_path_word_timestamps_produces_four_tasks() {
    let job_id = JobId::new();
    let tasks = build_task_dag(job_id, &base_inputs(), &empty_catalog(), &DefaultEngines::default()).unwrap();

    let mut stages: Vec<&str> = tasks.iter().map(|t| t.stage.as_str()).collect();
    stages.sort();
    assert_eq!(stages, vec!["align", "merge", "prepare", "transcribe"]);

    let merge = stage(&tasks, "merge");
    assert_eq!(merge.dependencies.len(), 2);
    assert!(merge.dependencies.contains(&stage(&tasks, "prepare").id));
    assert!(merge.dependencies.contains(&stage(&tasks, "align").id));

    for task in &tasks {
        assert_eq!(task.job_id, job_id);
        assert_eq!(task.status, TaskStatus::Pending);
    }
}

#[test]
fn native_word_timestamp_engine_skips_align_stage() {
    let catalog = ModelCatalog::new(vec![crate::catalog::CatalogEntry {
        model_id: "whisperx-large-v3".to_string(),
        aliases: vec![],
        runtime: EngineId::new("whisperx"),
        runtime_model_id: Some("large-v3".to_string()),
        native_word_timestamps: true,
        capabilities: ["transcribe".to_string()].into_iter().collect(),
    }]);
    let mut live = HashMap::new();
    live.insert(EngineId::new("whisperx"), ["transcribe".to_string()].into_iter().collect());

    let mut inputs = base_inputs();
    inputs.model_id = "whisperx-large-v3".to_string();
    inputs.live_capabilities = live;

    let tasks = build_task_dag(JobId::new(), &inputs, &catalog, &DefaultEngines::default()).unwrap();
    assert!(tasks.iter().all(|t| t.stage != "align"));
    assert_eq!(stage(&tasks, "transcribe").engine_id, EngineId::new("whisperx"));
}

#[test]
fn incapable_catalog_runtime_falls_back_to_default_engine() {
    let catalog = ModelCatalog::new(vec![crate::catalog::CatalogEntry {
        model_id: "faster-whisper-large-v3".to_string(),
        aliases: vec![],
        runtime: EngineId::new("faster-whisper"),
        runtime_model_id: Some("large-v3".to_string()),
        native_word_timestamps: false,
        capabilities: ["transcribe".to_string()].into_iter().collect(),
    }]);
    // No live capability snapshot entry for "faster-whisper" => not capable,
    // so the runtime_model_id carried by the catalog entry must not leak
    // into the fallback task's config.
    let tasks = build_task_dag(JobId::new(), &base_inputs(), &catalog, &DefaultEngines::default()).unwrap();
    let transcribe = stage(&tasks, "transcribe");
    assert_eq!(transcribe.engine_id, DefaultEngines::default().transcribe);
    assert!(transcribe.config.get("runtime_model_id").is_none());
}

#[test]
fn per_channel_stereo_produces_six_tasks_with_merge_depending_on_all_five() {
    let mut inputs = base_inputs();
    inputs.speaker_detection = SpeakerDetection::PerChannel;
    inputs.channel_count = 2;

    let tasks = build_task_dag(JobId::new(), &inputs, &empty_catalog(), &DefaultEngines::default()).unwrap();
    let mut stages: Vec<&str> = tasks.iter().map(|t| t.stage.as_str()).collect();
    stages.sort();
    assert_eq!(stages, vec!["align_ch0", "align_ch1", "merge", "prepare", "transcribe_ch0", "transcribe_ch1"]);

    let merge = stage(&tasks, "merge");
    assert_eq!(merge.dependencies.len(), 5);
    for predecessor in ["prepare", "transcribe_ch0", "transcribe_ch1", "align_ch0", "align_ch1"] {
        assert!(merge.dependencies.contains(&stage(&tasks, predecessor).id), "missing {predecessor}");
    }
}

#[test]
fn diarize_adds_parallel_task_carrying_speaker_hints() {
    let mut inputs = base_inputs();
    inputs.speaker_detection = SpeakerDetection::Diarize;
    inputs.diarize_required = false;
    inputs.speaker_hints = SpeakerHints { num_speakers: Some(2), min_speakers: None, max_speakers: None };

    let tasks = build_task_dag(JobId::new(), &inputs, &empty_catalog(), &DefaultEngines::default()).unwrap();
    let diarize = stage(&tasks, "diarize");
    assert!(!diarize.required);
    assert_eq!(diarize.config.get("num_speakers"), Some(&serde_json::Value::from(2)));
    assert_eq!(diarize.dependencies, vec![stage(&tasks, "prepare").id]);

    let merge = stage(&tasks, "merge");
    assert!(merge.dependencies.contains(&diarize.id));
}

#[test]
fn every_task_has_a_root_with_no_dependencies() {
    let tasks = build_task_dag(JobId::new(), &base_inputs(), &empty_catalog(), &DefaultEngines::default()).unwrap();
    assert!(tasks.iter().any(|t| t.dependencies.is_empty()));
}
