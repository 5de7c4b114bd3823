use super::*;

#[test]
fn job_id_roundtrips_through_uuid_string() {
    let id = JobId::new();
    let parsed: JobId = id.to_string().parse().unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn instance_id_recovers_engine_id() {
    let engine = EngineId::new("faster-whisper");
    let instance = InstanceId::new(&engine);
    assert!(instance.as_str().starts_with("faster-whisper-"));
    assert_eq!(instance.engine_id(), engine);
}

#[test]
fn distinct_instances_of_same_engine_are_unique() {
    let engine = EngineId::new("whisperx-align");
    let a = InstanceId::new(&engine);
    let b = InstanceId::new(&engine);
    assert_ne!(a, b);
    assert_eq!(a.engine_id(), b.engine_id());
}

#[test]
fn engine_id_without_dash_recovers_itself() {
    let instance = InstanceId::from_string("solo");
    assert_eq!(instance.engine_id(), EngineId::new("solo"));
}
