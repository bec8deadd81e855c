//! Tests for the JSON anchor repository and record filtering

use anchor_overlay::records::{
    playable_records, AnchorRecord, AnchorRepository, Color, GeoPosition, JsonFileRepository,
    VideoParams,
};
use tempfile::TempDir;

use crate::test_utils::playable_record;

#[test]
fn test_missing_file_loads_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut repository = JsonFileRepository::new(temp_dir.path().join("anchors.json"));
    assert!(repository.load().expect("Load failed").is_empty());
}

#[test]
fn test_save_upserts_and_remove_deletes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("nested").join("anchors.json");
    let mut repository = JsonFileRepository::new(&path);

    let mut record = playable_record("a");
    record.video_params = Some(VideoParams::new(Color::new(0.1, 0.9, 0.2), 0.3, false));
    repository.save(record.clone()).expect("Save failed");
    repository.save(playable_record("b")).expect("Save failed");

    record.scaling_factor = 2.5;
    repository.save(record.clone()).expect("Upsert failed");

    let loaded = repository.load().expect("Load failed");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], record);

    repository.remove("b").expect("Remove failed");
    repository.remove("unknown").expect("Removing an absent id is fine");
    let loaded = repository.load().expect("Load failed");
    assert_eq!(loaded, vec![record]);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn test_document_uses_flat_snake_case_layout() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("anchors.json");
    std::fs::write(
        &path,
        r#"[{
            "id": "ua-1",
            "name": "Grand Hall",
            "video_name": "hall.mp4",
            "enabled": true,
            "scaling_factor": 1.5,
            "latitude": 59.9,
            "longitude": 30.3,
            "video_params": [0.0, 1.0, 0.0, 0.42]
        }]"#,
    )
    .expect("Failed to write document");

    let mut repository = JsonFileRepository::new(&path);
    let loaded = repository.load().expect("Load failed");
    assert_eq!(loaded.len(), 1);
    let record = &loaded[0];
    assert_eq!(record.anchor_id, "ua-1");
    assert_eq!(record.video_ref, "hall.mp4");
    assert_eq!(
        record.geo_position,
        Some(GeoPosition {
            latitude: 59.9,
            longitude: 30.3
        })
    );
    assert_eq!(record.video_params.map(|p| p.key_color), Some(Color::GREEN));
    assert!(record.description.is_none());
    assert!(record.image_ref.is_none());
}

#[test]
fn test_malformed_document_is_a_repository_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("anchors.json");
    std::fs::write(&path, "{ not json").expect("Failed to write document");

    let mut repository = JsonFileRepository::new(&path);
    crate::assert_error_contains!(repository.load(), "Malformed anchor document");
}

#[test]
fn test_playable_filter_keeps_order_and_first_duplicate() {
    let mut disabled = playable_record("off");
    disabled.enabled = false;
    let mut duplicate = playable_record("a");
    duplicate.name = "Second".to_string();

    let (order, by_id) = playable_records(vec![
        playable_record("a"),
        disabled,
        AnchorRecord::hosted("fresh", None),
        playable_record("b"),
        duplicate,
    ]);

    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(by_id["a"].name, "Exhibit a");
    assert!(!by_id.contains_key("off"));
    assert!(!by_id.contains_key("fresh"));
}
