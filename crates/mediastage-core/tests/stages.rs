use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use mediastage_core::config::StageDirs;
use mediastage_core::gps::{GpsInterpolator, TrackPoint};
use mediastage_core::grouping::GroupMode;
use mediastage_core::metadata::MemoryMetadata;
use mediastage_core::{run_stage, MetadataPort, RunOutput, Settings, StageKind, StageRun, Tag, TagMap, TagValue};
use tempfile::tempdir;

const GROUP: &str = "2022-12-12@121212_TEST";
const STEM: &str = "2022-12-12@121212_test";

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    File::create(path).unwrap();
}

fn settings(kind: StageKind, source: &Path, destination: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.stages.insert(
        kind,
        StageDirs {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        },
    );
    settings
}

fn report(out: RunOutput) -> mediastage_core::StageReport {
    match out {
        RunOutput::Report(r) => r,
        other => panic!("unexpected output {:?}", other),
    }
}

fn all_tags() -> TagMap {
    TagMap::from([
        (Tag::Rating, TagValue::Integer(5)),
        (Tag::Date, TagValue::text("2022:12:12 12:12:12")),
        (Tag::Source, TagValue::text("P1210001.ORF")),
        (Tag::Description, TagValue::text(GROUP)),
    ])
}

/// `<src>/GROUP/STEM.jpg` plus `.ORF`, returning both paths.
fn tagged_pair(src: &Path, port: &MemoryMetadata, raw_tags: TagMap) -> (PathBuf, PathBuf) {
    let jpg = src.join(GROUP).join(format!("{}.jpg", STEM));
    let raw = src.join(GROUP).join(format!("{}.ORF", STEM));
    touch(&jpg);
    touch(&raw);
    port.write(&jpg, &all_tags(), true).unwrap();
    port.write(&raw, &raw_tags, true).unwrap();
    (jpg, raw)
}

#[test]
fn aggregation_transitions_complete_pair() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    let port = MemoryMetadata::new();
    tagged_pair(src.path(), &port, all_tags());

    let settings = settings(StageKind::Aggregate, src.path(), dst.path());
    let out = report(run_stage(StageRun::Aggregate, &settings, &port, false, None).unwrap());

    assert_eq!(out.succeeded.len(), 1);
    assert!(out.skipped.is_empty());
    assert_eq!(out.succeeded[0].to.len(), 2);
    assert!(dst.path().join(GROUP).join(format!("{}.jpg", STEM)).is_file());
    assert!(dst.path().join(GROUP).join(format!("{}.ORF", STEM)).is_file());
    assert!(!src.path().join(GROUP).exists());
}

#[test]
fn aggregation_skips_pair_with_missing_raw_rating() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    let port = MemoryMetadata::new();
    let mut raw_tags = all_tags();
    raw_tags.remove(&Tag::Rating);
    let (jpg, raw) = tagged_pair(src.path(), &port, raw_tags);

    let settings = settings(StageKind::Aggregate, src.path(), dst.path());
    let out = report(run_stage(StageRun::Aggregate, &settings, &port, false, None).unwrap());

    assert!(out.succeeded.is_empty());
    assert_eq!(out.skipped.len(), 1);
    assert!(out.skipped[0].reason.contains("missing rating"));
    assert!(jpg.is_file());
    assert!(raw.is_file());
    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
}

#[test]
fn grouped_transition_twice_moves_nothing_more() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    touch(&src.path().join(GROUP).join(format!("{}.jpg", STEM)));
    touch(&src.path().join(GROUP).join(format!("{}.ORF", STEM)));
    let port = MemoryMetadata::new();
    let settings = settings(StageKind::Group, src.path(), dst.path());

    let first = report(run_stage(StageRun::Group(GroupMode::Transition), &settings, &port, false, None).unwrap());
    let second = report(run_stage(StageRun::Group(GroupMode::Transition), &settings, &port, false, None).unwrap());

    assert_eq!(first.succeeded.len(), 1);
    assert_eq!(second.succeeded.len(), 0);
    assert_eq!(fs::read_dir(src.path()).unwrap().count(), 0);

    let moved = dst.path().join(GROUP).join(format!("{}.ORF", STEM));
    let tags = port.read(&[moved], &[Tag::Description]).unwrap();
    assert_eq!(tags.get(&Tag::Description), Some(&TagValue::text(GROUP)));
}

#[test]
fn grouped_transition_moves_live_photo_clip_too() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    touch(&src.path().join(GROUP).join("IMG_0001.JPG"));
    touch(&src.path().join(GROUP).join("IMG_0001.MOV"));
    let port = MemoryMetadata::new();
    let settings = settings(StageKind::Group, src.path(), dst.path());

    let out = report(run_stage(StageRun::Group(GroupMode::Transition), &settings, &port, false, None).unwrap());

    assert_eq!(out.succeeded.len(), 2);
    assert!(out.skipped.is_empty());
    assert!(dst.path().join(GROUP).join("IMG_0001.JPG").is_file());
    assert!(dst.path().join(GROUP).join("IMG_0001.MOV").is_file());
    assert_eq!(fs::read_dir(src.path()).unwrap().count(), 0);
}

#[test]
fn clustering_splits_on_four_hour_gap() {
    let root = tempdir().unwrap();
    for time in ["100000", "103000", "160000", "161000"] {
        touch(&root.path().join(format!("2023-01-01@{}_shot.jpg", time)));
    }
    let port = MemoryMetadata::new();
    let settings = settings(StageKind::Group, root.path(), root.path());

    let out = report(run_stage(StageRun::Group(GroupMode::Cluster), &settings, &port, false, None).unwrap());
    assert_eq!(out.succeeded.len(), 4);

    let mut groups: Vec<(String, usize)> = fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read_dir(&p).unwrap().count())
        })
        .collect();
    groups.sort();
    assert_eq!(groups, vec![
        ("TODO_2023-01-01@100000".to_string(), 2),
        ("TODO_2023-01-01@160000".to_string(), 2),
    ]);
}

#[test]
fn dry_run_reports_without_touching() {
    let src = tempdir().unwrap();
    let dst = tempdir().unwrap();
    let port = MemoryMetadata::new();
    let (jpg, _) = tagged_pair(src.path(), &port, all_tags());

    let settings = settings(StageKind::Rate, src.path(), dst.path());
    let out = report(run_stage(StageRun::Rate, &settings, &port, true, None).unwrap());

    assert!(out.dry_run);
    assert_eq!(out.succeeded.len(), 1);
    assert_eq!(out.succeeded[0].tags.get(&Tag::Rating), Some(&TagValue::Integer(5)));
    assert!(jpg.is_file());
    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
}

#[test]
fn gps_midpoint_between_neighbours() {
    let t = DateTime::parse_from_rfc3339("2023-06-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let point = |offset: i64, lat: f64, lon: f64, ele: f64| TrackPoint {
        time: t + Duration::seconds(offset),
        latitude: lat,
        longitude: lon,
        elevation: Some(ele),
    };
    let track = GpsInterpolator::new(vec![point(-30, 10.0, 20.0, 5.0), point(30, 12.0, 22.0, 7.0)]);

    let fix = track.fix_at(t, Duration::seconds(60)).unwrap();
    assert_eq!((fix.latitude, fix.longitude, fix.elevation), (11.0, 21.0, Some(6.0)));
}

#[test]
fn negative_elevation_survives_metadata_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.jpg");
    let port = MemoryMetadata::new();
    port.write(
        &path,
        &TagMap::from([(Tag::GpsElevation, TagValue::Decimal(-12.5))]),
        true,
    )
    .unwrap();
    let tags = port.read(&[path], &[Tag::GpsElevation]).unwrap();
    assert_eq!(tags.get(&Tag::GpsElevation), Some(&TagValue::Decimal(-12.5)));
}
