use soarm_config::{CalibrationProfile, JointRanges, ProfileStore, VoltageClass};

fn calibrated() -> CalibrationProfile {
    let mut p = CalibrationProfile::default_for("so-100", "lab-a", VoltageClass::V12);
    p.joint_offsets = [0.0, -5.0, 10.0, 0.0, 0.0, -50.0];
    p.joint_ranges = Some(JointRanges {
        min: [-45.0, -90.0, -80.0, -100.0, -170.0, 0.0],
        max: [45.0, 100.0, 60.0, 100.0, 170.0, 100.0],
        middle: [0.0, 5.0, -10.0, 0.0, 0.0, 50.0],
    });
    p
}

#[test]
fn missing_profile_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    assert!(store.load("so-100", "nobody").unwrap().is_none());
}

#[test]
fn saved_profile_loads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path().join("nested"));
    let p = calibrated();
    let path = store.save(&p).unwrap();
    assert_eq!(path, store.path_for("so-100", "lab-a"));
    assert!(!path.with_extension("new").exists());

    let back = store.load("so-100", "lab-a").unwrap().unwrap();
    assert_eq!(back, p);
}

#[test]
fn saved_file_is_version_two_degrees() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let path = store.save(&calibrated()).unwrap();
    let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(v["profile_version"], 2);
    assert_eq!(v["voltage_class"], "12V");
    assert_eq!(v["joint_offsets"][5], -50.0);
    assert_eq!(v["pid_gains"][0]["d_gain"], 32);
}

#[test]
fn invalid_ranges_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    let mut p = calibrated();
    if let Some(r) = p.joint_ranges.as_mut() {
        r.min[2] = 90.0;
    }
    assert!(store.save(&p).is_err());
    assert!(!store.path_for("so-100", "lab-a").exists());
}

#[test]
fn key_characters_are_sanitized() {
    let store = ProfileStore::new("/tmp/x");
    let path = store.path_for("so-100", "../etc/passwd");
    assert_eq!(path.parent(), Some(std::path::Path::new("/tmp/x")));
}

#[test]
fn legacy_radian_profile_is_converted_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::new(dir.path());
    std::fs::write(
        store.path_for("so-100", "old"),
        r#"{"joint_offsets": [0.0, 0.7853981633974483, 0, 0, 0, 0], "servos_voltage": 6.0}"#,
    )
    .unwrap();
    let p = store.load("so-100", "old").unwrap().unwrap();
    assert!((p.joint_offsets[1] - 45.0).abs() < 1e-9);
    assert_eq!(p.model, "so-100");
    assert_eq!(p.serial_id, "old");
    assert_eq!(p.voltage_class, VoltageClass::V6);
}
