//! Batch Tests
//!
//! Tests verify:
//! - Replaced entries get fresh aligned spans, untouched entries keep theirs
//! - Metadata of replaced entries is stamped with name, time and size
//! - Both rebuild strategies produce the same archive
//! - A failing batch leaves the archive byte-for-byte unchanged
//! - Replacement by file name matches entries and reports leftovers

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use afspack::{AfsError, Config, Container, RebuildStrategy, Timestamp};

use crate::support::{
    build_archive_with_config, pattern, reference_archive, setup_temp_dir, snapshot_entries,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn write_input(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

fn in_place_config() -> Config {
    Config::builder()
        .rebuild_strategy(RebuildStrategy::InPlace)
        .build()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_batch_replaces_selected_entries() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let before = snapshot_entries(&afs);

    let grown = pattern(5000, 90);
    let shrunk = pattern(10, 91);
    let mut batch = BTreeMap::new();
    batch.insert(0, write_input(&dir, "grown.bin", &grown));
    batch.insert(2, write_input(&dir, "shrunk.bin", &shrunk));
    afs.replace_many(&batch).unwrap();

    assert_eq!(afs.extract_to_buffer(0).unwrap().as_ref(), &grown[..]);
    assert_eq!(afs.extract_to_buffer(1).unwrap().as_ref(), &before[1][..]);
    assert_eq!(afs.extract_to_buffer(2).unwrap().as_ref(), &shrunk[..]);

    // 0: 6144 (grown), 1: 2048 (kept), 2: 2048 (shrunk)
    assert_eq!(afs.entry_info(0).unwrap().offset, 2048);
    assert_eq!(afs.entry_info(1).unwrap().offset, 8192);
    assert_eq!(afs.entry_info(2).unwrap().offset, 10240);
    assert_eq!(afs.entry_table().metadata_slot().offset, 12288);
    assert_eq!(fs::metadata(&path).unwrap().len(), 12288 + 2048);
    drop(afs);

    let afs = Container::open(&path).unwrap();
    assert_eq!(afs.extract_to_buffer(0).unwrap().as_ref(), &grown[..]);
    assert_eq!(afs.extract_to_buffer(1).unwrap().as_ref(), &before[1][..]);
    assert_eq!(afs.extract_to_buffer(2).unwrap().as_ref(), &shrunk[..]);
}

#[test]
fn test_batch_stamps_metadata() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let kept = afs.metadata(1).unwrap();
    let started = Timestamp::now();

    let mut batch = BTreeMap::new();
    batch.insert(0, write_input(&dir, "new_name.dat", &pattern(321, 0)));
    afs.replace_many(&batch).unwrap();
    drop(afs);

    let afs = Container::open(&path).unwrap();
    let meta = afs.metadata(0).unwrap();
    assert_eq!(meta.filename, "new_name.dat");
    assert_eq!(meta.filesize, 321);
    assert!(meta.last_modified >= started);
    assert_eq!(afs.metadata(1).unwrap(), kept);
}

#[test]
fn test_batch_strategies_agree() {
    let (_temp, dir) = setup_temp_dir();
    let staged_path = dir.join("staged.afs");
    let in_place_path = dir.join("in_place.afs");
    let sizes = [100, 3000, 50, 7000];

    let mut staged = build_archive_with_config(&staged_path, &sizes, Config::default());
    let mut in_place = build_archive_with_config(&in_place_path, &sizes, in_place_config());

    let mut batch = BTreeMap::new();
    batch.insert(1, write_input(&dir, "a.bin", &pattern(10, 1)));
    batch.insert(2, write_input(&dir, "b.bin", &pattern(9000, 2)));
    staged.replace_many(&batch).unwrap();
    in_place.replace_many(&batch).unwrap();

    assert_eq!(staged.entry_table(), in_place.entry_table());
    assert_eq!(snapshot_entries(&staged), snapshot_entries(&in_place));
    assert_eq!(
        fs::metadata(&staged_path).unwrap().len(),
        fs::metadata(&in_place_path).unwrap().len()
    );

    // No staging file is left behind
    let leftovers: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".rebuild"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_staged_rebuild_keeps_handle_usable() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);

    let mut batch = BTreeMap::new();
    batch.insert(1, write_input(&dir, "one.bin", &pattern(2500, 1)));
    afs.replace_many(&batch).unwrap();

    // Later single replacements and renames hit the swapped file
    afs.replace_entry(0, &pattern(4500, 7)).unwrap();
    afs.rename_entry(2, "last.bin", true).unwrap();
    drop(afs);

    let afs = Container::open(&path).unwrap();
    assert_eq!(afs.extract_to_buffer(0).unwrap().as_ref(), &pattern(4500, 7)[..]);
    assert_eq!(afs.extract_to_buffer(1).unwrap().as_ref(), &pattern(2500, 1)[..]);
    assert_eq!(afs.extract_to_buffer(2).unwrap().as_ref(), &pattern(4000, 2)[..]);
    assert_eq!(afs.metadata(2).unwrap().filename, "last.bin");
}

#[test]
fn test_empty_batch_is_noop() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let file_before = fs::read(&path).unwrap();

    afs.replace_many(&BTreeMap::new()).unwrap();
    assert_eq!(fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_missing_file_aborts_whole_batch() {
    let (_temp, dir) = setup_temp_dir();

    for config in [Config::default(), in_place_config()] {
        let path = dir.join(format!("{:?}.afs", config.rebuild_strategy));
        let mut afs = build_archive_with_config(&path, &[100, 50, 4000], config);
        let file_before = fs::read(&path).unwrap();
        let table_before = afs.entry_table().clone();

        let mut batch = BTreeMap::new();
        batch.insert(0, write_input(&dir, "present.bin", &pattern(5000, 0)));
        batch.insert(1, dir.join("absent.bin"));

        let result = afs.replace_many(&batch);
        assert!(matches!(result, Err(AfsError::IoAt { .. })));
        assert_eq!(fs::read(&path).unwrap(), file_before);
        assert_eq!(afs.entry_table(), &table_before);
    }
}

#[test]
fn test_batch_rejects_bad_ids_and_empty_files() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let file_before = fs::read(&path).unwrap();

    let mut batch = BTreeMap::new();
    batch.insert(7, write_input(&dir, "x.bin", b"x"));
    assert!(matches!(
        afs.replace_many(&batch),
        Err(AfsError::EntryOutOfRange { id: 7, .. })
    ));

    let mut batch = BTreeMap::new();
    batch.insert(0, write_input(&dir, "empty.bin", b""));
    assert!(matches!(
        afs.replace_many(&batch),
        Err(AfsError::InvalidInput(_))
    ));

    assert_eq!(fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_replace_entries_by_name() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let inputs = dir.join("inputs");
    fs::create_dir(&inputs).unwrap();

    let files = vec![
        write_input(&inputs, "entry_2.bin", &pattern(6000, 12)),
        write_input(&inputs, "stranger.bin", b"nobody"),
        write_input(&inputs, "entry_0.bin", b"zero"),
    ];
    let unmatched = afs.replace_entries_by_name(&files[..]).unwrap();
    assert_eq!(unmatched, vec![inputs.join("stranger.bin")]);

    assert_eq!(afs.extract_to_buffer(0).unwrap().as_ref(), b"zero");
    assert_eq!(afs.extract_to_buffer(1).unwrap().as_ref(), &pattern(50, 1)[..]);
    assert_eq!(afs.extract_to_buffer(2).unwrap().as_ref(), &pattern(6000, 12)[..]);
    drop(afs);

    let afs = Container::open(&path).unwrap();
    assert_eq!(afs.metadata(2).unwrap().filesize, 6000);
}

#[test]
fn test_replace_entries_by_name_without_matches() {
    let (_temp, dir) = setup_temp_dir();
    let (path, mut afs) = reference_archive(&dir);
    let file_before = fs::read(&path).unwrap();

    let files = [write_input(&dir, "unknown.bin", b"data")];
    let unmatched = afs.replace_entries_by_name(&files[..]).unwrap();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_replace_entries_by_name_reports_displaced_duplicates() {
    let (_temp, dir) = setup_temp_dir();
    let (_path, mut afs) = reference_archive(&dir);
    let first = dir.join("first");
    let second = dir.join("second");
    fs::create_dir(&first).unwrap();
    fs::create_dir(&second).unwrap();

    let files = vec![
        write_input(&first, "entry_1.bin", b"older"),
        write_input(&second, "entry_1.bin", b"newer"),
    ];
    let unmatched = afs.replace_entries_by_name(&files[..]).unwrap();

    assert_eq!(unmatched, vec![first.join("entry_1.bin")]);
    assert_eq!(afs.extract_to_buffer(1).unwrap().as_ref(), b"newer");
}

#[cfg(unix)]
#[test]
fn test_staged_rebuild_through_symlink_updates_target() {
    let (_temp, dir) = setup_temp_dir();
    let (path, afs) = reference_archive(&dir);
    drop(afs);
    let link = dir.join("link.afs");
    std::os::unix::fs::symlink(&path, &link).unwrap();

    let mut afs = Container::open(&link).unwrap();
    let mut batch = BTreeMap::new();
    batch.insert(0, write_input(&dir, "grown.bin", &pattern(5000, 4)));
    afs.replace_many(&batch).unwrap();
    drop(afs);

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    let real = Container::open(&path).unwrap();
    assert_eq!(real.extract_to_buffer(0).unwrap().as_ref(), &pattern(5000, 4)[..]);
    assert!(!dir.join(".reference.afs.rebuild").exists());
    assert!(!dir.join(".link.afs.rebuild").exists());
}

#[cfg(unix)]
#[test]
fn test_staged_rebuild_keeps_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let (_temp, dir) = setup_temp_dir();
    let (path, afs) = reference_archive(&dir);
    drop(afs);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

    let mut afs = Container::open(&path).unwrap();
    let mut batch = BTreeMap::new();
    batch.insert(2, write_input(&dir, "small.bin", b"small"));
    afs.replace_many(&batch).unwrap();
    drop(afs);

    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}
