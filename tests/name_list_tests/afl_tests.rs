//! AFL Tests
//!
//! Tests verify:
//! - Header fields, including the unknown ones, survive open/save
//! - Renames and lookups work by index and by name
//! - Malformed files are rejected

use std::fs;

use afspack::{AfsError, NameList};

use crate::support::{reference_archive, setup_temp_dir};

// =============================================================================
// Helper Functions
// =============================================================================

fn raw_list(identifier: &[u8; 4], unknown1: u32, unknown2: i32, names: &[&str]) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(identifier);
    raw.extend_from_slice(&unknown1.to_le_bytes());
    raw.extend_from_slice(&unknown2.to_le_bytes());
    raw.extend_from_slice(&(names.len() as u32).to_le_bytes());
    for name in names {
        let mut buf = [0u8; 32];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        raw.extend_from_slice(&buf);
    }
    raw
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_open_and_save_preserve_header() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("names.afl");
    let raw = raw_list(b"AFL\0", 0x0102_0304, -7, &["alpha", "beta", "gamma"]);
    fs::write(&path, &raw).unwrap();

    let list = NameList::open(&path).unwrap();
    assert_eq!(list.entry_count(), 3);
    assert_eq!(list.identifier(), b"AFL\0");
    assert_eq!(*list.name(1).unwrap(), "beta");
    assert_eq!(list.path(), Some(path.as_path()));

    list.save().unwrap();
    assert_eq!(fs::read(&path).unwrap(), raw);
}

#[test]
fn test_rename_and_position() {
    let (_temp, dir) = setup_temp_dir();
    let path = dir.join("names.afl");
    fs::write(&path, raw_list(b"AFL\0", 0, 0, &["a", "b"])).unwrap();

    let mut list = NameList::open(&path).unwrap();
    list.rename(1, "boss.bin").unwrap();
    assert_eq!(list.position("boss.bin"), Some(1));
    assert_eq!(list.position("b"), None);

    assert!(matches!(
        list.rename(2, "x"),
        Err(AfsError::EntryOutOfRange { id: 2, count: 2 })
    ));
    assert!(matches!(list.rename(0, ""), Err(AfsError::InvalidInput(_))));

    list.save().unwrap();
    let reopened = NameList::open(&path).unwrap();
    assert_eq!(*reopened.name(1).unwrap(), "boss.bin");
}

#[test]
fn test_full_length_name_has_no_terminator() {
    let (_temp, dir) = setup_temp_dir();
    let long = "z".repeat(32);
    let mut list = NameList::new(1).unwrap();
    list.rename(0, &long).unwrap();

    let path = dir.join("long.afl");
    list.save_as(&path).unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(raw.len(), 16 + 32);
    assert!(raw[16..].iter().all(|&b| b == b'z'));
    assert_eq!(NameList::open(&path).unwrap().name(0).unwrap().len(), 32);
}

#[test]
fn test_new_list_needs_save_as() {
    let (_temp, dir) = setup_temp_dir();
    let mut list = NameList::new(2).unwrap();
    assert!(list.path().is_none());
    assert!(matches!(list.save(), Err(AfsError::InvalidHandle(_))));

    let path = dir.join("fresh.afl");
    list.save_as(&path).unwrap();
    list.save().unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..4], b"AFL\0");
    assert_eq!(&raw[12..16], &2u32.to_le_bytes());
}

#[test]
fn test_new_list_entry_limit() {
    assert!(NameList::new(0xFFFF).is_ok());
    assert!(matches!(
        NameList::new(0x10000),
        Err(AfsError::InvalidInput(_))
    ));
}

#[test]
fn test_from_container_copies_names() {
    let (_temp, dir) = setup_temp_dir();
    let (_path, afs) = reference_archive(&dir);

    let list = NameList::from_container(&afs).unwrap();
    assert_eq!(list.entry_count(), 3);
    assert_eq!(*list.name(2).unwrap(), "entry_2.bin");
}

#[test]
fn test_open_malformed_lists() {
    let (_temp, dir) = setup_temp_dir();

    let short = dir.join("short.afl");
    fs::write(&short, b"AFL\0\x00").unwrap();
    assert!(matches!(NameList::open(&short), Err(AfsError::Format(_))));

    let truncated = dir.join("truncated.afl");
    let mut raw = raw_list(b"AFL\0", 0, 0, &["a", "b"]);
    raw.truncate(16 + 40);
    fs::write(&truncated, &raw).unwrap();
    assert!(matches!(NameList::open(&truncated), Err(AfsError::Format(_))));

    assert!(matches!(
        NameList::open(dir.join("absent.afl")),
        Err(AfsError::InvalidPath(_))
    ));
}
