// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn write_bundle(root: &Path, name: &str, manifest: &str, lib_name: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    std::fs::write(dir.join(lib_name), b"\x7fELF").unwrap();
    dir
}

fn manifest_for(name: &str) -> String {
    format!("name = \"{name}\"\nversion = \"1.0.0\"\nentry = \"entry\"\n")
}

#[test]
fn finds_valid_bundles_sorted() {
    let root = TempDir::new().unwrap();
    write_bundle(root.path(), "zeta", &manifest_for("zeta"), "libzeta.so");
    write_bundle(root.path(), "alpha", &manifest_for("alpha"), "libalpha.so");

    let report = scan(&[root.path().to_path_buf()]);
    let names: Vec<&str> = report.bundles.iter().map(|b| b.manifest.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    assert!(report.skipped.is_empty());
}

#[test]
fn malformed_manifest_is_skipped_not_fatal() {
    let root = TempDir::new().unwrap();
    write_bundle(root.path(), "good", &manifest_for("good"), "libgood.so");
    write_bundle(root.path(), "bad", "name = \"bad\"\n", "libbad.so");

    let report = scan(&[root.path().to_path_buf()]);
    assert_eq!(report.bundles.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].dir.ends_with("bad"));
}

#[test]
fn bundle_without_library_is_skipped() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("nolib");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(MANIFEST_FILE), manifest_for("nolib")).unwrap();

    let report = scan(&[root.path().to_path_buf()]);
    assert!(report.bundles.is_empty());
    assert_eq!(report.skipped[0].reason, "no shared library in bundle");
}

#[test]
fn bundle_with_two_libraries_is_skipped() {
    let root = TempDir::new().unwrap();
    let dir = write_bundle(root.path(), "dup", &manifest_for("dup"), "liba.so");
    std::fs::write(dir.join("libb.so"), b"\x7fELF").unwrap();

    let report = scan(&[root.path().to_path_buf()]);
    assert!(report.bundles.is_empty());
    assert!(report.skipped[0].reason.contains("expected one"));
}

#[test]
fn disabled_manifest_is_discovered_as_disabled() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("off");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{MANIFEST_FILE}{DISABLED_SUFFIX}")),
        manifest_for("off"),
    )
    .unwrap();
    std::fs::write(dir.join("liboff.so"), b"\x7fELF").unwrap();

    let report = scan(&[root.path().to_path_buf()]);
    assert_eq!(report.bundles.len(), 1);
    assert!(report.bundles[0].disabled);
}

#[test]
fn missing_root_is_tolerated() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("not-there");
    let report = scan(&[missing]);
    assert!(report.bundles.is_empty());
    assert!(report.skipped.is_empty());
}

#[test]
fn plain_directories_are_ignored() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("random")).unwrap();
    let report = scan(&[root.path().to_path_buf()]);
    assert!(report.bundles.is_empty());
    assert!(report.skipped.is_empty());
}
