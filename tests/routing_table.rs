//! Routing-table loading from disk.

use camino::Utf8Path;
use rstest::*;
use stratus::{DEFAULT_TTL_SECS, RoutingError, RoutingTable};
use tempfile::TempDir;

fn write_table(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("routing.json");
    std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write table: {err}"));
    path.to_string_lossy().into_owned()
}

#[rstest]
fn loads_table_from_file() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_table(
        &dir,
        r#"{
            "ubuntu-22-small": [
                {"provider": "scaleway", "image": "ubuntu_noble", "size": "DEV1-S", "priority": 1},
                {"provider": "digitalocean", "image": "ubuntu-22-04-x64", "size": "s-1vcpu-1gb", "priority": 2, "ttl": 7200}
            ]
        }"#,
    );

    let table = RoutingTable::load(Utf8Path::new(&path))
        .unwrap_or_else(|err| panic!("table should load: {err}"));
    let candidates = table
        .candidates("ubuntu-22-small")
        .unwrap_or_else(|| panic!("image type should resolve"));
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].effective_ttl(), DEFAULT_TTL_SECS);
    assert_eq!(candidates[1].effective_ttl(), 7200);
}

#[rstest]
fn missing_file_is_fatal() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = dir.path().join("absent.json");
    let result = RoutingTable::load(Utf8Path::new(&path.to_string_lossy().into_owned()));
    assert!(matches!(result, Err(RoutingError::Read { .. })));
}

#[rstest]
fn malformed_document_is_fatal() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_table(&dir, "{ this is not json");
    let result = RoutingTable::load(Utf8Path::new(&path));
    assert!(matches!(result, Err(RoutingError::Parse { .. })));
}

#[rstest]
fn structurally_invalid_table_is_fatal() {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = write_table(&dir, r#"{"ubuntu-22-small": []}"#);
    let result = RoutingTable::load(Utf8Path::new(&path));
    assert!(matches!(result, Err(RoutingError::Invalid { .. })));
}
