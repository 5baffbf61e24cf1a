//! End-to-end client tests against a stub registry binary.
//!
//! The registry binary is configurable, so these tests substitute a small
//! shell script that mimics the CLI's argument layout and output formats.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tabpool_kaggle::client::{RegistryClient, parse_search_output};
use tabpool_kaggle::size::{SizeEstimate, estimate_size_mb};

fn write_stub(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("registry-stub.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn stub_client(stub: &Path) -> RegistryClient {
    RegistryClient::new(&stub.to_string_lossy()).with_backoff(Duration::ZERO, Duration::ZERO)
}

#[test]
fn estimate_prefers_declared_metadata() {
    let dir = tempfile::tempdir().unwrap();
    // `datasets metadata -d <ref> -p <dir>` writes the metadata file.
    let stub = write_stub(
        dir.path(),
        r#"
case "$2" in
  metadata) printf '{"totalBytes": 1048576}' > "$6/dataset-metadata.json" ;;
  files) echo "file.csv 512KB" ;;
  *) exit 1 ;;
esac
"#,
    );
    let client = stub_client(&stub);
    let estimate = estimate_size_mb(&client, dir.path(), "owner/slug").unwrap();
    assert_eq!(estimate, SizeEstimate::Mb(1.0));
}

#[test]
fn estimate_falls_back_to_listing() {
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(
        dir.path(),
        r#"
case "$2" in
  metadata) exit 1 ;;
  files) echo "file.csv 512KB" ;;
  *) exit 1 ;;
esac
"#,
    );
    let client = stub_client(&stub);
    let estimate = estimate_size_mb(&client, dir.path(), "owner/slug").unwrap();
    assert_eq!(estimate, SizeEstimate::Mb(0.5));
}

#[test]
fn estimate_unknown_when_everything_fails() {
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(
        dir.path(),
        r#"
case "$2" in
  files) echo "no sizes in this listing" ;;
  *) exit 1 ;;
esac
"#,
    );
    let client = stub_client(&stub);
    let estimate = estimate_size_mb(&client, dir.path(), "owner/slug").unwrap();
    assert_eq!(estimate, SizeEstimate::Unknown);
}

#[test]
fn search_page_parses_refs() {
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(
        dir.path(),
        r#"
if [ "$2" = "list" ]; then
  echo "ref,title,size"
  echo "----"
  echo "alice/retail-sales,Retail Sales,12MB"
  echo "bob/city-census,City Census,450KB"
else
  exit 1
fi
"#,
    );
    let client = stub_client(&stub);
    let page = client.search_page("retail", 1).unwrap().unwrap();
    assert_eq!(
        parse_search_output(&page),
        vec!["alice/retail-sales", "bob/city-census"]
    );
}

#[test]
fn failing_command_is_a_soft_failure() {
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(dir.path(), "exit 1");
    let client = stub_client(&stub);
    assert!(client.search_page("retail", 1).unwrap().is_none());
    assert!(!client.download("owner/slug", dir.path()).unwrap());
}

#[test]
fn missing_binary_is_fatal() {
    let client = RegistryClient::new("definitely-not-a-real-registry-cli")
        .with_backoff(Duration::ZERO, Duration::ZERO);
    assert!(client.search_page("retail", 1).is_err());
}
