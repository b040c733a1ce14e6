//! Integration tests for the offline parts of the CLI
//!
//! Tests cover:
//! - Validation of desired-state files
//! - Exit codes for malformed and inconsistent input
//! - Mapping of run reports to command results

use std::io::Write;
use std::path::PathBuf;

use dtrack_cli::commands::apply::check;
use dtrack_cli::commands::validate::{self, ValidateArgs};
use dtrack_reconcile::{ErrorKind, ErrorRecord, RunReport};
use tempfile::NamedTempFile;

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn validate_file(file: &NamedTempFile) -> dtrack_cli::error::CliResult<()> {
    validate::execute(ValidateArgs {
        file: PathBuf::from(file.path()),
    })
}

#[test]
fn test_validate_accepts_complete_file() {
    let file = write_file(
        r#"
oidc_groups:
  - Foobar
  - name: Legacy
    state: absent
projects:
  - name: Foobar
  - name: FoobarLib
    classifier: LIBRARY
    parent: Foobar
teams:
  - name: Foobar
    permissions: [VIEW_PORTFOLIO, BOM_UPLOAD]
    oidc_groups: [Foobar]
    portfolio_access_control:
      verify:
        enabled: true
        root_project: Foobar
      projects: [FoobarLib]
"#,
    );
    assert!(validate_file(&file).is_ok());
}

#[test]
fn test_validate_rejects_unknown_permission() {
    let file = write_file(
        r#"
teams:
  - name: Foobar
    permissions: [VIEW_EVERYTHING]
"#,
    );
    let err = validate_file(&file).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("VIEW_EVERYTHING"));
    assert!(err.to_string().contains("UnknownPermissionError"));
}

#[test]
fn test_validate_rejects_parent_cycle() {
    let file = write_file(
        r#"
projects:
  - name: A
    parent: B
  - name: B
    parent: A
"#,
    );
    let err = validate_file(&file).unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("A -> B -> A"));
}

#[test]
fn test_validate_rejects_malformed_yaml() {
    let file = write_file("teams: [name: {");
    let err = validate_file(&file).unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_validate_rejects_duplicate_names() {
    let file = write_file("oidc_groups: [Foo, Foo]");
    let err = validate_file(&file).unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_failed_report_maps_to_apply_error() {
    let mut report = RunReport {
        started_at: Default::default(),
        finished_at: Default::default(),
        dry_run: false,
        changed: true,
        counts: Default::default(),
        operations: vec![],
        errors: vec![],
    };
    assert!(check(&report).is_ok());

    report.errors.push(ErrorRecord {
        kind: ErrorKind::VerificationFailedError,
        message: "server reports access to [], expected [Foobar]".into(),
        operation: Some("set portfolio access for team 'Foobar'".into()),
    });
    let err = check(&report).unwrap_err();
    assert_eq!(err.exit_code(), 5);
    assert!(err.to_string().contains("VerificationFailedError"));
}
