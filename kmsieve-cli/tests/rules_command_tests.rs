//! Integration tests for `kmsieve rules`.
//!
//! The rule files here follow the on-disk format the daemon reads.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use kmsieve_cli::commands::rules::{test_message, validate_file};
use kmsieve_core::config::FilterMode;
use kmsieve_pipeline::RuleKind;

fn write_rules(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("rules");
    fs::write(&path, content).expect("should write rules");
    path
}

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[tokio::test]
async fn test_rules_validate_realistic_file() {
    // Given: A commented rule file with an exception chain
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(
        &temp_dir,
        "# drop audit noise\n\
         e /audit: type=1400/\n\
         # but keep denials for sshd\n\
         i /comm=\"sshd\"/\n\
         \n\
         e /usb \\d+-\\d+: reset/\n",
    );

    // When: Validating
    let report = validate_file(&path).await;

    // Then: Three rules, include by default
    assert!(report.valid, "errors: {:?}", report.errors);
    let kinds: Vec<RuleKind> = report.rules.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![RuleKind::Exclude, RuleKind::Include, RuleKind::Exclude]);
    assert_eq!(report.default_decision, "include");
}

#[tokio::test]
async fn test_rules_validate_include_first_defaults_to_exclude() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(&temp_dir, "i /panic/\n");

    let report = validate_file(&path).await;

    assert!(report.valid);
    assert_eq!(report.default_decision, "exclude");
}

#[tokio::test]
async fn test_rules_validate_bad_regex() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(&temp_dir, "e /ok/\ni /unclosed(/\n");

    let report = validate_file(&path).await;

    assert!(!report.valid);
    assert!(report.errors[0].contains(":2:"), "got {:?}", report.errors);
}

#[tokio::test]
async fn test_rules_test_exception_chain() {
    // Given: Exclude audit, re-include sshd, exclude again for a test host
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(&temp_dir, "e /audit/\ni /sshd/\ne /testhost/\n");

    // When/Then: Each level of the chain decides
    let cases = [
        ("6,1,0,-;audit: other", "exclude"),
        ("6,2,0,-;audit: sshd denied", "include"),
        ("6,3,0,-;audit: sshd denied testhost", "exclude"),
        ("6,4,0,-;eth0 up", "include"),
    ];
    for (line, expected) in cases {
        let report = test_message(&path, FilterMode::LeadingLine, &lines(&[line]))
            .await
            .expect("test should succeed");
        assert_eq!(report.decision, expected, "line {line:?}");
    }
}

#[tokio::test]
async fn test_rules_test_leading_line_ignores_continuation() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(&temp_dir, "e /DEVICE=\\+usb/\n");
    let message = lines(&["6,9,0,-;new device", " DEVICE=+usb:1-1"]);

    let leading = test_message(&path, FilterMode::LeadingLine, &message)
        .await
        .expect("leading");
    let whole = test_message(&path, FilterMode::WholeMessage, &message)
        .await
        .expect("whole");

    assert_eq!(leading.decision, "include");
    assert_eq!(leading.text, "6,9,0,-;new device");
    assert_eq!(whole.decision, "exclude");
    assert_eq!(whole.mode, "whole-message");
}

#[tokio::test]
async fn test_rules_test_malformed_file_is_rule_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = write_rules(&temp_dir, "exclude everything\n");

    let err = test_message(&path, FilterMode::LeadingLine, &lines(&["x"]))
        .await
        .expect_err("malformed rules should fail");

    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("rule error"));
}
