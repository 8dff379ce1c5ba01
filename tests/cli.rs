use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

fn machound(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_machound"))
        .args(args)
        .output()
        .expect("failed to run machound")
}

/// A 64-bit little-endian arm64 executable with a single `__TEXT` segment
/// covering the whole file.
fn minimal_executable() -> Vec<u8> {
    let mut data = Vec::new();
    for word in [0xFEED_FACFu32, 0x0100_000C, 0, 2, 1, 72, 0x0020_0085, 0] {
        data.extend_from_slice(&word.to_le_bytes());
    }

    data.extend_from_slice(&0x19u32.to_le_bytes());
    data.extend_from_slice(&72u32.to_le_bytes());
    let mut name = [0u8; 16];
    name[..6].copy_from_slice(b"__TEXT");
    data.extend_from_slice(&name);
    for quad in [0x1_0000_0000u64, 0x1000, 0, 104] {
        data.extend_from_slice(&quad.to_le_bytes());
    }
    for word in [5u32, 5, 0, 0] {
        data.extend_from_slice(&word.to_le_bytes());
    }

    assert_eq!(data.len(), 104);
    data
}

fn temp_with(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_no_arguments_prints_usage() {
    let output = machound(&[]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"));
}

#[test]
fn test_missing_file_fails_without_report() {
    let output = machound(&["/nonexistent/path"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("/nonexistent/path"));
}

#[test]
fn test_minimal_executable() {
    let file = temp_with(&minimal_executable());
    let path = file.path().to_str().unwrap();

    let output = machound(&[path]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("machound - "));
    assert!(stdout.contains("__TEXT"));
    assert!(stdout.contains("arm64"));
    assert!(stdout.contains("PIE"));
}

#[test]
fn test_not_macho() {
    let file = temp_with(b"#!/bin/sh\necho hello\n");
    let output = machound(&[file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_several_files_in_order() {
    let good = temp_with(&minimal_executable());
    let bad = temp_with(b"plain text");
    let good_path = good.path().to_str().unwrap();

    let output = machound(&[good_path, bad.path().to_str().unwrap(), good_path, "-j", "2"]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("machound - ").count(), 2);
}

#[test]
fn test_no_symbols_flag() {
    let file = temp_with(&minimal_executable());
    let output = machound(&["--no-symbols", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("Symbols ("));
}
