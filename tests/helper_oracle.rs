//! Helper-process oracle driven by stand-in shell scripts
#![cfg(unix)]

use gentle_kill::core::models::{HelperVariant, Routine};
use gentle_kill::core::oracle::AddressOracle;
use gentle_kill::HelperProcessOracle;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn answer(oracle: &HelperProcessOracle, routine: Routine, variant: HelperVariant) -> Option<u64> {
    oracle.query(routine, variant).map(|address| address.get())
}

#[test]
#[serial]
fn helper_receives_routine_name_and_answers() {
    let dir = TempDir::new().unwrap();
    let helper = script(
        &dir,
        "helper",
        r#"[ "$1" = "--get-address-of" ] || exit 1
case "$2" in
  CtrlRoutine) echo 00007FFB1A2B3C40 ;;
  ExitProcess) echo 0x00007ffb1a2b0010 ;;
  *) exit 1 ;;
esac"#,
    );
    let oracle = HelperProcessOracle::new(helper, Duration::from_secs(5));

    assert_eq!(
        answer(&oracle, Routine::CtrlRoutine, HelperVariant::Native),
        Some(0x7ffb_1a2b_3c40)
    );
    assert_eq!(
        answer(&oracle, Routine::ExitProcess, HelperVariant::Native),
        Some(0x7ffb_1a2b_0010)
    );
}

#[test]
#[serial]
fn alloc_console_flag_is_forwarded() {
    let dir = TempDir::new().unwrap();
    let helper = script(&dir, "helper", r#"[ "$3" = "--alloc-console" ] && echo 76E1C0A0"#);

    let without = HelperProcessOracle::new(&helper, Duration::from_secs(5));
    assert_eq!(answer(&without, Routine::CtrlRoutine, HelperVariant::Native), None);

    let with = without.with_alloc_console(true);
    assert_eq!(
        answer(&with, Routine::CtrlRoutine, HelperVariant::Native),
        Some(0x76e1_c0a0)
    );
}

#[test]
#[serial]
fn foreign_variant_uses_its_own_helper() {
    let dir = TempDir::new().unwrap();
    let native = script(&dir, "native", "echo 7FFB00001000");
    let foreign = script(&dir, "foreign", "echo 76E10000");
    let oracle = HelperProcessOracle::new(native, Duration::from_secs(5))
        .with_foreign_helper(Some(foreign));

    assert_eq!(
        answer(&oracle, Routine::ExitProcess, HelperVariant::Foreign),
        Some(0x76e1_0000)
    );
    assert_eq!(
        answer(&oracle, Routine::ExitProcess, HelperVariant::Native),
        Some(0x7ffb_0000_1000)
    );
}

#[test]
#[serial]
fn silent_or_failing_helper_is_unresolvable() {
    let dir = TempDir::new().unwrap();
    let silent = script(&dir, "silent", "exit 0");
    let failing = script(&dir, "failing", "echo 'Could not register Ctrl handler' >&2; exit 1");
    let garbage = script(&dir, "garbage", "echo not-an-address");

    for helper in [silent, failing, garbage] {
        let oracle = HelperProcessOracle::new(helper, Duration::from_secs(5));
        assert_eq!(answer(&oracle, Routine::CtrlRoutine, HelperVariant::Native), None);
    }
}

#[test]
#[serial]
fn hanging_helper_is_abandoned_after_timeout() {
    let dir = TempDir::new().unwrap();
    let helper = script(&dir, "hang", "exec sleep 30");
    let oracle = HelperProcessOracle::new(helper, Duration::from_millis(200));

    let started = Instant::now();
    assert_eq!(answer(&oracle, Routine::CtrlRoutine, HelperVariant::Native), None);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
#[serial]
fn lingering_grandchild_does_not_block_the_caller() {
    let dir = TempDir::new().unwrap();
    // The background sleep inherits stdout and keeps the pipe open after the
    // helper itself is killed.
    let helper = script(&dir, "linger", "sleep 30 &\nexec sleep 30");
    let oracle = HelperProcessOracle::new(helper, Duration::from_millis(200));

    let started = Instant::now();
    assert_eq!(answer(&oracle, Routine::ExitProcess, HelperVariant::Native), None);
    assert!(started.elapsed() < Duration::from_secs(10));
}
