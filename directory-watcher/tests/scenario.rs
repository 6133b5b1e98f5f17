//! End-to-end tests driving real filesystem changes through a watcher.
//!
//! Every wait is bounded so that a missed notification fails the test
//! instead of hanging it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use dirwatch::{WatchState, WatcherError, WatcherHandle};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

/// How long a step must stay silent after its wakeup.
const QUIET: Duration = Duration::from_millis(300);

fn expect_wakeup(handle: &WatcherHandle, step: &str) {
    let woke = handle
        .wait_for_event_timeout(TIMEOUT)
        .unwrap_or_else(|e| panic!("{step}: watcher closed unexpectedly: {e}"));
    assert!(woke, "{step}: no change reported within {TIMEOUT:?}");
}

/// Exactly one wakeup for `step`: one arrives, and no second one follows.
fn expect_single_wakeup(handle: &WatcherHandle, step: &str) {
    expect_wakeup(handle, step);
    let extra = handle.wait_for_event_timeout(QUIET).unwrap();
    assert!(!extra, "{step}: a second wakeup followed the first");
}

fn wait_for_exit(handle: &WatcherHandle) {
    let deadline = Instant::now() + TIMEOUT;
    while handle.is_alive() {
        assert!(
            Instant::now() < deadline,
            "watch loop still running {TIMEOUT:?} after it should have exited"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn write_file(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_file_lifecycle_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    let file1 = dir.join("TestFile1.txt");
    let file2 = dir.join("TestFile2.txt");

    let handle = WatcherHandle::watch(dir).unwrap();
    assert!(handle.is_ready());

    write_file(&file1, "Test is a test 1\n");
    expect_single_wakeup(&handle, "create TestFile1.txt");

    let mut writer = OpenOptions::new().append(true).open(&file1).unwrap();
    writer.write_all(b"This is another test\n").unwrap();
    drop(writer);
    expect_single_wakeup(&handle, "append to TestFile1.txt");

    write_file(&file2, "Test is a test 2\n");
    expect_single_wakeup(&handle, "create TestFile2.txt");

    std::fs::copy(&file1, &file2).unwrap();
    expect_single_wakeup(&handle, "copy TestFile1.txt over TestFile2.txt");

    std::fs::rename(&file1, &file2).unwrap();
    expect_single_wakeup(&handle, "move TestFile1.txt over TestFile2.txt");

    std::fs::remove_file(&file2).unwrap();
    expect_single_wakeup(&handle, "delete TestFile2.txt");

    let stats = handle.stats();
    assert_eq!(stats.batches, 6);
    assert!(stats.batches <= stats.events);

    handle.stop();
    wait_for_exit(&handle);
    assert_eq!(handle.state(), WatchState::Stopped);
}

#[test]
fn test_single_write_wakes_once() {
    let temp_dir = TempDir::new().unwrap();
    let handle = WatcherHandle::watch(temp_dir.path()).unwrap();

    write_file(&temp_dir.path().join("TestFile1.txt"), "Test is a test 1\n");

    expect_single_wakeup(&handle, "single write");
    assert_eq!(handle.stats().batches, 1);
}

#[test]
fn test_burst_is_consumed_without_hanging() {
    let temp_dir = TempDir::new().unwrap();
    let handle = WatcherHandle::watch(temp_dir.path()).unwrap();

    for i in 0..20 {
        write_file(&temp_dir.path().join(format!("burst-{i}.txt")), "x");
    }

    // However the platform groups the burst, at least one wakeup arrives and
    // the wakeups never outnumber the events behind them.
    expect_wakeup(&handle, "burst");
    while handle
        .wait_for_event_timeout(Duration::from_millis(500))
        .unwrap()
    {}

    let stats = handle.stats();
    assert!(stats.batches >= 1);
    assert!(stats.events >= stats.batches);
}

#[test]
fn test_events_after_stop_are_not_delivered() {
    let temp_dir = TempDir::new().unwrap();
    let handle = WatcherHandle::watch(temp_dir.path()).unwrap();

    handle.stop();
    wait_for_exit(&handle);

    write_file(&temp_dir.path().join("late.txt"), "too late");
    std::thread::sleep(Duration::from_millis(200));

    assert!(!handle.has_pending_event());
    assert!(matches!(
        handle.wait_for_event_timeout(TIMEOUT),
        Err(WatcherError::Closed)
    ));
}

#[test]
fn test_drop_stops_loop() {
    let temp_dir = TempDir::new().unwrap();
    let handle = WatcherHandle::watch(temp_dir.path()).unwrap();
    let probe = WatcherHandle::watch(temp_dir.path()).unwrap();

    drop(handle);

    // The second watch on the same directory is unaffected.
    write_file(&temp_dir.path().join("after-drop.txt"), "still watched");
    expect_wakeup(&probe, "second watcher after first dropped");
}

#[cfg(target_os = "linux")]
#[test]
fn test_removed_directory_terminates_loop() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("watched");
    std::fs::create_dir(&watched).unwrap();

    let handle = WatcherHandle::watch(&watched).unwrap();
    std::fs::remove_dir(&watched).unwrap();

    wait_for_exit(&handle);
    assert_eq!(handle.state(), WatchState::Terminated);

    // Whatever was pending is handed out, then waiters are released.
    let mut drained = 0;
    while handle.wait_for_event().is_ok() {
        drained += 1;
    }
    assert!(drained <= 1);
}
