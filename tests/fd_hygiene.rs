//! Fd table correctness: redirect ordering, `2>&1` aliasing, descriptor
//! closing, and that pipes/opened files never leak past the command that
//! should own them.

use std::fs;

use proctree::{out, run, Cmd, STDERR, STDIN, STDOUT};
use tempfile::NamedTempFile;

#[tokio::test]
async fn to_file_truncates_by_default() {
    let f = NamedTempFile::new().unwrap();
    fs::write(f.path(), "stale contents\n").unwrap();

    run(Cmd::new("echo").arg("fresh").to_file(STDOUT, f.path())).await.unwrap();

    assert_eq!(fs::read_to_string(f.path()).unwrap(), "fresh\n");
}

#[tokio::test]
async fn append_file_preserves_prior_contents() {
    let f = NamedTempFile::new().unwrap();
    fs::write(f.path(), "first\n").unwrap();

    run(Cmd::new("echo").arg("second").append_file(STDOUT, f.path())).await.unwrap();

    assert_eq!(fs::read_to_string(f.path()).unwrap(), "first\nsecond\n");
}

#[tokio::test]
async fn to_fd_merges_stderr_into_stdout_resolved_against_current_source() {
    // `2>&1 >file` should send stderr to the *original* stdout (our own
    // stdout, captured by `out`), not to the file stdout is redirected to
    // afterwards: the same non-recursive resolution `fdops::plan` tests
    // at the unit level, exercised here end to end.
    let f = NamedTempFile::new().unwrap();
    let captured = out(Cmd::new("sh")
        .arg("-c")
        .arg("echo to-stdout; echo to-stderr >&2")
        .to_fd(STDERR, STDOUT)
        .to_file(STDOUT, f.path()))
    .await
    .unwrap();

    assert_eq!(String::from_utf8_lossy(&captured), "to-stderr\n");
    assert_eq!(fs::read_to_string(f.path()).unwrap(), "to-stdout\n");
}

#[tokio::test]
async fn close_fd_makes_the_descriptor_unavailable_to_the_child() {
    // With fd 1 explicitly closed, a write to it should fail in the child
    // rather than silently going anywhere.
    let result = run(Cmd::new("sh").arg("-c").arg("echo hi").close_fd(STDOUT)).await.unwrap();
    assert!(!result.success());
}

#[tokio::test]
async fn from_file_feeds_stdin() {
    let f = NamedTempFile::new().unwrap();
    fs::write(f.path(), "line one\nline two\n").unwrap();

    let bytes = out(Cmd::new("wc").arg("-l").from_file(STDIN, f.path())).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "2");
}

#[tokio::test]
async fn feed_does_not_leave_the_child_blocked_on_a_short_reader() {
    // `head -n1` exits after its first line; the background feeder writing
    // the rest of `bytes` must see a broken pipe and stop cleanly rather
    // than hanging `wait()`.
    let big = "line\n".repeat(10_000);
    let result = run(Cmd::new("head").arg("-n1").feed(STDIN, big)).await.unwrap();
    assert!(result.success());
}
