//! Dropping an `Execution`, whether mid-`wait()` or before `wait()` is ever
//! called, must still reap or kill whatever it holds, unless `.detached()`
//! was called.

use std::time::Duration;

use proctree::{prepare, Cmd};

#[tokio::test]
async fn detached_execution_outlives_being_dropped() {
    let marker = tempfile::NamedTempFile::new().unwrap();
    let path = marker.path().to_path_buf();
    std::fs::remove_file(&path).unwrap();

    let cmd = Cmd::new("sh")
        .arg("-c")
        .arg(format!("sleep 0.2 && touch {}", path.display()));
    let execution = prepare(cmd).await.unwrap().detached();
    drop(execution);

    // The child keeps running after the handle is gone.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(path.exists(), "detached child should have run to completion");
}

#[tokio::test]
async fn dropping_an_unwaited_execution_kills_its_children() {
    let marker = tempfile::NamedTempFile::new().unwrap();
    let path = marker.path().to_path_buf();
    std::fs::remove_file(&path).unwrap();

    let cmd = Cmd::new("sh")
        .arg("-c")
        .arg(format!("sleep 0.5 && touch {}", path.display()));
    let execution = prepare(cmd).await.unwrap();
    drop(execution);

    // Give the Drop-spawned cleanup task a chance to kill the child before
    // its sleep would otherwise complete.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!path.exists(), "child should have been killed, not let run to completion");
}

#[tokio::test]
async fn dropping_the_wait_future_mid_await_does_not_abort_cleanup() {
    // `wait()`'s reap happens on a detached task; cancelling the outer
    // future (by dropping it before it resolves) must not leave the child
    // as a zombie or orphan it unkilled.
    let marker = tempfile::NamedTempFile::new().unwrap();
    let path = marker.path().to_path_buf();
    std::fs::remove_file(&path).unwrap();

    let cmd = Cmd::new("sh")
        .arg("-c")
        .arg(format!("sleep 0.2 && touch {}", path.display()));
    let execution = prepare(cmd).await.unwrap();

    {
        let wait_fut = execution.wait();
        // Poll it briefly, then drop it before it has a chance to resolve.
        let _ = tokio::time::timeout(Duration::from_millis(10), wait_fut).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(path.exists(), "background reap must survive the wait() future being dropped");
}

#[tokio::test]
async fn waiting_normally_still_completes_and_reports_exit_code() {
    let result = prepare(Cmd::new("sh").arg("-c").arg("exit 2"))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(result.returncode, 2);
}
