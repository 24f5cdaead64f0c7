//! End-to-end pipefail semantics: the root return code is the exit status
//! of the rightmost stage that failed, independent of where in the
//! pipeline the failure occurred.

use proctree::{run, Cmd};

#[tokio::test]
async fn all_stages_succeed() {
    let pipeline = Cmd::new("true") | Cmd::new("true") | Cmd::new("true");
    let result = run(pipeline).await.unwrap();
    assert!(result.success());
    assert_eq!(result.returncode, 0);
}

#[tokio::test]
async fn failure_in_first_stage_is_reported() {
    let pipeline = Cmd::new("sh").arg("-c").arg("exit 3") | Cmd::new("cat");
    let result = run(pipeline).await.unwrap();
    assert_eq!(result.returncode, 3);
}

#[tokio::test]
async fn rightmost_failure_wins_over_earlier_ones() {
    let pipeline = Cmd::new("sh").arg("-c").arg("exit 3")
        | Cmd::new("sh").arg("-c").arg("cat >/dev/null; exit 7");
    let result = run(pipeline).await.unwrap();
    assert_eq!(result.returncode, 7);
}

#[tokio::test]
async fn earlier_failure_wins_when_later_stages_succeed() {
    let pipeline = Cmd::new("sh").arg("-c").arg("exit 5")
        | Cmd::new("sh").arg("-c").arg("cat >/dev/null; exit 0");
    let result = run(pipeline).await.unwrap();
    assert_eq!(result.returncode, 5);
}

#[tokio::test]
async fn single_command_returncode_matches_its_own_exit() {
    let result = run(Cmd::new("sh").arg("-c").arg("exit 9")).await.unwrap();
    assert_eq!(result.returncode, 9);
}

#[tokio::test]
async fn signal_termination_is_encoded_as_128_plus_signal() {
    let result = run(Cmd::new("sh").arg("-c").arg("kill -TERM $$")).await.unwrap();
    assert_eq!(result.returncode, 128 + 15);
}
