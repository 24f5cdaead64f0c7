//! Signal-related behavior beyond the single case already covered in
//! pipefail.rs: different signal numbers encode correctly, and a signal
//! hitting a non-final pipeline stage is still picked up by pipefail.

use proctree::{run, Cmd};

#[tokio::test]
async fn sigkill_is_encoded_as_128_plus_9() {
    let result = run(Cmd::new("sh").arg("-c").arg("kill -KILL $$")).await.unwrap();
    assert_eq!(result.returncode, 128 + 9);
}

#[tokio::test]
async fn sigint_is_encoded_as_128_plus_2() {
    let result = run(Cmd::new("sh").arg("-c").arg("kill -INT $$")).await.unwrap();
    assert_eq!(result.returncode, 128 + 2);
}

#[tokio::test]
async fn a_killed_non_final_stage_still_wins_pipefail_over_a_successful_final_stage() {
    let pipeline = Cmd::new("sh").arg("-c").arg("kill -TERM $$")
        | Cmd::new("sh").arg("-c").arg("cat >/dev/null; exit 0");
    let result = run(pipeline).await.unwrap();
    assert_eq!(result.returncode, 128 + 15);
}

#[tokio::test]
async fn a_killed_final_stage_is_reported_even_when_earlier_stages_succeed() {
    let pipeline = Cmd::new("echo").arg("hi") | Cmd::new("sh").arg("-c").arg("cat >/dev/null; kill -TERM $$");
    let result = run(pipeline).await.unwrap();
    assert_eq!(result.returncode, 128 + 15);
}
