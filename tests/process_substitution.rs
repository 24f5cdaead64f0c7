//! Argument-position and redirect-position process substitution.

use proctree::{out, run, Cmd, STDIN, STDOUT};

#[tokio::test]
async fn argument_position_substitution_exposes_a_readable_path() {
    // `diff <(echo same) <(echo same)`: identical inputs, diff exits 0.
    let diff = Cmd::new("diff")
        .arg_sub_in(Cmd::new("echo").arg("same"))
        .arg_sub_in(Cmd::new("echo").arg("same"));
    let result = run(diff).await.unwrap();
    assert!(result.success());
}

#[tokio::test]
async fn argument_position_substitution_detects_differing_inputs() {
    let diff = Cmd::new("diff")
        .arg_sub_in(Cmd::new("echo").arg("one"))
        .arg_sub_in(Cmd::new("echo").arg("two"));
    let result = run(diff).await.unwrap();
    assert!(!result.success());
}

#[tokio::test]
async fn redirect_position_from_sub_feeds_stdin() {
    let bytes = out(Cmd::new("wc").arg("-l").from_sub(STDIN, Cmd::new("seq").arg("4"))).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&bytes).trim(), "4");
}

#[tokio::test]
async fn redirect_position_to_sub_drains_stdout_into_a_helper() {
    // The helper receives everything the root writes to `fd`, and its own
    // exit code never affects the root's returncode.
    let result = run(Cmd::new("echo").arg("hello").to_sub(STDOUT, Cmd::new("sh").arg("-c").arg("cat >/dev/null; exit 9")))
        .await
        .unwrap();
    assert!(result.success());
}

#[tokio::test]
async fn substitution_helper_exit_code_never_contributes_to_pipefail() {
    // Even though the argument-position helper fails internally, the root
    // command's own exit status is what's reported.
    let cmd = Cmd::new("cat").arg_sub_in(Cmd::new("sh").arg("-c").arg("exit 1"));
    let result = run(cmd).await.unwrap();
    assert!(result.success());
}

#[tokio::test]
async fn an_orphaned_substitution_helper_does_not_hang_wait() {
    // The consumer never reads from the slow helper's pipe at all; `wait()`
    // must still return promptly once the consumer itself is done, killing
    // the orphaned helper instead of waiting on it.
    let cmd = Cmd::new("true").arg_sub_in(Cmd::new("sleep").arg("30"));
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), run(cmd))
        .await
        .expect("wait() should not hang on an orphaned substitution helper")
        .unwrap();
    assert!(result.success());
}
