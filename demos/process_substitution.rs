//! Process substitution: feed a command's output to another command as if
//! it were a file, without ever touching a shell or a temp file.
//!
//! Run with: cargo run --example process_substitution

use proctree::{out, run, Cmd, STDIN};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Argument-position substitution: `diff <(echo one) <(echo two)`
    let diff = Cmd::new("diff")
        .arg_sub_in(Cmd::new("echo").arg("one"))
        .arg_sub_in(Cmd::new("echo").arg("two"));
    let result = run(diff).await?;
    println!("diff returncode: {}", result.returncode);

    // Redirect-position substitution: feed `wc`'s stdin from a generator.
    let lines = out(Cmd::new("wc").arg("-l").from_sub(STDIN, Cmd::new("seq").arg("5"))).await?;
    println!("line count: {}", String::from_utf8_lossy(&lines).trim());

    Ok(())
}
