//! Handle various exit statuses.
//!
//! Run with: cargo run --example exit_status

use proctree::{out, run, Cmd};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Successful exit
    let result = run(Cmd::new("true")).await?;
    println!("true: returncode={}, success={}", result.returncode, result.success());

    // Failed exit
    let result = run(Cmd::new("false")).await?;
    println!("false: returncode={}, success={}", result.returncode, result.success());

    // Custom exit code, and a signal-terminated one (128 + signal number)
    let result = run(Cmd::new("sh").arg("-c").arg("exit 42")).await?;
    println!("exit 42: returncode={}", result.returncode);

    let result = run(Cmd::new("sh").arg("-c").arg("kill -TERM $$")).await?;
    println!("killed by SIGTERM: returncode={}", result.returncode);

    // Output and exit status together
    let bytes = out(Cmd::new("sh").arg("-c").arg("echo output; exit 1")).await?;
    println!("\nCaptured output: {}", String::from_utf8_lossy(&bytes).trim());

    // A command that fails to spawn at all, versus one that spawns and exits
    // non-zero, are reported differently: the former is `SpawnError`.
    let result = run(Cmd::new("ls").arg("/nonexistent")).await?;
    if result.success() {
        println!("ls succeeded");
    } else {
        println!("ls failed with returncode {}", result.returncode);
    }

    Ok(())
}
