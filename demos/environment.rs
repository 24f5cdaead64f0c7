//! Control subprocess environment variables.
//!
//! Run with: cargo run --example environment

use proctree::{out, Cmd};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Override a single variable; the child still inherits everything else
    // from this process's own environment.
    let output = out(Cmd::new("sh")
        .arg("-c")
        .arg("echo $GREETING")
        .env("GREETING", "Hello from proctree!"))
    .await?;
    println!("With custom env: {}", String::from_utf8_lossy(&output).trim());

    // Set multiple overrides at once
    let output = out(Cmd::new("sh")
        .arg("-c")
        .arg("echo $FIRST $SECOND")
        .env("FIRST", "Hello")
        .env("SECOND", "World"))
    .await?;
    println!("Multiple vars: {}", String::from_utf8_lossy(&output).trim());

    Ok(())
}
