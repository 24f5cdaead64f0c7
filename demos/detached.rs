//! Run detached (background) processes.
//!
//! Run with: cargo run --example detached

use proctree::{prepare, Cmd};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Start a process and immediately detach it: dropping the `Execution`
    // will not kill or reap it.
    println!("Starting detached process...");
    let execution = prepare(Cmd::new("sleep").arg("0.1")).await?.detached();
    drop(execution);
    println!("Handle dropped, process keeps running on its own");

    // Without `detached()`, dropping the `Execution` kills and reaps
    // whatever it still holds: useful when a caller decides partway
    // through that it no longer cares about a spawned pipeline.
    println!("\nStarting another process and waiting on it explicitly...");
    let result = prepare(Cmd::new("sleep").arg("0.1")).await?.wait().await?;
    println!("Process finished: returncode={}", result.returncode);

    Ok(())
}
