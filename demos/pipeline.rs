//! Demonstrate OS-level pipelines.
//!
//! Run with: cargo run --example pipeline

use proctree::{out, Cmd};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Simple pipeline: generate data, transform it, capture output
    let data = out(
        Cmd::new("echo").args(["cherry", "apple", "banana"])
            | Cmd::new("tr").args([" ", "\n"])
            | Cmd::new("sort"),
    )
    .await?;
    println!("Sorted fruits:\n{}", String::from_utf8_lossy(&data));

    // Build a pipeline dynamically from a list of stages
    let stages = vec![
        Cmd::new("echo").args(["one", "two", "three"]),
        Cmd::new("tr").args([" ", "\n"]),
        Cmd::new("wc").arg("-l"),
    ];
    let line_count = out(stages.into_iter().collect::<proctree::Pipeline>()).await?;
    println!("Line count: {}", String::from_utf8_lossy(&line_count).trim());

    Ok(())
}
