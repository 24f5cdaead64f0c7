//! Feed data to a subprocess via stdin.
//!
//! Run with: cargo run --example stdin_feed

use proctree::{out, Cmd, STDIN};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    // Feed string data to the sort command
    let input = "banana\napple\ncherry\ndate\n";
    let sorted = out(Cmd::new("sort").feed(STDIN, input)).await?;
    println!("Sorted input:\n{}", String::from_utf8_lossy(&sorted));

    // Feed binary data
    let numbers: Vec<u8> = vec![3, 1, 4, 1, 5, 9, 2, 6];
    let hex_output = out(Cmd::new("xxd").feed(STDIN, numbers)).await?;
    println!("Hex dump:\n{}", String::from_utf8_lossy(&hex_output));

    // Feed the first stage of a pipeline
    let result = out(
        Cmd::new("cat").feed(STDIN, "hello\nworld\n") | Cmd::new("rev"),
    )
    .await?;
    println!("Reversed lines:\n{}", String::from_utf8_lossy(&result));

    Ok(())
}
