//! Redirect subprocess I/O to files.
//!
//! Run with: cargo run --example redirect_file

use std::fs;

use proctree::{out, run, Cmd, STDERR, STDIN, STDOUT};

#[tokio::main(flavor = "current_thread")]
async fn main() -> proctree::Result<()> {
    let output_path = "/tmp/proctree_example_output.txt";
    let input_path = "/tmp/proctree_example_input.txt";

    // Write stdout to a file
    run(Cmd::new("echo").arg("This goes to a file").to_file(STDOUT, output_path)).await?;
    println!("File contents: {}", fs::read_to_string(output_path)?.trim());

    // Read stdin from a file
    fs::write(input_path, "file contents\n")?;
    let read_back = out(Cmd::new("cat").from_file(STDIN, input_path)).await?;
    println!("Read from file: {}", String::from_utf8_lossy(&read_back).trim());

    // Redirect to /dev/null
    run(Cmd::new("echo").arg("This output is discarded").to_file(STDOUT, "/dev/null")).await?;
    println!("Output sent to /dev/null");

    // Redirect stderr to a file, capture stdout
    let stdout = out(Cmd::new("sh")
        .arg("-c")
        .arg("echo stdout; echo stderr >&2")
        .to_file(STDERR, output_path))
    .await?;
    println!("Captured stdout: {}", String::from_utf8_lossy(&stdout).trim());
    println!("File has stderr: {}", fs::read_to_string(output_path)?.trim());

    fs::remove_file(output_path).ok();
    fs::remove_file(input_path).ok();

    Ok(())
}
