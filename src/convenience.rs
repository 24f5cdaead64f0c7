//! One-shot helpers for the common case of "run this and get the result".
//! The engine itself never raises on a non-zero exit, but these wrappers
//! offer an opt-in, exception-style variant for callers who want one.

use std::fs::File;

use crate::error::{EngineError, Result};
use crate::execution::{ExecResult, Execution};
use crate::ir::Node;
use crate::{io as async_io, planner};

/// Runs `node` to completion and returns its pipefail-computed exit code.
/// Never raises on a non-zero exit; see `run_checked` for that.
pub async fn run(node: impl Into<Node>) -> Result<ExecResult> {
    Execution::prepare(&node.into()).await?.wait().await
}

/// Like `run`, but returns `EngineError::NonZeroExit` instead of `Ok` when
/// the result is non-zero.
pub async fn run_checked(node: impl Into<Node>) -> Result<ExecResult> {
    let node = node.into();
    let argv = diagnostics_argv(&node);
    let result = run(node).await?;
    if result.success() {
        Ok(result)
    } else {
        Err(EngineError::NonZeroExit { argv, returncode: result.returncode, captured: None })
    }
}

/// Runs `node` to completion and returns everything it wrote to stdout.
/// Never raises on a non-zero exit; see `out_checked` for that.
pub async fn out(node: impl Into<Node>) -> Result<Vec<u8>> {
    let (bytes, _) = out_with_result(node).await?;
    Ok(bytes)
}

/// Like `out`, but returns `EngineError::NonZeroExit` (with the captured
/// bytes attached) instead of `Ok` when the result is non-zero.
pub async fn out_checked(node: impl Into<Node>) -> Result<Vec<u8>> {
    let node = node.into();
    let argv = diagnostics_argv(&node);
    let (bytes, result) = out_with_result(node).await?;
    if result.success() {
        Ok(bytes)
    } else {
        Err(EngineError::NonZeroExit {
            argv,
            returncode: result.returncode,
            captured: Some(bytes),
        })
    }
}

async fn out_with_result(node: impl Into<Node>) -> Result<(Vec<u8>, ExecResult)> {
    let node = node.into();
    let argv = diagnostics_argv(&node);
    let (roots, helpers, feeders, read_end) = planner::prepare_node_capturing_stdout(&node).await?;
    let execution = Execution::new(argv, roots, helpers, feeders);

    let receiver = tokio::net::unix::pipe::Receiver::from_file(File::from(read_end))?;
    let read_fut = async_io::read_all(receiver);
    let wait_fut = execution.wait();

    // Both sides must run concurrently: a stage that fills the pipe before
    // anyone reads it would otherwise deadlock against `wait()`, which
    // can't observe a blocked writer.
    let (bytes, result) = tokio::join!(read_fut, wait_fut);
    Ok((bytes?, result?))
}

fn diagnostics_argv(node: &Node) -> Vec<std::ffi::OsString> {
    match node {
        Node::Cmd(cmd) => cmd.argv_for_diagnostics(),
        Node::Pipeline(p) => p.stages.last().map(|c| c.argv_for_diagnostics()).unwrap_or_default(),
    }
}
