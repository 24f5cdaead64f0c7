//! Shell-free composition and asynchronous execution of command pipelines.
//!
//! The data model is an immutable intermediate representation ([`Cmd`] and
//! [`Pipeline`], joined under the [`Node`] enum) describing *what* to run
//! without running anything. [`prepare`] turns a `Node` into a live
//! [`Execution`] (every process spawned, none yet awaited), and
//! [`Execution::wait`] drives it to completion, computing a `pipefail`-style
//! exit code: the exit status of the rightmost stage that failed, or `0` if
//! every stage succeeded.
//!
//! ```ignore
//! use proctree::{run, Cmd};
//!
//! let pipeline = Cmd::new("curl").arg("-s").arg(url)
//!     | Cmd::new("grep").arg("-c").arg(pattern);
//! let result = run(pipeline).await?;
//! println!("matches: {}", result.success());
//! ```
//!
//! Beyond plain argv and `argv[0]`, a [`Cmd`] can redirect any descriptor to
//! a file, feed it literal bytes, alias it to another descriptor (`2>&1`),
//! or wire it to a nested command tree: process substitution, exposed
//! either as a `/dev/fd/N` argument ([`Cmd::arg_sub_in`]/
//! [`Cmd::arg_sub_out`]) or as a direct redirect target
//! ([`Cmd::from_sub`]/[`Cmd::to_sub`]).
//!
//! This crate never shells out to `/bin/sh`: every operation here is one a
//! real shell performs as a syscall under the hood (`pipe`, `dup2`, `fork`,
//! `execve`, `/proc/self/fd`), exposed directly rather than through shell
//! syntax. It targets Linux; process substitution relies on `/proc`, and
//! there is no support for non-POSIX platforms (see `DESIGN.md`).

mod child_setup;
mod convenience;
mod error;
mod execution;
mod fdops;
mod io;
mod ir;
mod planner;
mod subst;

pub use convenience::{out, out_checked, run, run_checked};
pub use error::{EngineError, Result};
pub use execution::{ExecResult, Execution};
pub use ir::{ArgAtom, Cmd, FdOp, Node, Pipeline, STDERR, STDIN, STDOUT};

/// Spawns every process `node` describes, without waiting for any of them.
///
/// This is the engine's entry point proper; [`run`] and [`out`] are thin
/// convenience wrappers around `prepare(..).wait()` and a capturing variant
/// of it, respectively. Prefer those unless you need the processes running
/// before deciding how (or whether) to await them, e.g. to start several
/// independent pipelines concurrently before waiting on any of them.
pub async fn prepare(node: impl Into<ir::Node>) -> Result<Execution> {
    Execution::prepare(&node.into()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_reports_success_and_failure() {
        let ok = run(Cmd::new("true")).await.unwrap();
        assert!(ok.success());

        let failed = run(Cmd::new("false")).await.unwrap();
        assert!(!failed.success());
        assert_eq!(failed.returncode, 1);
    }

    #[tokio::test]
    async fn run_checked_raises_on_nonzero_exit() {
        let err = run_checked(Cmd::new("false")).await.unwrap_err();
        assert!(matches!(err, EngineError::NonZeroExit { returncode: 1, .. }));
    }

    #[tokio::test]
    async fn out_captures_stdout() {
        let bytes = out(Cmd::new("printf").arg("%s").arg("hello")).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn pipeline_runs_each_stage() {
        let pipeline = Cmd::new("printf").arg("%s\\n").arg("banana")
            | Cmd::new("tr").arg("a-z").arg("A-Z");
        let out_bytes = out(pipeline).await.unwrap();
        assert_eq!(out_bytes, b"BANANA\n");
    }

    #[tokio::test]
    async fn spawn_error_reports_argv() {
        let err = run(Cmd::new("/no/such/binary-proctree-test")).await.unwrap_err();
        match err {
            EngineError::SpawnError { argv, .. } => {
                assert_eq!(argv[0], "/no/such/binary-proctree-test");
            }
            other => panic!("expected SpawnError, got {other:?}"),
        }
    }
}
