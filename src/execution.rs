//! The live handle returned by `prepare`: a spawned, not-yet-awaited
//! process tree, and its `wait()`/cleanup lifecycle.
//!
//! This wraps a tree of root stages plus substitution helpers, reaped
//! asynchronously rather than one child reaped synchronously with
//! `waitpid`. The `Drop` impl is a safety net expressed as a detached
//! background task rather than a blocking, best-effort call, since nothing
//! async can run inside a synchronous `Drop`.

use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::error::{EngineError, Result};
use crate::ir::Node;
use crate::planner;

/// A spawned, not-yet-awaited command or pipeline.
///
/// Dropping an `Execution` without calling `wait()` is safe: the
/// destructor arranges for every live process to be killed and reaped on
/// whatever `tokio` runtime is current, but it discards the exit code, so
/// `wait()` is the normal way to consume one. Call `detached()` first if
/// leaving the tree running past this value's lifetime is intentional.
pub struct Execution {
    root_argv: Vec<OsString>,
    roots: Vec<Child>,
    helpers: Vec<Child>,
    feeders: Vec<JoinHandle<()>>,
    detached: bool,
}

/// The outcome of awaiting an `Execution`.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Pipefail-style return code: the exit status of the rightmost root
    /// stage that exited non-zero, or `0` if every root stage succeeded.
    /// Signal-terminated stages are encoded as `128 + signal number`.
    /// Substitution helpers never contribute to this value.
    pub returncode: i32,
    /// The resolved argv of the root command, or of the pipeline's last
    /// stage when the root is a pipeline (used only for diagnostics).
    pub cmd: Vec<OsString>,
}

impl ExecResult {
    /// Whether every root stage exited with status 0.
    pub fn success(&self) -> bool {
        self.returncode == 0
    }
}

impl Execution {
    pub(crate) fn new(
        root_argv: Vec<OsString>,
        roots: Vec<Child>,
        helpers: Vec<Child>,
        feeders: Vec<JoinHandle<()>>,
    ) -> Execution {
        Execution { root_argv, roots, helpers, feeders, detached: false }
    }

    /// Prepares `node`'s processes without waiting for them.
    pub async fn prepare(node: &Node) -> Result<Execution> {
        let argv = root_argv_for_diagnostics(node);
        let (roots, helpers, feeders) = planner::prepare_node(node).await?;
        Ok(Execution::new(argv, roots, helpers, feeders))
    }

    /// Marks this tree as intentionally long-lived: dropping the returned
    /// value will not kill or reap anything.
    pub fn detached(mut self) -> Execution {
        self.detached = true;
        self
    }

    /// Awaits every root stage to termination, computes the pipefail exit
    /// code, and cleans up: any substitution helper still alive once the
    /// roots are done is killed rather than waited for indefinitely, held
    /// descriptors are closed by virtue of the `Child`/`OwnedFd` values
    /// being dropped, and every background feeder task is joined.
    ///
    /// This reap-and-clean step runs on a detached `tokio` task so that it
    /// runs to completion even if the future returned by this method is
    /// itself dropped before resolving (futures are cancelled by drop, not
    /// by an exception that a handler could catch); spawning the cleanup
    /// off this future's own lifetime is how this engine gets the same
    /// guarantee (see `DESIGN.md`).
    pub async fn wait(mut self) -> Result<ExecResult> {
        let roots = std::mem::take(&mut self.roots);
        let helpers = std::mem::take(&mut self.helpers);
        let feeders = std::mem::take(&mut self.feeders);
        let argv = self.root_argv.clone();

        let reap = tokio::spawn(reap_roots_then_helpers(roots, helpers, feeders));
        let statuses = reap.await.map_err(join_error)?;

        let mut returncode = 0;
        for status in statuses {
            let status = status.map_err(EngineError::IoError)?;
            let code = encode_exit_status(status);
            if code != 0 {
                returncode = code;
            }
        }
        Ok(ExecResult { returncode, cmd: argv })
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let roots = std::mem::take(&mut self.roots);
        let helpers = std::mem::take(&mut self.helpers);
        let feeders = std::mem::take(&mut self.feeders);
        if roots.is_empty() && helpers.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(kill_and_reap_all(roots, helpers, feeders));
            }
            Err(_) => {
                log::warn!(
                    "Execution for {:?} dropped outside a tokio runtime; \
                     {} process(es) may be left running",
                    self.root_argv,
                    roots.len() + helpers.len()
                );
            }
        }
    }
}

async fn reap_roots_then_helpers(
    roots: Vec<Child>,
    mut helpers: Vec<Child>,
    feeders: Vec<JoinHandle<()>>,
) -> Vec<std::io::Result<ExitStatus>> {
    let mut statuses = Vec::with_capacity(roots.len());
    for mut child in roots {
        statuses.push(child.wait().await);
    }
    // The roots are done; any helper still running (a process-substitution
    // side the consumer never finished draining) is orphaned and killed
    // rather than waited for indefinitely. Its exit status is discarded:
    // substitution helpers never contribute to the pipefail result.
    for child in &mut helpers {
        let _ = child.start_kill();
    }
    for mut child in helpers {
        let _ = child.wait().await;
    }
    for f in feeders {
        let _ = f.await;
    }
    statuses
}

async fn kill_and_reap_all(mut roots: Vec<Child>, mut helpers: Vec<Child>, feeders: Vec<JoinHandle<()>>) {
    for child in roots.iter_mut().chain(helpers.iter_mut()) {
        let _ = child.start_kill();
    }
    for mut child in roots.into_iter().chain(helpers) {
        let _ = child.wait().await;
    }
    for f in feeders {
        f.abort();
    }
}

fn join_error(e: tokio::task::JoinError) -> EngineError {
    EngineError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Encodes an `ExitStatus` the way a POSIX shell reports it: the raw exit
/// code if the process exited normally, or `128 + signal` if it was killed
/// by a signal.
fn encode_exit_status(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

/// Best-effort argv for error messages and `ExecResult::cmd`: substitution
/// atoms can't be rendered ahead of spawn (their own argv isn't resolved to
/// a path yet), so they show up as a placeholder rather than holding up
/// diagnostics on a recursive walk of their own.
fn root_argv_for_diagnostics(node: &Node) -> Vec<OsString> {
    let cmd = match node {
        Node::Cmd(cmd) => cmd,
        Node::Pipeline(p) => match p.stages.last() {
            Some(cmd) => cmd,
            None => return Vec::new(),
        },
    };
    cmd.argv_for_diagnostics()
}
