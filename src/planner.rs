//! Recursive spawn: turns a `Node` into a tree of live OS processes.
//!
//! Rather than wiring exactly "previous stage's stdout into this stage's
//! stdin" for a fixed three-descriptor table, each stage's full fd table is
//! computed by `fdops::plan` and realized by `child_setup::install`, and
//! process substitution is handled by recursing into the very same spawn
//! routine with a manufactured pipe fd standing in for the caller's real
//! stdin/stdout.
//!
//! Every fd this module creates is owned by a `std::os::fd::OwnedFd` local
//! variable for exactly as long as it needs to be open in this process; it
//! is closed either explicitly (immediately after the one spawn that was
//! meant to inherit it) or implicitly, by `?`-propagation unwinding the
//! local when a later step fails. There is no manual fd ownership ledger to
//! maintain for rollback, because the type system already guarantees every
//! such fd is closed exactly once.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tokio::process::{Child, Command};

use crate::child_setup;
use crate::error::{EngineError, Result};
use crate::fdops::{self, ResolvedOp};
use crate::ir::{ArgAtom, Cmd, FdOp, Node};
use crate::subst::{dev_fd_path, FdAllocator};

/// State threaded through a single `prepare()` call.
///
/// `spawned` owns every child process created so far, root or helper alike,
/// addressed by index so the recursive spawn functions can report which
/// indices are "roots" without fighting the borrow checker over who owns
/// the `Child` itself.
pub(crate) struct PrepareCtx {
    spawned: Vec<Child>,
    feeders: Vec<tokio::task::JoinHandle<()>>,
}

impl PrepareCtx {
    pub(crate) fn new() -> PrepareCtx {
        PrepareCtx { spawned: Vec::new(), feeders: Vec::new() }
    }

    fn register(&mut self, child: Child) -> usize {
        self.spawned.push(child);
        self.spawned.len() - 1
    }
}

/// The result of spawning a `Node`: which of `ctx.spawned`'s indices are
/// this node's own root-level stages, and which are process-substitution
/// helpers recursively spawned underneath it.
pub(crate) struct SpawnedNode {
    pub(crate) roots: Vec<usize>,
    pub(crate) helpers: Vec<usize>,
}

/// Runs `node` to completion of the *spawn* phase (every process started,
/// none yet waited for), rolling back everything already spawned if any
/// stage fails partway through.
pub(crate) async fn prepare_node(
    node: &Node,
) -> Result<(Vec<Child>, Vec<Child>, Vec<tokio::task::JoinHandle<()>>)> {
    let mut ctx = PrepareCtx::new();
    match spawn_node(node, &mut ctx, None, None).await {
        Ok(SpawnedNode { roots, helpers }) => {
            let mut is_root = vec![false; ctx.spawned.len()];
            for &i in &roots {
                is_root[i] = true;
            }
            let mut root_children = Vec::with_capacity(roots.len());
            let mut helper_children = Vec::with_capacity(helpers.len());
            for (i, child) in ctx.spawned.into_iter().enumerate() {
                if is_root[i] {
                    root_children.push(child);
                } else {
                    helper_children.push(child);
                }
            }
            Ok((root_children, helper_children, ctx.feeders))
        }
        Err(e) => {
            log::warn!(
                "prepare failed after spawning {} process(es), rolling back: {e}",
                ctx.spawned.len()
            );
            rollback(ctx.spawned, ctx.feeders).await;
            Err(e)
        }
    }
}

/// Like `prepare_node`, but additionally wires a freshly created pipe to
/// the root's own stdout (the last stage's, for a pipeline) and returns its
/// read end to the caller instead of leaving stdout inherited.
///
/// This is exactly the same wiring pipeline stages use to connect to each
/// other, generalized one level further: the caller of `prepare_node`
/// stands in as an implicit extra stage downstream of the root, reading
/// instead of spawning.
pub(crate) async fn prepare_node_capturing_stdout(
    node: &Node,
) -> Result<(Vec<Child>, Vec<Child>, Vec<tokio::task::JoinHandle<()>>, OwnedFd)> {
    let (r, w) = new_pipe()?;
    let mut ctx = PrepareCtx::new();
    match spawn_node(node, &mut ctx, None, Some(w.as_raw_fd())).await {
        Ok(SpawnedNode { roots, helpers }) => {
            drop(w);
            let mut is_root = vec![false; ctx.spawned.len()];
            for &i in &roots {
                is_root[i] = true;
            }
            let mut root_children = Vec::with_capacity(roots.len());
            let mut helper_children = Vec::with_capacity(helpers.len());
            for (i, child) in ctx.spawned.into_iter().enumerate() {
                if is_root[i] {
                    root_children.push(child);
                } else {
                    helper_children.push(child);
                }
            }
            Ok((root_children, helper_children, ctx.feeders, r))
        }
        Err(e) => {
            drop(w);
            log::warn!(
                "prepare failed after spawning {} process(es), rolling back: {e}",
                ctx.spawned.len()
            );
            rollback(ctx.spawned, ctx.feeders).await;
            Err(e)
        }
    }
}

async fn rollback(mut spawned: Vec<Child>, feeders: Vec<tokio::task::JoinHandle<()>>) {
    for child in &mut spawned {
        let _ = child.start_kill();
    }
    for mut child in spawned {
        let _ = child.wait().await;
    }
    for f in feeders {
        f.abort();
    }
}

/// Spawns `node`, wiring its first stage's stdin to `stdin` (a raw fd
/// already open in this process, or `None` to leave the inherited default)
/// and its last stage's stdout to `stdout` likewise.
pub(crate) fn spawn_node<'a>(
    node: &'a Node,
    ctx: &'a mut PrepareCtx,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<SpawnedNode>> + 'a>> {
    Box::pin(async move {
        match node {
            Node::Cmd(cmd) => {
                let (idx, helpers) = spawn_cmd(cmd, ctx, stdin, stdout).await?;
                Ok(SpawnedNode { roots: vec![idx], helpers })
            }
            Node::Pipeline(p) => {
                if p.stages.len() < 2 {
                    return Err(EngineError::InternalInvariantViolation(
                        "pipeline reached the planner with fewer than two stages",
                    ));
                }
                let n = p.stages.len();
                let mut roots = Vec::with_capacity(n);
                let mut helpers = Vec::new();
                let mut prev_read: Option<OwnedFd> = None;

                for (i, stage) in p.stages.iter().enumerate() {
                    let this_stdin = if i == 0 { stdin } else { prev_read.as_ref().map(AsRawFd::as_raw_fd) };

                    let (next_read, this_write, this_stdout) = if i == n - 1 {
                        (None, None, stdout)
                    } else {
                        let (r, w) = new_pipe()?;
                        let raw = w.as_raw_fd();
                        (Some(r), Some(w), Some(raw))
                    };

                    let (idx, stage_helpers) = spawn_cmd(stage, ctx, this_stdin, this_stdout).await?;
                    roots.push(idx);
                    helpers.extend(stage_helpers);

                    // Both the previous stage's read end and this stage's
                    // write end have now been inherited by a child; close
                    // the parent's copies.
                    drop(prev_read.take());
                    drop(this_write);
                    prev_read = next_read;
                }
                drop(prev_read);

                Ok(SpawnedNode { roots, helpers })
            }
        }
    })
}

/// Creates a pipe whose ends start out `O_CLOEXEC` (so they are never
/// accidentally inherited by some *other*, unrelated spawn elsewhere in the
/// process) and are made inheritable only for the one `Command::spawn` call
/// that is meant to receive them, immediately before that (synchronous,
/// non-yielding) call. See `DESIGN.md` for why this is race-free under the
/// engine's single-threaded execution model.
fn new_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let (r, w) = pipe2(OFlag::O_CLOEXEC).map_err(|e| EngineError::IoError(e.into()))?;
    Ok((r, w))
}

fn clear_cloexec(fds: impl Iterator<Item = RawFd>) {
    for fd in fds {
        unsafe {
            libc::fcntl(fd, libc::F_SETFD, 0);
        }
    }
}

/// Spawns a single `Cmd`: resolves process substitution in its argv and
/// fd_ops (recursing into `spawn_node` for each), builds the final fd plan,
/// and hands it to `child_setup::install` before calling `Command::spawn`.
///
/// Returns the new child's index in `ctx.spawned`, plus the indices of any
/// substitution helpers spawned underneath it.
async fn spawn_cmd(
    cmd: &Cmd,
    ctx: &mut PrepareCtx,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
) -> Result<(usize, Vec<usize>)> {
    // Identity-seeded: by default every one of the three standard streams
    // is left exactly as this process inherited it (`realize_dup2_table`
    // turns a `dst == src` pair into a no-op dup2, just clearing
    // `FD_CLOEXEC`). Pipeline/substitution wiring overrides 0 and/or 1 to
    // point at a pipe end instead; per-stage `fd_op`s, including a bare
    // `ToFd` against fd 2, are layered on top of this below.
    let mut entry: BTreeMap<RawFd, RawFd> = [(0, 0), (1, 1), (2, 2)].into_iter().collect();
    if let Some(fd) = stdin {
        entry.insert(0, fd);
    }
    if let Some(fd) = stdout {
        entry.insert(1, fd);
    }

    let mut helpers = Vec::new();
    let mut resolved_ops = Vec::new();
    // Fds created to satisfy this command's own substitutions/feeds, kept
    // open only until this command's own spawn call returns.
    let mut close_after_spawn: Vec<OwnedFd> = Vec::new();

    // Scoped to this command alone: the assigned fd numbers only need to
    // avoid collision within this one command's own argv, since each
    // argument-position substitution names a descriptor in *this* child's
    // fd table, not a process-wide namespace.
    let mut sub_fds = FdAllocator::new();
    let mut argv: Vec<OsString> = Vec::with_capacity(cmd.argv.len());
    for atom in &cmd.argv {
        match atom {
            ArgAtom::Literal(s) => argv.push(s.clone()),
            ArgAtom::SubIn(node) => {
                let fd_n = sub_fds.alloc();
                let (r, w) = new_pipe()?;
                let spawned = spawn_node(node, ctx, None, Some(w.as_raw_fd())).await?;
                drop(w);
                helpers.extend(spawned.roots);
                helpers.extend(spawned.helpers);
                resolved_ops.push(ResolvedOp::Inherit { fd: fd_n, raw: r.as_raw_fd() });
                close_after_spawn.push(r);
                argv.push(OsString::from(dev_fd_path(fd_n)));
            }
            ArgAtom::SubOut(node) => {
                let fd_n = sub_fds.alloc();
                let (r, w) = new_pipe()?;
                let spawned = spawn_node(node, ctx, Some(r.as_raw_fd()), None).await?;
                drop(r);
                helpers.extend(spawned.roots);
                helpers.extend(spawned.helpers);
                resolved_ops.push(ResolvedOp::Inherit { fd: fd_n, raw: w.as_raw_fd() });
                close_after_spawn.push(w);
                argv.push(OsString::from(dev_fd_path(fd_n)));
            }
        }
    }

    for op in &cmd.fd_ops {
        match op {
            FdOp::ToFile { fd, path, append } => {
                resolved_ops.push(ResolvedOp::ToFile { fd: *fd, path: path.clone(), append: *append });
            }
            FdOp::FromFile { fd, path } => {
                resolved_ops.push(ResolvedOp::FromFile { fd: *fd, path: path.clone() });
            }
            FdOp::FromData { fd, bytes } => {
                let (r, w) = new_pipe()?;
                resolved_ops.push(ResolvedOp::Inherit { fd: *fd, raw: r.as_raw_fd() });
                close_after_spawn.push(r);
                spawn_feeder(ctx, w, bytes.clone());
            }
            FdOp::ToFd { dst, src } => resolved_ops.push(ResolvedOp::ToFd { dst: *dst, src: *src }),
            FdOp::Close { fd } => resolved_ops.push(ResolvedOp::Close { fd: *fd }),
            FdOp::FromSub { fd, node } => {
                let (r, w) = new_pipe()?;
                let spawned = spawn_node(node, ctx, None, Some(w.as_raw_fd())).await?;
                drop(w);
                helpers.extend(spawned.roots);
                helpers.extend(spawned.helpers);
                resolved_ops.push(ResolvedOp::Inherit { fd: *fd, raw: r.as_raw_fd() });
                close_after_spawn.push(r);
            }
            FdOp::ToSub { fd, node } => {
                let (r, w) = new_pipe()?;
                let spawned = spawn_node(node, ctx, Some(r.as_raw_fd()), None).await?;
                drop(r);
                helpers.extend(spawned.roots);
                helpers.extend(spawned.helpers);
                resolved_ops.push(ResolvedOp::Inherit { fd: *fd, raw: w.as_raw_fd() });
                close_after_spawn.push(w);
            }
        }
    }

    // The 0/1/2 entries from pipeline wiring (if any) must also be made
    // inheritable: they are either real stdio (already inheritable) or
    // pipe ends we created with `O_CLOEXEC` above, one level up.
    let plan = fdops::plan(&entry, &resolved_ops);

    if let (Some(program), true) = (cmd.argv0_literal(), !argv.is_empty()) {
        debug_assert_eq!(program, argv[0].as_os_str());
    }
    let mut std_cmd = std::process::Command::new(&argv[0]);
    std_cmd.args(&argv[1..]);
    if let Some(overrides) = &cmd.env {
        for (k, v) in overrides {
            std_cmd.env(k, v);
        }
    }

    clear_cloexec(plan.pass_through());
    unsafe {
        child_setup::install(&mut std_cmd, plan, cmd.cwd.clone());
    }

    let mut tokio_cmd = Command::from(std_cmd);
    tokio_cmd.kill_on_drop(false);
    let spawn_result = tokio_cmd.spawn();

    // Whether spawn succeeded or failed, this command no longer needs its
    // own substitution/feed pipe ends open in this process.
    drop(close_after_spawn);

    let argv_for_error: Vec<OsString> = argv.clone();
    let child = spawn_result.map_err(|source| EngineError::SpawnError { argv: argv_for_error, source })?;
    let idx = ctx.register(child);
    Ok((idx, helpers))
}

fn spawn_feeder(ctx: &mut PrepareCtx, write_end: OwnedFd, bytes: Vec<u8>) {
    let handle = tokio::spawn(async move {
        let file = std::fs::File::from(write_end);
        match tokio::net::unix::pipe::Sender::from_file(file) {
            Ok(sender) => {
                if let Err(e) = crate::io::write_all(sender, &bytes).await {
                    log::debug!("background feed failed: {e}");
                }
            }
            Err(e) => log::debug!("failed to prepare background feed: {e}"),
        }
    });
    ctx.feeders.push(handle);
}
