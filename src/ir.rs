//! Immutable intermediate representation of commands, pipelines and
//! per-descriptor operations.
//!
//! Every builder method here takes `self` by value and returns a new value,
//! a persistent-record discipline that keeps `Cmd`/`Pipeline` as plain data,
//! distinct from anything that already knows how to spawn itself.

use std::ffi::{OsStr, OsString};
use std::ops::BitOr;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

/// Well-known standard stream descriptors.
pub const STDIN: RawFd = 0;
/// Well-known standard stream descriptors.
pub const STDOUT: RawFd = 1;
/// Well-known standard stream descriptors.
pub const STDERR: RawFd = 2;

/// One element of a command's argument list.
///
/// Most atoms are plain strings; `SubIn`/`SubOut` are opaque references to a
/// nested command tree that the planner resolves to a `/dev/fd/N` path
/// immediately before spawn (see `subst.rs`).
#[derive(Debug, Clone)]
pub enum ArgAtom {
    /// A literal argument, or a path-like value normalized to a string.
    Literal(OsString),
    /// `SubIn(cmd)`: expose `cmd`'s stdout as a readable path argument.
    SubIn(Box<Node>),
    /// `SubOut(cmd)`: expose `cmd`'s stdin as a writable path argument.
    SubOut(Box<Node>),
}

/// A single file-descriptor operation applied to a command's child fd table.
///
/// This is a closed sum type by design (see `DESIGN.md`): the planner
/// exhaustively matches on it rather than dispatching through a trait
/// object, because the set of operations is fixed and small.
#[derive(Debug, Clone)]
pub enum FdOp {
    /// Open `path` for writing (truncating unless `append`), and direct
    /// `fd` to it.
    ToFile {
        /// Destination descriptor in the child.
        fd: RawFd,
        /// Path to open. Resolved against the command's `cwd`, in the
        /// child, after the simulated `chdir` (see `DESIGN.md` open
        /// question #2).
        path: PathBuf,
        /// Open in append mode instead of truncating.
        append: bool,
    },
    /// Open `path` for reading, and direct `fd` to it.
    FromFile {
        /// Destination descriptor in the child.
        fd: RawFd,
        /// Path to open.
        path: PathBuf,
    },
    /// The parent creates a pipe, asynchronously writes `bytes` to the
    /// write end, and directs `fd` to the read end.
    FromData {
        /// Destination descriptor in the child.
        fd: RawFd,
        /// Bytes fed to the child on this descriptor.
        bytes: Vec<u8>,
    },
    /// Make `dst` alias the *current* source of `src` in the child
    /// (dup2 semantics; `src` is a descriptor from the child's own
    /// perspective, resolved against prior ops in the same sequence).
    ToFd {
        /// Destination descriptor.
        dst: RawFd,
        /// Source descriptor, resolved against earlier ops.
        src: RawFd,
    },
    /// Close `fd` in the child.
    Close {
        /// Descriptor to close.
        fd: RawFd,
    },
    /// Process substitution as a redirect target: the parent spawns
    /// `node`, and connects the read end of its output pipe to `fd`.
    FromSub {
        /// Destination descriptor.
        fd: RawFd,
        /// Command tree whose stdout feeds `fd`.
        node: Box<Node>,
    },
    /// Process substitution as a redirect target: the parent spawns
    /// `node`, and connects the write end of its input pipe to `fd`.
    ToSub {
        /// Destination descriptor.
        fd: RawFd,
        /// Command tree whose stdin is fed from `fd`.
        node: Box<Node>,
    },
}

/// An immutable description of a single external command.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    pub(crate) argv: Vec<ArgAtom>,
    pub(crate) fd_ops: Vec<FdOp>,
    pub(crate) env: Option<Vec<(OsString, OsString)>>,
    pub(crate) cwd: Option<PathBuf>,
}

impl Cmd {
    /// Starts building a command with `program` as `argv[0]`.
    pub fn new(program: impl AsRef<OsStr>) -> Cmd {
        Cmd {
            argv: vec![ArgAtom::Literal(program.as_ref().to_owned())],
            fd_ops: Vec::new(),
            env: None,
            cwd: None,
        }
    }

    /// Appends a literal argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Cmd {
        self.argv.push(ArgAtom::Literal(arg.as_ref().to_owned()));
        self
    }

    /// Appends several literal arguments.
    pub fn args<I, S>(mut self, args: I) -> Cmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.argv
            .extend(args.into_iter().map(|a| ArgAtom::Literal(a.as_ref().to_owned())));
        self
    }

    /// Appends a process-substitution argument exposing `node`'s stdout as
    /// a `/dev/fd/N` path.
    pub fn arg_sub_in(mut self, node: impl Into<Node>) -> Cmd {
        self.argv.push(ArgAtom::SubIn(Box::new(node.into())));
        self
    }

    /// Appends a process-substitution argument exposing `node`'s stdin as
    /// a `/dev/fd/N` path.
    pub fn arg_sub_out(mut self, node: impl Into<Node>) -> Cmd {
        self.argv.push(ArgAtom::SubOut(Box::new(node.into())));
        self
    }

    /// Sets an environment variable, replacing the child's environment with
    /// the parent's plus any overrides applied via `env` (never a bare,
    /// unrelated environment).
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Cmd {
        self.env
            .get_or_insert_with(Vec::new)
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Sets the child's working directory.
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Cmd {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Appends a raw fd operation to this command's op sequence.
    pub fn fd_op(mut self, op: FdOp) -> Cmd {
        self.fd_ops.push(op);
        self
    }

    /// `> path`: truncate `path` and direct `fd` (default: stdout) to it.
    pub fn to_file(self, fd: RawFd, path: impl AsRef<Path>) -> Cmd {
        self.fd_op(FdOp::ToFile { fd, path: path.as_ref().to_owned(), append: false })
    }

    /// `>> path`: append to `path` and direct `fd` (default: stdout) to it.
    pub fn append_file(self, fd: RawFd, path: impl AsRef<Path>) -> Cmd {
        self.fd_op(FdOp::ToFile { fd, path: path.as_ref().to_owned(), append: true })
    }

    /// `< path`: direct `fd` (default: stdin) to read from `path`.
    pub fn from_file(self, fd: RawFd, path: impl AsRef<Path>) -> Cmd {
        self.fd_op(FdOp::FromFile { fd, path: path.as_ref().to_owned() })
    }

    /// Feeds `bytes` to `fd` (default: stdin) via an anonymous pipe that the
    /// planner writes to in the background.
    pub fn feed(self, fd: RawFd, bytes: impl Into<Vec<u8>>) -> Cmd {
        self.fd_op(FdOp::FromData { fd, bytes: bytes.into() })
    }

    /// `dst>&src`: make `dst` alias the current source of `src`.
    pub fn to_fd(self, dst: RawFd, src: RawFd) -> Cmd {
        self.fd_op(FdOp::ToFd { dst, src })
    }

    /// `fd<&-`: close `fd` in the child.
    pub fn close_fd(self, fd: RawFd) -> Cmd {
        self.fd_op(FdOp::Close { fd })
    }

    /// `< <(node)`: redirect-position process substitution feeding `fd`.
    pub fn from_sub(self, fd: RawFd, node: impl Into<Node>) -> Cmd {
        self.fd_op(FdOp::FromSub { fd, node: Box::new(node.into()) })
    }

    /// `> >(node)`: redirect-position process substitution draining `fd`.
    pub fn to_sub(self, fd: RawFd, node: impl Into<Node>) -> Cmd {
        self.fd_op(FdOp::ToSub { fd, node: Box::new(node.into()) })
    }

    pub(crate) fn argv0_literal(&self) -> Option<&OsStr> {
        match self.argv.first() {
            Some(ArgAtom::Literal(s)) => Some(s.as_os_str()),
            _ => None,
        }
    }

    /// Renders this command's argv for error messages and diagnostics,
    /// ahead of spawn. Substitution arguments can't be rendered as the
    /// `/dev/fd/N` path they'll resolve to without actually spawning their
    /// helper, so they show up as a fixed placeholder instead.
    pub(crate) fn argv_for_diagnostics(&self) -> Vec<OsString> {
        self.argv
            .iter()
            .map(|atom| match atom {
                ArgAtom::Literal(s) => s.clone(),
                ArgAtom::SubIn(_) | ArgAtom::SubOut(_) => OsString::from("<process substitution>"),
            })
            .collect()
    }
}

impl BitOr<Cmd> for Cmd {
    type Output = Pipeline;

    /// `a | b` builds a two-stage pipeline.
    fn bitor(self, rhs: Cmd) -> Pipeline {
        Pipeline::new(vec![Node::Cmd(self), Node::Cmd(rhs)])
    }
}

impl BitOr<Pipeline> for Cmd {
    type Output = Pipeline;

    fn bitor(self, rhs: Pipeline) -> Pipeline {
        Pipeline::new(vec![Node::Cmd(self), Node::Pipeline(rhs)])
    }
}

/// An immutable, flattened sequence of `Cmd` stages, each stage's stdout
/// connected to the next stage's stdin, like a shell pipeline.
///
/// Invariant: a `Pipeline` always has at least two stages; nested
/// pipelines are flattened at construction time (`A | (B | C)` and
/// `(A | B) | C` both yield the stage list `[A, B, C]`).
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(crate) stages: Vec<Cmd>,
}

impl Pipeline {
    /// Builds a pipeline from a sequence of stages, flattening any nested
    /// pipelines.
    pub fn new(stages: Vec<Node>) -> Pipeline {
        let mut flat = Vec::with_capacity(stages.len());
        for stage in stages {
            flatten_into(stage, &mut flat);
        }
        Pipeline { stages: flat }
    }
}

fn flatten_into(node: Node, out: &mut Vec<Cmd>) {
    match node {
        Node::Cmd(cmd) => out.push(cmd),
        Node::Pipeline(p) => out.extend(p.stages),
    }
}

impl BitOr<Cmd> for Pipeline {
    type Output = Pipeline;

    fn bitor(mut self, rhs: Cmd) -> Pipeline {
        self.stages.push(rhs);
        self
    }
}

impl BitOr<Pipeline> for Pipeline {
    type Output = Pipeline;

    fn bitor(mut self, rhs: Pipeline) -> Pipeline {
        self.stages.extend(rhs.stages);
        self
    }
}

impl FromIterator<Cmd> for Pipeline {
    fn from_iter<I: IntoIterator<Item = Cmd>>(iter: I) -> Pipeline {
        Pipeline { stages: iter.into_iter().collect() }
    }
}

/// The root type accepted by `prepare`: either a single command or a
/// pipeline of commands.
#[derive(Debug, Clone)]
pub enum Node {
    /// A single command.
    Cmd(Cmd),
    /// A pipeline of two or more commands.
    Pipeline(Pipeline),
}

impl From<Cmd> for Node {
    fn from(cmd: Cmd) -> Node {
        Node::Cmd(cmd)
    }
}

impl From<Pipeline> for Node {
    fn from(p: Pipeline) -> Node {
        Node::Pipeline(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_is_associative() {
        let a = Cmd::new("a");
        let b = Cmd::new("b");
        let c = Cmd::new("c");

        let left: Pipeline = Pipeline::new(vec![
            Node::Pipeline(Pipeline::new(vec![Node::Cmd(a.clone()), Node::Cmd(b.clone())])),
            Node::Cmd(c.clone()),
        ]);
        let right: Pipeline = Pipeline::new(vec![
            Node::Cmd(a.clone()),
            Node::Pipeline(Pipeline::new(vec![Node::Cmd(b.clone()), Node::Cmd(c.clone())])),
        ]);

        fn names(p: &Pipeline) -> Vec<&OsStr> {
            p.stages.iter().map(|c| c.argv0_literal().unwrap()).collect()
        }
        assert_eq!(names(&left), names(&right));
        assert_eq!(left.stages.len(), 3);
    }

    #[test]
    fn bitor_builds_and_extends_pipelines() {
        let p = Cmd::new("a") | Cmd::new("b") | Cmd::new("c");
        assert_eq!(p.stages.len(), 3);
    }

    #[test]
    fn new_cmd_has_nonempty_argv0() {
        let c = Cmd::new("true");
        assert_eq!(c.argv0_literal(), Some(OsStr::new("true")));
    }
}
