//! Process-substitution bookkeeping shared by the planner: the descending
//! `/dev/fd/N` allocator for argument-position substitution, and the path
//! format both substitution mechanisms expose to the child.
//!
//! The substitution mechanics themselves (spawning the helper, wiring its
//! stdin/stdout to a pipe end) are just another call into the planner's own
//! recursive spawn routine (`planner::spawn_node`), the same one pipeline
//! stages go through; there is no separate execution path to maintain here.

use std::os::unix::io::RawFd;

/// Highest fd number handed out for argument-position substitution,
/// counting down so as not to collide with descriptors a command's own
/// `fd_op`s or a large pipeline might otherwise be using.
const FIRST_SUB_FD: RawFd = 63;

/// Hands out descending fd numbers for `/dev/fd/N` arguments within a
/// single command's argv resolution.
#[derive(Debug)]
pub(crate) struct FdAllocator {
    next: RawFd,
}

impl FdAllocator {
    pub(crate) fn new() -> FdAllocator {
        FdAllocator { next: FIRST_SUB_FD }
    }

    pub(crate) fn alloc(&mut self) -> RawFd {
        let fd = self.next;
        self.next -= 1;
        fd
    }
}

/// The path argument-position substitution exposes in place of `SubIn`/
/// `SubOut`: Linux's `/proc`-backed `/dev/fd/N`, per the engine's POSIX/
/// Linux-only scope (see `DESIGN.md` Non-goals).
pub(crate) fn dev_fd_path(fd: RawFd) -> String {
    format!("/dev/fd/{fd}")
}
