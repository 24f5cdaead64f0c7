//! Pure computation of a child's final fd table.
//!
//! This module performs no I/O. It takes the fd table a child starts with
//! (the descriptors the planner is willing to pass through the spawn
//! boundary) and a left-to-right sequence of resolved operations, and
//! produces the logical table the child should end up with. The spawn step
//! in `child_setup.rs` is what actually realizes this table with `dup2`/
//! `close` calls once real file descriptors exist.
//!
//! The left-to-right-wins resolution generalizes to an arbitrary fd table
//! what a hardcoded three-descriptor (0, 1, 2) redirect sequence would
//! otherwise need to special-case by hand.

use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// An operation already resolved to concrete, already-open inputs: no
/// `FdOp::FromData`/`FromSub`/`ToSub` remain by the time this reaches the
/// simulator: the planner has turned those into pipes and plain
/// `Inherit` entries pointing at the raw fd it materialized.
#[derive(Debug, Clone)]
pub enum ResolvedOp {
    /// See `FdOp::ToFile`. The open happens later, in the child.
    ToFile { fd: RawFd, path: PathBuf, append: bool },
    /// See `FdOp::FromFile`. The open happens later, in the child.
    FromFile { fd: RawFd, path: PathBuf },
    /// `fd` should take the value currently open at `raw` in the planner's
    /// own process (a pipe end, a substitution helper's pipe, ...).
    Inherit { fd: RawFd, raw: RawFd },
    /// See `FdOp::ToFd`.
    ToFd { dst: RawFd, src: RawFd },
    /// See `FdOp::Close`.
    Close { fd: RawFd },
}

/// Where a destination descriptor's final value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Dup from this raw fd, already open in the planner's process.
    Inherited(RawFd),
    /// Dup from the result of opening `opens[idx]`, which happens in the
    /// child after the simulated `chdir`.
    Open(usize),
    /// Explicitly closed.
    Closed,
}

/// A file to be opened in the child, and the destination(s) that should
/// end up pointing at it.
#[derive(Debug, Clone)]
pub struct OpenSpec {
    /// Path to open, resolved against the command's `cwd`.
    pub path: PathBuf,
    /// Open for reading rather than writing.
    pub read: bool,
    /// Open in append mode (ignored when `read` is true).
    pub append: bool,
}

/// The computed final fd table plus the opens it references.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Destination fd -> final source.
    pub table: BTreeMap<RawFd, Slot>,
    /// Files that must be opened in the child, in order, before the table
    /// is realized.
    pub opens: Vec<OpenSpec>,
}

impl Plan {
    /// The set of raw, already-open fds that must be made inheritable
    /// (not `O_CLOEXEC`) across the fork so the child-side setup can see
    /// them. This is exactly the set of `Slot::Inherited` sources appearing
    /// anywhere in the final table.
    pub fn pass_through(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.table.values().filter_map(|slot| match slot {
            Slot::Inherited(raw) => Some(*raw),
            _ => None,
        })
    }
}

/// Computes the final fd table for a child that starts with `entry`
/// (destination fd -> already-open raw fd in the planner) and then applies
/// `ops` strictly left to right.
pub fn plan(entry: &BTreeMap<RawFd, RawFd>, ops: &[ResolvedOp]) -> Plan {
    let mut table: BTreeMap<RawFd, Slot> =
        entry.iter().map(|(&fd, &raw)| (fd, Slot::Inherited(raw))).collect();
    let mut opens = Vec::new();

    for op in ops {
        match op {
            ResolvedOp::ToFile { fd, path, append } => {
                opens.push(OpenSpec { path: path.clone(), read: false, append: *append });
                table.insert(*fd, Slot::Open(opens.len() - 1));
            }
            ResolvedOp::FromFile { fd, path } => {
                opens.push(OpenSpec { path: path.clone(), read: true, append: false });
                table.insert(*fd, Slot::Open(opens.len() - 1));
            }
            ResolvedOp::Inherit { fd, raw } => {
                table.insert(*fd, Slot::Inherited(*raw));
            }
            ResolvedOp::ToFd { dst, src } => {
                // The *current* source of `src`, not `src` itself: this is
                // what makes `2>&1 >file` mirror the original stdout even
                // after stdout has since been redirected to a file.
                let current = table.get(src).copied().unwrap_or(Slot::Closed);
                table.insert(*dst, current);
            }
            ResolvedOp::Close { fd } => {
                table.insert(*fd, Slot::Closed);
            }
        }
    }

    Plan { table, opens }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_stdio() -> BTreeMap<RawFd, RawFd> {
        [(0, 100), (1, 101), (2, 102)].into_iter().collect()
    }

    #[test]
    fn later_ops_override_earlier_ones() {
        let p = plan(
            &entry_stdio(),
            &[
                ResolvedOp::Inherit { fd: 1, raw: 200 },
                ResolvedOp::Inherit { fd: 1, raw: 201 },
            ],
        );
        assert_eq!(p.table[&1], Slot::Inherited(201));
    }

    #[test]
    fn to_fd_resolves_against_current_source_not_recursively() {
        // Mirrors `2>&1 >file`: stderr should end up at the *original*
        // stdout fd, not at the file stdout was redirected to.
        let p = plan(
            &entry_stdio(),
            &[
                ResolvedOp::ToFd { dst: 2, src: 1 },
                ResolvedOp::ToFile { fd: 1, path: "out.txt".into(), append: false },
            ],
        );
        assert_eq!(p.table[&2], Slot::Inherited(101));
        assert!(matches!(p.table[&1], Slot::Open(_)));
    }

    #[test]
    fn close_unassigns_the_descriptor() {
        let p = plan(&entry_stdio(), &[ResolvedOp::Close { fd: 0 }]);
        assert_eq!(p.table[&0], Slot::Closed);
    }

    #[test]
    fn pass_through_collects_every_inherited_source() {
        let p = plan(
            &entry_stdio(),
            &[ResolvedOp::Inherit { fd: 3, raw: 300 }],
        );
        let mut raws: Vec<_> = p.pass_through().collect();
        raws.sort();
        assert_eq!(raws, vec![100, 101, 102, 300]);
    }

    #[test]
    fn identical_op_sequences_yield_identical_tables() {
        let ops1 = vec![
            ResolvedOp::ToFile { fd: 1, path: "a".into(), append: false },
            ResolvedOp::ToFd { dst: 2, src: 1 },
        ];
        let ops2 = ops1.clone();
        let p1 = plan(&entry_stdio(), &ops1);
        let p2 = plan(&entry_stdio(), &ops2);
        assert_eq!(p1.table, p2.table);
    }
}
