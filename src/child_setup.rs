//! Realizes a `fdops::Plan` inside the child, via a `pre_exec` closure.
//!
//! Rather than three hardcoded `dup2` calls for stdin/stdout/stderr, an
//! arbitrary table of destinations is realized from a mix of already-open
//! (inherited) descriptors and files opened here, in the child, after
//! `chdir` (see `DESIGN.md`, Open Question #2).
//!
//! Everything in this module runs after `fork` and before `exec`, so it is
//! restricted to async-signal-safe operations: raw `libc` calls only, no
//! allocation-heavy standard library machinery beyond what's unavoidable to
//! build the path `CString`s ahead of time.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};

use crate::fdops::{Plan, Slot};

/// Installs a `pre_exec` closure on `cmd` that realizes `plan`, chdir'ing
/// to `cwd` first if given.
///
/// # Safety
///
/// Same obligations as `std::os::unix::process::CommandExt::pre_exec`: the
/// closure must not be called other than by `Command::spawn` in the forked
/// child, and the caller must ensure `plan`'s `Slot::Inherited` fds are
/// actually still open and inheritable (not `O_CLOEXEC`) at spawn time.
pub unsafe fn install(cmd: &mut std::process::Command, plan: Plan, cwd: Option<PathBuf>) {
    cmd.pre_exec(move || realize(&plan, cwd.as_deref()));
}

fn realize(plan: &Plan, cwd: Option<&Path>) -> io::Result<()> {
    if let Some(dir) = cwd {
        let c = path_to_cstring(dir)?;
        if unsafe { libc::chdir(c.as_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    let mut opened: Vec<RawFd> = Vec::with_capacity(plan.opens.len());
    for spec in &plan.opens {
        let path = path_to_cstring(&spec.path)?;
        let flags = if spec.read {
            libc::O_RDONLY
        } else if spec.append {
            libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND
        } else {
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC
        };
        let fd = unsafe { libc::open(path.as_ptr(), flags, 0o666) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        opened.push(fd);
    }

    let mut sources: BTreeMap<RawFd, RawFd> = BTreeMap::new();
    let mut to_close: Vec<RawFd> = Vec::new();
    for (&dst, slot) in &plan.table {
        match *slot {
            Slot::Inherited(raw) => {
                sources.insert(dst, raw);
            }
            Slot::Open(idx) => {
                sources.insert(dst, opened[idx]);
            }
            Slot::Closed => to_close.push(dst),
        }
    }

    realize_dup2_table(&sources)?;

    for fd in to_close {
        unsafe { libc::close(fd) };
    }

    // Anything that was only a source, never itself a kept destination,
    // is a temporary we no longer need: the freshly-opened file descriptor
    // once it's been dup'd into place, or a pass-through pipe end this
    // child doesn't retain under its own number.
    let kept: BTreeSet<RawFd> = sources.keys().copied().collect();
    let mut leftovers: BTreeSet<RawFd> = sources.values().copied().collect();
    leftovers.retain(|raw| !kept.contains(raw));
    for raw in leftovers {
        unsafe { libc::close(raw) };
    }

    Ok(())
}

/// Realizes an arbitrary `dst -> src` mapping with `dup2`, correctly
/// handling chains and cycles (e.g. swapping fd 1 and fd 2) by rescuing,
/// via `dup`, any source that is itself about to be overwritten by another
/// entry in the same mapping, before any `dup2` call runs.
fn realize_dup2_table(mapping: &BTreeMap<RawFd, RawFd>) -> io::Result<()> {
    let mut rescued: BTreeMap<RawFd, RawFd> = BTreeMap::new();

    for &src in mapping.values() {
        if rescued.contains_key(&src) {
            continue;
        }
        if let Some(&src_of_src) = mapping.get(&src) {
            if src_of_src != src {
                let dup = unsafe { libc::fcntl(src, libc::F_DUPFD_CLOEXEC, 0) };
                if dup < 0 {
                    return Err(io::Error::last_os_error());
                }
                rescued.insert(src, dup);
            }
        }
    }

    for (&dst, &src) in mapping {
        let real_src = rescued.get(&src).copied().unwrap_or(src);
        if real_src != dst {
            if unsafe { libc::dup2(real_src, dst) } < 0 {
                return Err(io::Error::last_os_error());
            }
        } else {
            // dup2(fd, fd) leaves FD_CLOEXEC untouched on some kernels;
            // clear it explicitly so the descriptor survives into exec.
            unsafe { libc::fcntl(dst, libc::F_SETFD, 0) };
        }
    }

    for dup in rescued.into_values() {
        unsafe { libc::close(dup) };
    }

    Ok(())
}

fn path_to_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}
