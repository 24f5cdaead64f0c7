//! Error types for the engine.
//!
//! A small closed enum covering the failure modes of spawn, I/O and the
//! convenience layer, expressed with `thiserror` rather than hand-written
//! `Display`/`Error` impls.

use std::ffi::OsString;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can be raised while preparing or awaiting a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The OS refused to create a child process (executable not found,
    /// permission denied, resource limits, ...).
    #[error("failed to spawn {argv:?}: {source}")]
    SpawnError {
        /// The resolved argv of the command that failed to spawn.
        argv: Vec<OsString>,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Unexpected failure reading or writing a pipe, or opening a
    /// redirected file.
    #[error("I/O error: {0}")]
    IoError(#[source] io::Error),

    /// Raised by the convenience layer (`run_checked`/`out_checked`) when
    /// the caller opted into exception-on-failure. The core engine never
    /// raises this on a clean non-zero exit; it only ever returns the code.
    #[error("command {argv:?} exited with status {returncode}")]
    NonZeroExit {
        /// Resolved argv of the root command/pipeline.
        argv: Vec<OsString>,
        /// Pipefail-computed exit code.
        returncode: i32,
        /// Captured stdout, if the caller requested capture.
        captured: Option<Vec<u8>>,
    },

    /// A programmer error: an invariant the planner relies on was violated
    /// before it ever touched the OS (e.g. a pipeline with fewer than two
    /// stages reaching `prepare`).
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(&'static str),
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> EngineError {
        EngineError::IoError(err)
    }
}
