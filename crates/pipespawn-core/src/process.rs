use crate::{ProcessError, SpawnConfig};
use std::fmt;
use std::io::{Read, Write};

/// Unique identifier for a process
pub type ProcessId = u32;

/// How a joined child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Process exited normally with the given exit code
    Exited(i32),
    /// Process was terminated by a signal (Unix only)
    Signaled(i32),
}

impl ExitStatus {
    /// Collapse the status into a plain integer exit code. Signal deaths
    /// report the shell convention of 128 plus the signal number, so an
    /// abnormal end is always nonzero.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled(signal) => 128 + *signal,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {code}"),
            ExitStatus::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Platform capability interface for one spawned child process
///
/// This trait defines the complete lifecycle surface the facade exposes:
/// spawn, stream access, non-blocking reads, liveness polling, termination,
/// joining, and resource release. It is implemented once per platform and
/// selected at compile time, so the public operation set stays identical
/// across backends.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Unwind every pipe, event, and handle acquired so far when any step of
///   `spawn` fails, leaving no live resource behind a returned error
/// - Keep `alive` composable with `join`: polling must not consume the exit
///   status a later `join` reports
/// - Make `read_stdout`/`read_stderr` return `Ok(0)` only at true
///   end-of-stream, driving any pending non-blocking or overlapped operation
///   to completion internally rather than surfacing "no data yet"
/// - Make `destroy` idempotent
pub trait ProcessBackend: Sized {
    /// Writable end of the child's stdin pipe
    type Writer: Write;
    /// Readable end of the child's stdout/stderr pipes
    type Reader: Read;

    /// Create the stdio pipes, spawn the child, and populate the handle.
    fn spawn(config: &SpawnConfig) -> Result<Self, ProcessError>;

    /// OS process identifier of the child.
    fn pid(&self) -> ProcessId;

    /// Writer feeding the child's stdin. `None` once closed by
    /// `close_stdin`, `join`, or `destroy`.
    fn stdin(&mut self) -> Option<&mut Self::Writer>;

    /// Reader over the child's stdout. `None` only after `destroy`.
    fn stdout(&mut self) -> Option<&mut Self::Reader>;

    /// Reader over the child's stderr. `None` when the streams were combined
    /// at spawn time, or after `destroy`.
    fn stderr(&mut self) -> Option<&mut Self::Reader>;

    /// Close the child's stdin pipe, signalling end of input. Safe to call
    /// repeatedly.
    fn close_stdin(&mut self);

    /// Read from the child's stdout. Returns the number of bytes copied;
    /// `Ok(0)` means the stream is drained and closed, never "try again".
    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError>;

    /// Read from the child's stderr, with the same end-of-stream convention
    /// as `read_stdout`. Returns `Ok(0)` for a combined-stream child.
    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError>;

    /// Non-blocking liveness poll. Never consumes the status a later `join`
    /// reports.
    fn alive(&mut self) -> bool;

    /// Forcibly end the child's execution (kill semantics, no graceful
    /// shutdown request).
    fn terminate(&mut self) -> Result<(), ProcessError>;

    /// Close stdin, block until the child exits, and report its status.
    fn join(&mut self) -> Result<ExitStatus, ProcessError>;

    /// Release every remaining resource held by the handle. Idempotent.
    fn destroy(&mut self) -> Result<(), ProcessError>;
}
