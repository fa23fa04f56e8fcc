use pipespawn_core::{ExitStatus, ProcessBackend, ProcessError, ProcessId, SpawnConfig};
use tracing::debug;

#[cfg(unix)]
use pipespawn_unix::UnixProcess as PlatformProcess;
#[cfg(windows)]
use pipespawn_windows::WindowsProcess as PlatformProcess;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Writer feeding the child's standard input.
pub type ChildStdin = <PlatformProcess as ProcessBackend>::Writer;
/// Reader over the child's standard output.
pub type ChildStdout = <PlatformProcess as ProcessBackend>::Reader;
/// Reader over the child's standard error.
pub type ChildStderr = <PlatformProcess as ProcessBackend>::Reader;

/// A spawned child process and its three communication channels
///
/// The handle owns the parent-side pipe ends and the OS process reference.
/// Ownership is single and linear: spawn, use, then either let the handle
/// drop or call [`destroy`](Child::destroy) explicitly. The handle is meant
/// for exclusive use by one thread; no cross-thread safety is claimed for
/// concurrent calls on the same handle.
pub struct Child {
    inner: PlatformProcess,
}

impl Child {
    /// Spawn a child process from the given configuration.
    ///
    /// Pipes are created for all three standard streams (two when stdout and
    /// stderr are combined), the child is started with its streams
    /// redirected, and the parent-side ends are stored in the returned
    /// handle. Any failure along the way unwinds every resource already
    /// acquired; no partially-populated handle is ever returned.
    pub fn spawn(config: &SpawnConfig) -> Result<Self, ProcessError> {
        debug!(program = ?config.program(), "spawning child process");
        Ok(Self {
            inner: PlatformProcess::spawn(config)?,
        })
    }

    /// OS process identifier of the child.
    pub fn pid(&self) -> ProcessId {
        self.inner.pid()
    }

    /// Writer feeding the child's standard input, or `None` once it has been
    /// closed by [`close_stdin`](Child::close_stdin), [`join`](Child::join),
    /// or [`destroy`](Child::destroy).
    pub fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.inner.stdin()
    }

    /// Reader over the child's standard output.
    pub fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.inner.stdout()
    }

    /// Reader over the child's standard error.
    ///
    /// Returns `None` for a child spawned with combined stdout/stderr; read
    /// the merged output from [`stdout`](Child::stdout) instead.
    pub fn stderr(&mut self) -> Option<&mut ChildStderr> {
        self.inner.stderr()
    }

    /// Close the child's stdin pipe, signalling end of input. Safe to call
    /// repeatedly.
    pub fn close_stdin(&mut self) {
        self.inner.close_stdin()
    }

    /// Read from the child's stdout into `buf`, returning the number of
    /// bytes copied.
    ///
    /// A return of `Ok(0)` means the child's stream has been fully drained
    /// and closed - never "no data available yet". With `async_io` set at
    /// spawn time the call returns as soon as any data is available, so
    /// `while child.read_stdout(&mut buf)? != 0` drains the stream without
    /// over-blocking.
    pub fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        self.inner.read_stdout(buf)
    }

    /// Read from the child's stderr, with the same end-of-stream convention
    /// as [`read_stdout`](Child::read_stdout). Returns `Ok(0)` for a
    /// combined-stream child.
    pub fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        self.inner.read_stderr(buf)
    }

    /// Check whether the child has not yet exited, without blocking.
    ///
    /// Polling does not consume the exit status: looping on `alive` until it
    /// turns false and then calling [`join`](Child::join) still yields the
    /// child's exit code.
    pub fn alive(&mut self) -> bool {
        self.inner.alive()
    }

    /// Forcibly end the child's execution (kill semantics). The exit code a
    /// later [`join`](Child::join) reports is platform-dependent, beyond
    /// being nonzero.
    pub fn terminate(&mut self) -> Result<(), ProcessError> {
        self.inner.terminate()
    }

    /// Wait for the child to finish and report its exit status.
    ///
    /// Closes the stdin pipe first, so a child blocked reading its input is
    /// not left hanging.
    pub fn join(&mut self) -> Result<ExitStatus, ProcessError> {
        self.inner.join()
    }

    /// Release every resource still held by the handle: open pipe ends, the
    /// process reference, and any readiness objects. Idempotent; also runs
    /// on drop. A child that has not finished execution is not killed and
    /// may outlive the parent.
    pub fn destroy(&mut self) -> Result<(), ProcessError> {
        self.inner.destroy()
    }
}
