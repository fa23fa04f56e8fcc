use crate::pipe::{PipeReader, PipeWriter};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use pipespawn_core::{ExitStatus, ProcessBackend, ProcessError, ProcessId, SpawnConfig};
use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Unix-specific process handle
///
/// The parent-side pipe ends are held as owned descriptors, so any error
/// during construction unwinds everything acquired so far, and `destroy`
/// releases by dropping.
pub struct UnixProcess {
    child: Option<Child>,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    pid: ProcessId,
}

impl ProcessBackend for UnixProcess {
    type Writer = PipeWriter;
    type Reader = PipeReader;

    fn spawn(config: &SpawnConfig) -> Result<Self, ProcessError> {
        config.validate()?;

        let (stdin_rd, stdin_wr) = unistd::pipe().map_err(pipe_err)?;
        let (stdout_rd, stdout_wr) = unistd::pipe().map_err(pipe_err)?;
        let (stderr_rd, stderr_wr) = if config.combined_stdout_stderr {
            // Both child descriptors point at the stdout pipe; the handle has
            // no separate stderr reader.
            let dup = stdout_wr.try_clone().map_err(ProcessError::PipeSetup)?;
            (None, dup)
        } else {
            let (rd, wr) = unistd::pipe().map_err(pipe_err)?;
            (Some(rd), wr)
        };

        let mut stdout = PipeReader::new(stdout_rd);
        let mut stderr = stderr_rd.map(PipeReader::new);
        if config.async_io {
            stdout
                .set_nonblocking()
                .map_err(|e| ProcessError::PipeSetup(e.into()))?;
            if let Some(reader) = stderr.as_mut() {
                reader
                    .set_nonblocking()
                    .map_err(|e| ProcessError::PipeSetup(e.into()))?;
            }
        }

        let program = resolve_program(config)?;
        let mut command = Command::new(&program);
        command
            .args(config.args())
            .stdin(Stdio::from(stdin_rd))
            .stdout(Stdio::from(stdout_wr))
            .stderr(Stdio::from(stderr_wr));

        match &config.env {
            Some(env) => {
                command.env_clear();
                command.envs(env);
            }
            None if config.inherit_environment => {}
            None => {
                command.env_clear();
            }
        }

        if config.detached {
            // New session, and a write to a closed pipe must not take the
            // child down once the parent is gone.
            unsafe {
                command.pre_exec(|| {
                    unistd::setsid().map_err(io::Error::from)?;
                    unsafe { signal::signal(Signal::SIGPIPE, signal::SigHandler::SigIgn) }
                        .map_err(io::Error::from)?;
                    Ok(())
                });
            }
        }

        let child = command.spawn().map_err(ProcessError::Spawn)?;
        let pid = child.id();
        info!(pid, program = %program.display(), "spawned child process");

        Ok(Self {
            child: Some(child),
            stdin: Some(PipeWriter::new(stdin_wr)),
            stdout: Some(stdout),
            stderr,
            pid,
        })
    }

    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn stdin(&mut self) -> Option<&mut PipeWriter> {
        self.stdin.as_mut()
    }

    fn stdout(&mut self) -> Option<&mut PipeReader> {
        self.stdout.as_mut()
    }

    fn stderr(&mut self) -> Option<&mut PipeReader> {
        self.stderr.as_mut()
    }

    fn close_stdin(&mut self) {
        // Dropping the writer closes the pipe; repeated calls are a no-op.
        self.stdin.take();
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        match self.stdout.as_mut() {
            Some(reader) => reader.read(buf).map_err(ProcessError::Stream),
            None => Ok(0),
        }
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        match self.stderr.as_mut() {
            Some(reader) => reader.read(buf).map_err(ProcessError::Stream),
            None => Ok(0),
        }
    }

    fn alive(&mut self) -> bool {
        match self.child.as_mut() {
            // try_wait caches a reaped status inside the handle, so a later
            // join still observes the exit code.
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(_)) => false,
                Err(_) => false,
            },
            None => false,
        }
    }

    fn terminate(&mut self) -> Result<(), ProcessError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        if let Ok(Some(_)) = child.try_wait() {
            // Already exited; the pid may have been recycled, do not signal.
            return Ok(());
        }
        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                info!(pid = self.pid, "sent SIGKILL to child process");
                Ok(())
            }
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to kill child process");
                Err(ProcessError::Terminate(e.into()))
            }
        }
    }

    fn join(&mut self) -> Result<ExitStatus, ProcessError> {
        self.close_stdin();
        let Some(child) = self.child.as_mut() else {
            return Err(ProcessError::Wait(io::Error::new(
                io::ErrorKind::NotFound,
                "process handle already destroyed",
            )));
        };
        let status = child.wait().map_err(ProcessError::Wait)?;
        let status = translate_status(status);
        debug!(pid = self.pid, %status, "joined child process");
        Ok(status)
    }

    fn destroy(&mut self) -> Result<(), ProcessError> {
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
        if self.child.take().is_some() {
            debug!(pid = self.pid, "released child process resources");
        }
        Ok(())
    }
}

/// Translate an executable name into the path handed to the OS loader.
///
/// Names containing a separator are used as given. Bare names are searched
/// in the parent's PATH under `search_user_path`, in the PATH of an explicit
/// environment when one supplies it, and otherwise follow the loader's own
/// rules: execvp lookup when inheriting the environment, working-directory
/// relative when not.
fn resolve_program(config: &SpawnConfig) -> Result<PathBuf, ProcessError> {
    let program = config.program().ok_or_else(|| {
        ProcessError::Configuration("argv must start with a non-empty program name".to_string())
    })?;

    if program.contains('/') {
        return Ok(PathBuf::from(program));
    }

    if config.search_user_path {
        return which::which(program)
            .map_err(|e| ProcessError::Spawn(io::Error::new(io::ErrorKind::NotFound, e)));
    }

    if let Some(path) = config.env.as_ref().and_then(|env| env.get("PATH")) {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if let Ok(found) = which::which_in(program, Some(path), cwd) {
            return Ok(found);
        }
    }

    if config.inherit_environment {
        Ok(PathBuf::from(program))
    } else {
        Ok(PathBuf::from(".").join(program))
    }
}

fn translate_status(status: std::process::ExitStatus) -> ExitStatus {
    match status.code() {
        Some(code) => ExitStatus::Exited(code),
        None => ExitStatus::Signaled(status.signal().unwrap_or(0)),
    }
}

fn pipe_err(errno: Errno) -> ProcessError {
    ProcessError::PipeSetup(errno.into())
}
