use crate::pipe::{self, PipeReader, PipeWriter};
use pipespawn_core::{ExitStatus, ProcessBackend, ProcessError, ProcessId, SpawnConfig};
use std::io::{self, Read};
use std::os::windows::io::{AsRawHandle, OwnedHandle};
use std::os::windows::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Threading::{
    CREATE_NO_WINDOW, DETACHED_PROCESS, TerminateProcess,
};

/// Windows-specific process handle
///
/// Stream ends are owned handles, so a failure partway through spawn unwinds
/// every pipe and event acquired so far. The overlapped read machinery lives
/// inside [`PipeReader`]; this type wires it to the child's lifecycle.
pub struct WindowsProcess {
    child: Option<Child>,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    pid: ProcessId,
}

struct OutputPipe {
    reader: PipeReader,
    writer: OwnedHandle,
}

/// Build one readable output pipe, overlapped plus event when async reads
/// were requested.
fn output_pipe(async_io: bool) -> Result<OutputPipe, ProcessError> {
    if async_io {
        let (rd, wr) = pipe::overlapped_pipe().map_err(ProcessError::PipeSetup)?;
        let event = pipe::create_event().map_err(ProcessError::PipeSetup)?;
        Ok(OutputPipe {
            reader: PipeReader::new(rd, Some(event)),
            writer: wr,
        })
    } else {
        let (rd, wr) = pipe::anon_pipe().map_err(ProcessError::PipeSetup)?;
        Ok(OutputPipe {
            reader: PipeReader::new(rd, None),
            writer: wr,
        })
    }
}

impl ProcessBackend for WindowsProcess {
    type Writer = PipeWriter;
    type Reader = PipeReader;

    fn spawn(config: &SpawnConfig) -> Result<Self, ProcessError> {
        config.validate()?;

        let (stdin_rd, stdin_wr) = pipe::anon_pipe().map_err(ProcessError::PipeSetup)?;
        let stdout = output_pipe(config.async_io)?;
        let (stderr_reader, stderr_wr) = if config.combined_stdout_stderr {
            // Both child handles feed the stdout pipe; the handle has no
            // separate stderr reader.
            let dup = stdout.writer.try_clone().map_err(ProcessError::PipeSetup)?;
            (None, dup)
        } else {
            let stderr = output_pipe(config.async_io)?;
            (Some(stderr.reader), stderr.writer)
        };

        let program = resolve_program(config)?;
        let mut command = Command::new(&program);
        command
            .args(config.args())
            .stdin(Stdio::from(stdin_rd))
            .stdout(Stdio::from(stdout.writer))
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

        // DETACHED_PROCESS and CREATE_NO_WINDOW both control the console and
        // are mutually exclusive; detachment wins.
        if config.detached {
            command.creation_flags(DETACHED_PROCESS.0);
        } else if config.no_window {
            command.creation_flags(CREATE_NO_WINDOW.0);
        }

        let child = command.spawn().map_err(ProcessError::Spawn)?;
        let pid = child.id();
        info!(pid, program = %program.display(), "spawned child process");

        Ok(Self {
            child: Some(child),
            stdin: Some(PipeWriter::new(stdin_wr)),
            stdout: Some(stdout.reader),
            stderr: stderr_reader,
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
            return Ok(());
        }
        let handle = HANDLE(child.as_raw_handle());
        match unsafe { TerminateProcess(handle, 1) } {
            Ok(()) => {
                info!(pid = self.pid, "terminated child process");
                Ok(())
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to terminate child process");
                Err(ProcessError::Terminate(io::Error::from_raw_os_error(
                    e.code().0 & 0xFFFF,
                )))
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
        let status = ExitStatus::Exited(status.code().unwrap_or(1));
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

/// Translate an executable name into the path handed to CreateProcess.
///
/// Names containing a separator are used as given. Bare names are searched
/// in the parent's PATH under `search_user_path`, in the PATH of an explicit
/// environment when one supplies it, and otherwise left to the loader's own
/// application-directory and system-path search.
fn resolve_program(config: &SpawnConfig) -> Result<PathBuf, ProcessError> {
    let program = config.program().ok_or_else(|| {
        ProcessError::Configuration("argv must start with a non-empty program name".to_string())
    })?;

    if program.contains(['/', '\\']) {
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

    Ok(PathBuf::from(program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_explicit_paths() {
        let config = SpawnConfig::builder()
            .argv([r"C:\Windows\System32\cmd.exe"])
            .build()
            .unwrap();
        assert_eq!(
            resolve_program(&config).unwrap(),
            PathBuf::from(r"C:\Windows\System32\cmd.exe")
        );
    }

    #[test]
    fn test_resolve_searches_user_path() {
        let mut config = SpawnConfig::builder().argv(["cmd"]).build().unwrap();
        config.search_user_path = true;
        let found = resolve_program(&config).unwrap();
        assert!(found.is_absolute());
    }
}
