use std::ffi::CString;
use std::io::{self, Read, Write};
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::sync::atomic::{AtomicU32, Ordering};
use windows::Win32::Foundation::{
    ERROR_BROKEN_PIPE, ERROR_HANDLE_EOF, ERROR_IO_PENDING, GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileA, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_OVERLAPPED, FILE_SHARE_NONE, OPEN_EXISTING,
    PIPE_ACCESS_INBOUND, ReadFile, WriteFile,
};
use windows::Win32::System::IO::{GetOverlappedResult, OVERLAPPED};
use windows::Win32::System::Pipes::{CreateNamedPipeA, CreatePipe, PIPE_TYPE_BYTE, PIPE_WAIT};
use windows::Win32::System::Threading::CreateEventA;
use windows::core::PCSTR;

const PIPE_BUFFER_SIZE: u32 = 65536;

static PIPE_SERIAL: AtomicU32 = AtomicU32::new(0);

/// Create an anonymous pipe, returned as (read end, write end).
pub(crate) fn anon_pipe() -> io::Result<(OwnedHandle, OwnedHandle)> {
    let mut rd = HANDLE::default();
    let mut wr = HANDLE::default();
    unsafe { CreatePipe(&mut rd, &mut wr, None, 0) }.map_err(win_to_io)?;
    Ok(unsafe { (owned(rd), owned(wr)) })
}

/// Create a pipe whose read end supports overlapped reads, returned as
/// (read end, write end).
///
/// Anonymous pipes cannot be opened overlapped, so this is a uniquely named
/// pipe with a single instance: the server side is the parent's inbound read
/// end, the client side becomes the child's write end.
pub(crate) fn overlapped_pipe() -> io::Result<(OwnedHandle, OwnedHandle)> {
    let name = format!(
        r"\\.\pipe\pipespawn.{:08x}.{:08x}",
        std::process::id(),
        PIPE_SERIAL.fetch_add(1, Ordering::Relaxed),
    );
    let name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let server = unsafe {
        CreateNamedPipeA(
            PCSTR(name.as_ptr().cast()),
            PIPE_ACCESS_INBOUND | FILE_FLAG_OVERLAPPED,
            PIPE_TYPE_BYTE | PIPE_WAIT,
            1,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            None,
        )
    };
    if server.is_invalid() {
        return Err(io::Error::last_os_error());
    }
    let server = unsafe { owned(server) };

    let client = unsafe {
        CreateFileA(
            PCSTR(name.as_ptr().cast()),
            GENERIC_WRITE.0,
            FILE_SHARE_NONE,
            None,
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            None,
        )
    }
    .map_err(win_to_io)?;
    let client = unsafe { owned(client) };

    Ok((server, client))
}

/// Manual-reset event used to track an outstanding overlapped read.
pub(crate) fn create_event() -> io::Result<OwnedHandle> {
    let event =
        unsafe { CreateEventA(None, true.into(), false.into(), PCSTR::null()) }.map_err(win_to_io)?;
    Ok(unsafe { owned(event) })
}

/// Read end of a child's stdout or stderr pipe
///
/// With an event object attached the pipe was opened overlapped: each read
/// issues an overlapped operation and drives it to completion before
/// returning, so a return of 0 always means the stream is drained and
/// closed, never "operation still pending".
pub struct PipeReader {
    handle: OwnedHandle,
    event: Option<OwnedHandle>,
}

impl PipeReader {
    pub(crate) fn new(handle: OwnedHandle, event: Option<OwnedHandle>) -> Self {
        Self { handle, event }
    }

    fn raw(&self) -> HANDLE {
        HANDLE(self.handle.as_raw_handle())
    }

    fn read_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut read = 0u32;
        match unsafe { ReadFile(self.raw(), Some(buf), Some(&mut read), None) } {
            Ok(()) => Ok(read as usize),
            Err(e) if is_end_of_stream(&e) => Ok(0),
            Err(e) => Err(win_to_io(e)),
        }
    }

    fn read_overlapped(&mut self, buf: &mut [u8], event: HANDLE) -> io::Result<usize> {
        let mut overlapped = OVERLAPPED::default();
        overlapped.hEvent = event;

        // Issue the read: it either completes, goes pending, or reports that
        // the write ends are gone.
        match unsafe { ReadFile(self.raw(), Some(buf), None, Some(&mut overlapped)) } {
            Ok(()) => {}
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => {}
            Err(e) if is_end_of_stream(&e) => return Ok(0),
            Err(e) => return Err(win_to_io(e)),
        }

        // Resolve pending into complete or end-of-stream; bWait blocks on
        // the event until the operation settles.
        let mut transferred = 0u32;
        match unsafe { GetOverlappedResult(self.raw(), &overlapped, &mut transferred, true.into()) }
        {
            Ok(()) => Ok(transferred as usize),
            Err(e) if is_end_of_stream(&e) => Ok(0),
            Err(e) => Err(win_to_io(e)),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.event.as_ref().map(|e| HANDLE(e.as_raw_handle())) {
            Some(event) => self.read_overlapped(buf, event),
            None => self.read_blocking(buf),
        }
    }
}

/// Write end of a child's stdin pipe. Unbuffered, and dropping the writer
/// closes the handle.
pub struct PipeWriter {
    handle: OwnedHandle,
}

impl PipeWriter {
    pub(crate) fn new(handle: OwnedHandle) -> Self {
        Self { handle }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0u32;
        unsafe {
            WriteFile(
                HANDLE(self.handle.as_raw_handle()),
                Some(buf),
                Some(&mut written),
                None,
            )
        }
        .map_err(win_to_io)?;
        Ok(written as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn is_end_of_stream(e: &windows::core::Error) -> bool {
    e.code() == ERROR_BROKEN_PIPE.to_hresult() || e.code() == ERROR_HANDLE_EOF.to_hresult()
}

fn win_to_io(e: windows::core::Error) -> io::Error {
    io::Error::from_raw_os_error(e.code().0 & 0xFFFF)
}

unsafe fn owned(handle: HANDLE) -> OwnedHandle {
    unsafe { OwnedHandle::from_raw_handle(handle.0) }
}
