use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, OwnedFd};

/// Read end of a child's stdout or stderr pipe
///
/// In async mode the descriptor is switched to `O_NONBLOCK` and every read
/// drives a poll loop until data arrives or the write ends close, so a
/// return of 0 always means the stream is drained and closed, never "no data
/// available right now".
pub struct PipeReader {
    fd: OwnedFd,
    nonblocking: bool,
}

impl PipeReader {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self {
            fd,
            nonblocking: false,
        }
    }

    pub(crate) fn set_nonblocking(&mut self) -> nix::Result<()> {
        let bits = fcntl(&self.fd, FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_truncate(bits) | OFlag::O_NONBLOCK;
        fcntl(&self.fd, FcntlArg::F_SETFL(flags))?;
        self.nonblocking = true;
        Ok(())
    }

    fn wait_readable(&self) -> io::Result<()> {
        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) if self.nonblocking => self.wait_readable()?,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Write end of a child's stdin pipe. Unbuffered: every write lands in the
/// pipe directly, and dropping the writer closes it.
pub struct PipeWriter {
    fd: OwnedFd,
}

impl PipeWriter {
    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
