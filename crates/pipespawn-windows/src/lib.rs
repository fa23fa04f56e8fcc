//! Windows backend: anonymous pipes for the synchronous path, overlapped
//! named pipes plus event objects for the asynchronous read path, spawning
//! through `std::process::Command` with platform creation flags.

#[cfg(windows)]
mod pipe;
#[cfg(windows)]
mod windows_process;

#[cfg(windows)]
pub use pipe::{PipeReader, PipeWriter};
#[cfg(windows)]
pub use windows_process::WindowsProcess;
