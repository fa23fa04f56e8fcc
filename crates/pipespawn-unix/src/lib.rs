//! POSIX backend: pipe plumbing and process lifecycle built on `nix`
//! primitives, spawning through `std::process::Command`.

#[cfg(unix)]
mod pipe;
#[cfg(unix)]
mod unix_process;

#[cfg(unix)]
pub use pipe::{PipeReader, PipeWriter};
#[cfg(unix)]
pub use unix_process::UnixProcess;
