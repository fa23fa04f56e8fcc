//! Pipespawn - Cross-platform child process spawning and stdio piping
//!
//! Spawn a child process, feed its standard input, collect its standard
//! output and error incrementally (including while it is still running),
//! poll it for liveness, terminate it, and retrieve its exit code - through
//! one portable surface over the POSIX and Windows process primitives.
//!
//! ```rust,no_run
//! use pipespawn::{Child, ProcessError, SpawnConfig};
//!
//! fn run() -> Result<(), ProcessError> {
//!     let config = SpawnConfig::builder()
//!         .argv(["echo", "hello"])
//!         .inherit_environment(true)
//!         .search_user_path(true)
//!         .build()?;
//!
//!     let mut child = Child::spawn(&config)?;
//!     let status = child.join()?;
//!     println!("child finished with {status}");
//!     Ok(())
//! }
//! ```

mod child;

pub use child::{Child, ChildStderr, ChildStdin, ChildStdout};
pub use pipespawn_core::{
    ExitStatus, ProcessBackend, ProcessError, ProcessId, SpawnConfig, SpawnConfigBuilder,
    SpawnConfigBuilderError,
};
