use thiserror::Error;

/// Core error types for process operations
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("invalid spawn configuration: {0}")]
    Configuration(String),

    #[error("failed to create stdio pipes: {0}")]
    PipeSetup(#[source] std::io::Error),

    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("stream I/O failed: {0}")]
    Stream(#[source] std::io::Error),

    #[error("failed to wait on process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("failed to terminate process: {0}")]
    Terminate(#[source] std::io::Error),
}

impl ProcessError {
    /// Check if this error was detected before any OS resource was acquired
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProcessError::Configuration(_))
    }

    /// Check if this error occurred while bringing the child up (as opposed
    /// to operating on an already-running child)
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            ProcessError::Configuration(_)
                | ProcessError::PipeSetup(_)
                | ProcessError::Spawn(_)
        )
    }
}
