use crate::ProcessError;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Spawn configuration for a child process
///
/// The argument vector carries the program name first, followed by its
/// arguments. The environment is three-valued: `None` without
/// `inherit_environment` runs the child with a deliberately empty
/// environment, `Some(map)` passes the map verbatim, and
/// `inherit_environment` hands down the parent's variables. Combining
/// `inherit_environment` with any explicit map (empty included) is rejected
/// by [`SpawnConfig::validate`] before any OS resource is acquired.
#[derive(Default, Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(rename_all = "camelCase")]
pub struct SpawnConfig {
    /// Program name or path, followed by the arguments passed to it.
    #[builder(setter(custom))]
    pub argv: Vec<String>,

    /// Merge the child's stdout and stderr into a single stream. The stderr
    /// accessor returns `None` for such a child.
    #[builder(default)]
    #[serde(default)]
    pub combined_stdout_stderr: bool,

    /// The child inherits the parent's environment variables.
    #[builder(default)]
    #[serde(default)]
    pub inherit_environment: bool,

    /// Open the readable pipes for non-blocking (POSIX) or overlapped
    /// (Windows) reads, enabling `read_stdout`/`read_stderr` to return as
    /// soon as any data is available.
    #[builder(default)]
    #[serde(default)]
    pub async_io: bool,

    /// Detach the child from the parent's session so it may outlive it.
    #[builder(default)]
    #[serde(default)]
    pub detached: bool,

    /// Suppress the console window on Windows. Ignored elsewhere.
    #[builder(default)]
    #[serde(default)]
    pub no_window: bool,

    /// Resolve a bare program name against the parent's PATH.
    #[builder(default)]
    #[serde(default)]
    pub search_user_path: bool,

    /// Explicit environment for the child, used verbatim.
    #[builder(default)]
    #[builder(setter(custom))]
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

impl SpawnConfig {
    pub fn builder() -> SpawnConfigBuilder {
        SpawnConfigBuilder::default()
    }

    /// The executable name or path (first argv entry), if present.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// The arguments following the program name.
    pub fn args(&self) -> &[String] {
        if self.argv.len() > 1 { &self.argv[1..] } else { &[] }
    }

    /// Validate the configuration and return errors if invalid
    ///
    /// Called by every backend before touching any OS resource, so illegal
    /// combinations fail fast with nothing to unwind.
    pub fn validate(&self) -> Result<(), ProcessError> {
        match self.argv.first() {
            Some(program) if !program.is_empty() => {}
            _ => {
                return Err(ProcessError::Configuration(
                    "argv must start with a non-empty program name".to_string(),
                ));
            }
        }

        if self.inherit_environment && self.env.is_some() {
            return Err(ProcessError::Configuration(
                "an explicit environment cannot be combined with inherit_environment".to_string(),
            ));
        }

        Ok(())
    }
}

impl From<SpawnConfigBuilderError> for ProcessError {
    fn from(e: SpawnConfigBuilderError) -> Self {
        ProcessError::Configuration(e.to_string())
    }
}

impl SpawnConfigBuilder {
    pub fn argv<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let argv: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.argv = Some(argv);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self
            .env
            .get_or_insert_with(|| Some(HashMap::new()))
            .get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        for (key, value) in iter {
            self.env(key, value);
        }
        self
    }

    /// Give the child an explicit, empty environment list. Distinct from not
    /// setting an environment at all only in how it combines with
    /// `inherit_environment` (explicit-empty plus inherit is rejected).
    pub fn env_clear(&mut self) -> &mut Self {
        self.env = Some(Some(HashMap::new()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = SpawnConfig::builder().argv(["/bin/true"]).build().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.program(), Some("/bin/true"));
        assert!(config.args().is_empty());
        assert_eq!(config.env, None);
        assert!(!config.inherit_environment);
    }

    #[test]
    fn test_args_split() {
        let config = SpawnConfig::builder()
            .argv(["prog", "foo", "bar"])
            .build()
            .unwrap();
        assert_eq!(config.program(), Some("prog"));
        assert_eq!(config.args(), ["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_empty_argv_rejected() {
        let config = SpawnConfig::builder().argv(Vec::<String>::new()).build().unwrap();
        assert!(config.validate().is_err());

        let config = SpawnConfig::builder().argv([""]).build().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inherit_with_explicit_env_rejected() {
        let config = SpawnConfig::builder()
            .argv(["prog"])
            .inherit_environment(true)
            .env("FOO", "BAR")
            .build()
            .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_inherit_with_empty_env_rejected() {
        let config = SpawnConfig::builder()
            .argv(["prog"])
            .inherit_environment(true)
            .env_clear()
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inherit_without_env_accepted() {
        let config = SpawnConfig::builder()
            .argv(["prog"])
            .inherit_environment(true)
            .build()
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_builder_accumulates() {
        let config = SpawnConfig::builder()
            .argv(["prog"])
            .env("A", "1")
            .env_multi([("B", "2"), ("C", "3")])
            .build()
            .unwrap();
        let env = config.env.unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env.get("B").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_explicit_empty_env_is_not_none() {
        let config = SpawnConfig::builder()
            .argv(["prog"])
            .env_clear()
            .build()
            .unwrap();
        assert_eq!(config.env, Some(HashMap::new()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = SpawnConfig::builder()
            .argv(["prog", "arg"])
            .combined_stdout_stderr(true)
            .async_io(true)
            .env("FOO", "BAR")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SpawnConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
