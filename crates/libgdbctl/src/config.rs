//! Per-session target configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::errors::{GdbCtlError, GdbCtlResult};

fn default_gdb_cmd() -> String {
    "gdb".to_string()
}

/// Everything needed to launch one debugger session.
///
/// Immutable for the lifetime of a session; a restart may supply a new one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetConfig {
    /// Shell command used to launch the debugger.
    #[serde(default = "default_gdb_cmd")]
    pub gdb_cmd: String,
    /// Working directory of the debugger, also the first base for relative source names.
    #[serde(default)]
    pub work_dir: PathBuf,
    pub executable: PathBuf,
    /// Program arguments, passed verbatim to `set args`.
    #[serde(default)]
    pub arguments: String,
    /// Extra commands issued after the target is loaded.
    #[serde(default)]
    pub custom_init: Vec<String>,
    #[serde(default)]
    pub io: Option<IoRedirect>,
}

/// Redirection targets for the debuggee's standard streams.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IoRedirect {
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl fmt::Display for IoRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "< {} 1> {} 2> {}",
            self.stdin.display(),
            self.stdout.display(),
            self.stderr.display()
        )
    }
}

impl TargetConfig {
    /// Minimal configuration with default gdb and no extras.
    pub fn new(executable: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            gdb_cmd: default_gdb_cmd(),
            work_dir: work_dir.into(),
            executable: executable.into(),
            arguments: String::new(),
            custom_init: Vec::new(),
            io: None,
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> GdbCtlResult<Self> {
        let config: TargetConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> GdbCtlResult<Self> {
        debug!("loading target configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that cannot start a session.
    pub fn validate(&self) -> GdbCtlResult<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(GdbCtlError::InvalidConfig("executable must not be empty"));
        }
        if self.gdb_cmd.trim().is_empty() {
            return Err(GdbCtlError::InvalidConfig("gdb_cmd must not be empty"));
        }
        Ok(())
    }

    /// Argument string for `set args`, including the redirection suffix if any.
    pub fn args_line(&self) -> String {
        match &self.io {
            Some(io) => format!("set args {} {}", self.arguments, io),
            None => format!("set args {} ", self.arguments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = TargetConfig::from_toml_str(
            r#"
            gdb_cmd = "gdb -q"
            work_dir = "/tmp/proj"
            executable = "/tmp/proj/build/app"
            arguments = "--verbose input.txt"
            custom_init = ["set print pretty on"]

            [io]
            stdin = "/tmp/in"
            stdout = "/tmp/out"
            stderr = "/tmp/err"
            "#,
        )
        .unwrap();

        assert_eq!(config.gdb_cmd, "gdb -q");
        assert_eq!(config.custom_init, vec!["set print pretty on".to_string()]);
        assert_eq!(
            config.args_line(),
            "set args --verbose input.txt < /tmp/in 1> /tmp/out 2> /tmp/err"
        );
    }

    #[test]
    fn defaults_apply() {
        let config = TargetConfig::from_toml_str(r#"executable = "app""#).unwrap();
        assert_eq!(config.gdb_cmd, "gdb");
        assert!(config.custom_init.is_empty());
        assert_eq!(config.io, None);
        assert_eq!(config.args_line(), "set args  ");
    }

    #[test]
    fn missing_executable_is_rejected() {
        assert!(matches!(
            TargetConfig::from_toml_str(r#"executable = """#),
            Err(GdbCtlError::InvalidConfig(_))
        ));
        assert!(matches!(
            TargetConfig::from_toml_str(r#"work_dir = "/tmp""#),
            Err(GdbCtlError::ConfigParse(_))
        ));
    }
}
