//! Error taxonomy for the session controller.

use nix::errno;
use thiserror::Error;

/// Unified result type across the controller.
pub type GdbCtlResult<T> = Result<T, GdbCtlError>;

/// Error cases
#[derive(Debug, Error)]
pub enum GdbCtlError {
    /// The debugger command could not be started at all.
    #[error("could not start debugger process `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("debugger pipe error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal delivery failed: {0}")]
    Signal(#[from] errno::Errno),

    #[error("debugger is not running")]
    NotRunning,

    #[error("target configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid target configuration: {0}")]
    InvalidConfig(&'static str),

    /// The controller loop has already shut down.
    #[error("controller loop is gone")]
    ControllerGone,
}
