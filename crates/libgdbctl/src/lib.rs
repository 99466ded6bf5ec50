//! Core library for the gdbctl session controller.
//! Drives an interactive gdb over pipes and turns its console output into
//! [`DebugEvent`]s for a host front end.

pub mod breakpoints;
pub mod command;
pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod lines;
pub mod parser;
pub mod process;
pub mod resolver;
pub mod session;

pub use config::{IoRedirect, TargetConfig};
pub use controller::{Controller, ControllerHandle, Request};
pub use errors::{GdbCtlError, GdbCtlResult};
pub use events::DebugEvent;
pub use session::{GdbLink, Session, SessionState};

/// Exposes the crate version for CLI reporting.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
