//! Policy layer for the pare tool servers.
//!
//! Resolves `PARE_*` environment variables once at startup and decides, before anything is
//! spawned, whether a command, its arguments and its working directory are allowed.

pub mod command_guard;
pub mod config;
pub mod env;
pub mod error;
pub mod path_guard;
pub mod profile;

pub use command_guard::{check_param, CommandSpec, CommandValidator, ValidatedCommand};
pub use config::{
    resolve, Allowlist, ConfigResolver, PolicyConfig, ServerConfig, ToolFilter, ToolFilterConfig,
};
pub use env::EnvSnapshot;
pub use error::{ConfigurationError, PolicyViolation, ViolationReport};
pub use path_guard::{CanonicalPath, RootConfinement};
pub use profile::Profile;
