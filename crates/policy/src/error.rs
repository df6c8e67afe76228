use serde::Serialize;
use thiserror::Error;

/// Raised once at startup while resolving the environment. A server that hits one of these
/// does not register the affected tools.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),

    #[error("Malformed list in {var}: {reason}")]
    MalformedList { var: String, reason: String },

    #[error("Malformed boolean in {var}: '{value}'")]
    MalformedBoolean { var: String, value: String },

    #[error("Invalid allowed root in {var}: {reason}")]
    InvalidRoot { var: String, reason: String },
}

/// A request rejected before any process is spawned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Path-qualified command rejected in strict path mode: {0}")]
    PathQualifiedCommand(String),

    #[error("Value for '{param}' looks like a flag: {value}")]
    FlagInjectionRejected { param: String, value: String },

    #[error("Path is outside the allowed roots: {0}")]
    PathOutsideAllowedRoots(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid argument for '{param}': {reason}")]
    InvalidArgument { param: String, reason: String },

    #[error("Input too large for '{param}': {reason}")]
    InputTooLarge { param: String, reason: String },
}

impl PolicyViolation {
    /// Stable machine-readable kind, part of the structured error returned to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CommandNotAllowed(_) | Self::PathQualifiedCommand(_) => "CommandNotAllowed",
            Self::FlagInjectionRejected { .. } => "FlagInjectionRejected",
            Self::PathOutsideAllowedRoots(_) => "PathOutsideAllowedRoots",
            Self::InvalidCommand(_) => "InvalidCommand",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::InputTooLarge { .. } => "InputTooLarge",
        }
    }

    pub fn to_report(&self) -> ViolationReport {
        ViolationReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationReport {
    pub kind: &'static str,
    pub message: String,
}
