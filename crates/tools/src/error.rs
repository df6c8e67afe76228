use serde::Serialize;
use thiserror::Error;

/// Why a call was refused. Nothing was spawned for any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Unknown and disabled tools are reported the same way.
    #[error("Tool not found: {server}:{tool}")]
    ToolNotFound { server: String, tool: String },

    /// A policy violation; `message` has already been through the output sanitizer.
    #[error("{message}")]
    Policy { kind: &'static str, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to encode result: {0}")]
    Encoding(String),
}

impl CallError {
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::ToolNotFound { .. } => "ToolNotFound",
            CallError::Policy { kind, .. } => *kind,
            CallError::InvalidRequest(_) => "InvalidRequest",
            CallError::Encoding(_) => "InternalError",
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            success: false,
            error: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        CallError::Encoding(e.to_string())
    }
}

/// Structured error returned to the caller in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_shape() {
        let err = CallError::Policy {
            kind: "FlagInjectionRejected",
            message: "Value for 'args[0]' looks like a flag: --force".into(),
        };
        let report = err.to_report();
        assert!(!report.success);
        assert_eq!(report.error, "FlagInjectionRejected");
        assert!(report.message.contains("--force"));
    }

    #[test]
    fn test_not_found_kind() {
        let err = CallError::ToolNotFound {
            server: "git".into(),
            tool: "push".into(),
        };
        assert_eq!(err.kind(), "ToolNotFound");
        assert_eq!(err.to_string(), "Tool not found: git:push");
    }
}
