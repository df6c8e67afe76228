use crate::config::{Allowlist, PolicyConfig};
use crate::error::PolicyViolation;
use serde::Serialize;
use std::path::is_separator;
use tracing::warn;

pub const MAX_INPUT_BYTES: usize = 64 * 1024;
pub const MAX_USER_ARGS: usize = 1024;

#[cfg(windows)]
const EXECUTABLE_EXTENSIONS: &[&str] = &[".exe", ".cmd", ".bat", ".com"];

/// A syntactically valid command string, split into its basename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    raw: String,
    basename: String,
    path_qualified: bool,
}

impl CommandSpec {
    pub fn parse(raw: &str) -> Result<Self, PolicyViolation> {
        if raw.trim().is_empty() {
            return Err(PolicyViolation::InvalidCommand("empty command".into()));
        }
        if raw.len() > MAX_INPUT_BYTES {
            return Err(PolicyViolation::InputTooLarge {
                param: "command".into(),
                reason: format!("{} bytes exceeds {MAX_INPUT_BYTES}", raw.len()),
            });
        }
        if raw.chars().any(char::is_control) {
            return Err(PolicyViolation::InvalidCommand(
                "control character in command".into(),
            ));
        }

        let basename = raw.rsplit(is_separator).next().unwrap_or(raw);
        if basename.is_empty() || basename == "." || basename == ".." {
            return Err(PolicyViolation::InvalidCommand(format!(
                "no executable name in '{raw}'"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            basename: basename.to_string(),
            path_qualified: raw.chars().any(is_separator),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn is_path_qualified(&self) -> bool {
        self.path_qualified
    }

    /// Compare the basename with an allowlist entry using platform rules.
    pub fn matches(&self, allowed: &str) -> bool {
        #[cfg(windows)]
        {
            let strip = |name: &str| -> String {
                let lower = name.to_ascii_lowercase();
                EXECUTABLE_EXTENSIONS
                    .iter()
                    .find_map(|ext| lower.strip_suffix(ext).map(str::to_string))
                    .unwrap_or(lower)
            };
            strip(&self.basename) == strip(allowed)
        }
        #[cfg(not(windows))]
        {
            self.basename == allowed
        }
    }
}

/// A command that passed policy checks, plus its argument vector.
///
/// Arguments added with [`ValidatedCommand::arg`] are trusted (written by the tool wrapper);
/// arguments added with [`ValidatedCommand::user_arg`] come from the caller and are checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedCommand {
    spec: CommandSpec,
    args: Vec<String>,
    user_args: usize,
    warnings: Vec<String>,
}

impl ValidatedCommand {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn user_arg(mut self, param: &str, value: &str) -> Result<Self, PolicyViolation> {
        if self.user_args >= MAX_USER_ARGS {
            return Err(PolicyViolation::InputTooLarge {
                param: param.into(),
                reason: format!("more than {MAX_USER_ARGS} arguments"),
            });
        }
        check_param(param, value)?;
        self.user_args += 1;
        self.args.push(value.to_string());
        Ok(self)
    }

    pub fn program(&self) -> &str {
        self.spec.raw()
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Annotations for accepted-but-noteworthy commands (path-qualified in non-strict mode).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Reject values a wrapped CLI would parse as a flag, plus oversized or control-character input.
pub fn check_param(param: &str, value: &str) -> Result<(), PolicyViolation> {
    if value.len() > MAX_INPUT_BYTES {
        return Err(PolicyViolation::InputTooLarge {
            param: param.into(),
            reason: format!("{} bytes exceeds {MAX_INPUT_BYTES}", value.len()),
        });
    }
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(PolicyViolation::InvalidArgument {
            param: param.into(),
            reason: "control character".into(),
        });
    }
    if value.trim_start().starts_with('-') {
        warn!(param, value, "Flag injection rejected");
        return Err(PolicyViolation::FlagInjectionRejected {
            param: param.into(),
            value: value.into(),
        });
    }
    Ok(())
}

pub struct CommandValidator<'a> {
    policy: &'a PolicyConfig,
}

impl<'a> CommandValidator<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self { policy }
    }

    /// Check the executable alone and start a [`ValidatedCommand`].
    pub fn command(&self, raw: &str) -> Result<ValidatedCommand, PolicyViolation> {
        let spec = CommandSpec::parse(raw)?;
        let mut warnings = Vec::new();

        if spec.is_path_qualified() {
            if self.policy.strict_path {
                warn!(command = raw, "Path-qualified command rejected in strict mode");
                return Err(PolicyViolation::PathQualifiedCommand(raw.to_string()));
            }
            warn!(command = raw, "Running path-qualified command");
            warnings.push(format!(
                "command '{raw}' is path-qualified; only its basename '{}' was checked",
                spec.basename()
            ));
        }

        if let Allowlist::Only(allowed) = &self.policy.allowed_commands {
            if !allowed.iter().any(|a| spec.matches(a)) {
                warn!(command = raw, "Command not in allowlist");
                return Err(PolicyViolation::CommandNotAllowed(spec.basename().to_string()));
            }
        }

        Ok(ValidatedCommand {
            spec,
            args: Vec::new(),
            user_args: 0,
            warnings,
        })
    }

    /// Validate a command where every argument is caller-supplied.
    pub fn validate<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
    ) -> Result<ValidatedCommand, PolicyViolation> {
        args.iter()
            .enumerate()
            .try_fold(self.command(command)?, |cmd, (idx, arg)| {
                cmd.user_arg(&format!("args[{idx}]"), arg.as_ref())
            })
    }
}
