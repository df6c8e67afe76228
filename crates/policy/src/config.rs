//! Startup resolution of `PARE_*` variables into immutable per-server configuration.
//!
//! Precedence for tool visibility: explicit `PARE_TOOLS` > `PARE_PROFILE` > `PARE_{SERVER}_TOOLS`
//! > unrestricted. Levels never merge. For command and root allowlists the global variable
//! replaces the per-server one.

use crate::env::{server_segment, server_var, EnvSnapshot, VAR_PREFIX};
use crate::error::ConfigurationError;
use crate::path_guard::CanonicalPath;
use crate::profile::Profile;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{is_separator, Path, PathBuf};
use tracing::debug;

pub const TOOLS_VAR: &str = "PARE_TOOLS";
pub const PROFILE_VAR: &str = "PARE_PROFILE";
pub const ALLOWED_COMMANDS_VAR: &str = "PARE_ALLOWED_COMMANDS";
pub const ALLOWED_ROOTS_VAR: &str = "PARE_ALLOWED_ROOTS";
pub const SANITIZE_ALL_PATHS_VAR: &str = "PARE_SANITIZE_ALL_PATHS";

const TOOLS_SUFFIX: &str = "_TOOLS";

/// Permitted values; absence of a list means everything is permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "entries", rename_all = "lowercase")]
pub enum Allowlist<T: Ord> {
    Unrestricted,
    Only(BTreeSet<T>),
}

impl<T: Ord> Allowlist<T> {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Allowlist::Unrestricted)
    }

    /// Global list replaces the per-server list; neither means unrestricted.
    fn layered(global: Option<BTreeSet<T>>, per_server: Option<BTreeSet<T>>) -> Self {
        match global.or(per_server) {
            Some(entries) => Allowlist::Only(entries),
            None => Allowlist::Unrestricted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyConfig {
    pub allowed_commands: Allowlist<String>,
    pub allowed_roots: Allowlist<CanonicalPath>,
    pub strict_path: bool,
    pub sanitize_all_paths: bool,
}

impl PolicyConfig {
    pub fn unrestricted() -> Self {
        Self {
            allowed_commands: Allowlist::Unrestricted,
            allowed_roots: Allowlist::Unrestricted,
            strict_path: false,
            sanitize_all_paths: false,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::unrestricted()
    }
}

/// Raw tool-visibility settings. Use [`ToolFilterConfig::for_server`] to get the single level
/// that applies to a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolFilterConfig {
    /// `server:tool` pairs from `PARE_TOOLS`.
    pub explicit_tools: Option<BTreeSet<String>>,
    pub profile: Option<Profile>,
    /// Keyed by environment segment (`GIT`, `DOCKER_COMPOSE`).
    pub per_server_tools: BTreeMap<String, BTreeSet<String>>,
}

/// The one precedence level in force for a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ToolFilter {
    Explicit { tools: BTreeSet<String> },
    Profile { profile: Profile },
    PerServer { tools: BTreeSet<String> },
    Unrestricted,
}

impl ToolFilter {
    pub fn allows(&self, server: &str, tool: &str) -> bool {
        match self {
            ToolFilter::Explicit { tools } | ToolFilter::PerServer { tools } => tools.contains(tool),
            ToolFilter::Profile { profile } => profile.enables(server, tool),
            ToolFilter::Unrestricted => true,
        }
    }
}

impl ToolFilterConfig {
    pub fn from_env(env: &EnvSnapshot) -> Result<Self, ConfigurationError> {
        let explicit_tools = env
            .get(TOOLS_VAR)
            .map(|value| {
                parse_list(TOOLS_VAR, value)?
                    .into_iter()
                    .map(|entry| parse_qualified_tool(TOOLS_VAR, entry))
                    .collect::<Result<BTreeSet<_>, _>>()
            })
            .transpose()?;

        let profile = env
            .get(PROFILE_VAR)
            .map(str::parse::<Profile>)
            .transpose()?;

        let mut per_server_tools = BTreeMap::new();
        for (name, value) in env.pare_vars() {
            let Some(segment) = name
                .strip_prefix(VAR_PREFIX)
                .and_then(|rest| rest.strip_suffix(TOOLS_SUFFIX))
            else {
                continue;
            };
            if segment.is_empty() {
                continue;
            }
            let tools = parse_list(name, value)?
                .into_iter()
                .map(|tool| validate_name(name, tool).map(str::to_string))
                .collect::<Result<BTreeSet<_>, _>>()?;
            per_server_tools.insert(segment.to_string(), tools);
        }

        Ok(Self {
            explicit_tools,
            profile,
            per_server_tools,
        })
    }

    pub fn for_server(&self, server: &str) -> ToolFilter {
        if let Some(explicit) = &self.explicit_tools {
            let prefix = format!("{server}:");
            let tools = explicit
                .iter()
                .filter_map(|entry| entry.strip_prefix(&prefix))
                .map(str::to_string)
                .collect();
            return ToolFilter::Explicit { tools };
        }
        if let Some(profile) = self.profile {
            return ToolFilter::Profile { profile };
        }
        match self.per_server_tools.get(&server_segment(server)) {
            Some(tools) => ToolFilter::PerServer {
                tools: tools.clone(),
            },
            None => ToolFilter::Unrestricted,
        }
    }

    pub fn is_enabled(&self, server: &str, tool: &str) -> bool {
        self.for_server(server).allows(server, tool)
    }
}

/// Effective configuration for one server, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub name: String,
    pub policy: PolicyConfig,
    pub tools: ToolFilter,
    pub home_dir: Option<PathBuf>,
}

/// Turns an environment snapshot into per-server configuration.
///
/// Global variables are parsed by [`ConfigResolver::new`]; a failure there is fatal for every
/// server. Per-server variables are parsed by [`ConfigResolver::resolve_server`]; a failure
/// there only affects that server.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env: EnvSnapshot,
    tool_filter: ToolFilterConfig,
    global_commands: Option<BTreeSet<String>>,
    global_roots: Option<BTreeSet<CanonicalPath>>,
    sanitize_all_paths: bool,
}

impl ConfigResolver {
    pub fn new(env: &EnvSnapshot) -> Result<Self, ConfigurationError> {
        Ok(Self {
            tool_filter: ToolFilterConfig::from_env(env)?,
            global_commands: parse_commands(env, ALLOWED_COMMANDS_VAR)?,
            global_roots: parse_roots(env, ALLOWED_ROOTS_VAR)?,
            sanitize_all_paths: parse_bool(env, SANITIZE_ALL_PATHS_VAR)?.unwrap_or(false),
            env: env.clone(),
        })
    }

    pub fn tool_filter(&self) -> &ToolFilterConfig {
        &self.tool_filter
    }

    pub fn resolve_server(&self, server: &str) -> Result<ServerConfig, ConfigurationError> {
        let per_server_commands = parse_commands(&self.env, &server_var(server, "ALLOWED_COMMANDS"))?;
        let per_server_roots = parse_roots(&self.env, &server_var(server, "ALLOWED_ROOTS"))?;
        let strict_path = parse_bool(&self.env, &server_var(server, "STRICT_PATH"))?.unwrap_or(false);

        let policy = PolicyConfig {
            allowed_commands: Allowlist::layered(self.global_commands.clone(), per_server_commands),
            allowed_roots: Allowlist::layered(self.global_roots.clone(), per_server_roots),
            strict_path,
            sanitize_all_paths: self.sanitize_all_paths,
        };
        let config = ServerConfig {
            name: server.to_string(),
            tools: self.tool_filter.for_server(server),
            home_dir: self.env.home_dir(),
            policy,
        };
        debug!(server, config = ?config, "Resolved server configuration");
        Ok(config)
    }
}

/// One-shot resolution for a single server.
pub fn resolve(env: &EnvSnapshot, server: &str) -> Result<ServerConfig, ConfigurationError> {
    ConfigResolver::new(env)?.resolve_server(server)
}

fn parse_list<'a>(var: &str, value: &'a str) -> Result<Vec<&'a str>, ConfigurationError> {
    let raw: Vec<&str> = value.split(',').map(str::trim).collect();
    let last = raw.len() - 1;
    let mut entries = Vec::with_capacity(raw.len());
    for (idx, entry) in raw.into_iter().enumerate() {
        if entry.is_empty() {
            if idx == last {
                continue;
            }
            return Err(ConfigurationError::MalformedList {
                var: var.to_string(),
                reason: format!("empty entry at position {}", idx + 1),
            });
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn validate_name<'a>(var: &str, name: &'a str) -> Result<&'a str, ConfigurationError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(name)
    } else {
        Err(ConfigurationError::MalformedList {
            var: var.to_string(),
            reason: format!("invalid name '{name}'"),
        })
    }
}

fn parse_qualified_tool(var: &str, entry: &str) -> Result<String, ConfigurationError> {
    let malformed = || ConfigurationError::MalformedList {
        var: var.to_string(),
        reason: format!("expected server:tool, got '{entry}'"),
    };
    let (server, tool) = entry.split_once(':').ok_or_else(malformed)?;
    if server.is_empty() || tool.is_empty() || tool.contains(':') {
        return Err(malformed());
    }
    validate_name(var, server)?;
    validate_name(var, tool)?;
    Ok(format!("{server}:{tool}"))
}

fn parse_commands(env: &EnvSnapshot, var: &str) -> Result<Option<BTreeSet<String>>, ConfigurationError> {
    let Some(value) = env.get(var) else {
        return Ok(None);
    };
    parse_list(var, value)?
        .into_iter()
        .map(|cmd| {
            if cmd.chars().any(|c| is_separator(c) || c.is_whitespace()) {
                Err(ConfigurationError::MalformedList {
                    var: var.to_string(),
                    reason: format!("'{cmd}' is not a bare command name"),
                })
            } else {
                Ok(cmd.to_string())
            }
        })
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}

fn parse_roots(env: &EnvSnapshot, var: &str) -> Result<Option<BTreeSet<CanonicalPath>>, ConfigurationError> {
    let Some(value) = env.get(var) else {
        return Ok(None);
    };
    parse_list(var, value)?
        .into_iter()
        .map(|root| {
            if !Path::new(root).is_absolute() {
                return Err(ConfigurationError::InvalidRoot {
                    var: var.to_string(),
                    reason: format!("'{root}' is not absolute"),
                });
            }
            CanonicalPath::new(root).map_err(|e| ConfigurationError::InvalidRoot {
                var: var.to_string(),
                reason: format!("'{root}': {e}"),
            })
        })
        .collect::<Result<BTreeSet<_>, _>>()
        .map(Some)
}

fn parse_bool(env: &EnvSnapshot, var: &str) -> Result<Option<bool>, ConfigurationError> {
    let Some(value) = env.get(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigurationError::MalformedBoolean {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_explicit_tools_beat_everything() {
        let filter = ToolFilterConfig::from_env(&env(&[
            ("PARE_TOOLS", "git:status,npm:install"),
            ("PARE_PROFILE", "full"),
            ("PARE_GIT_TOOLS", "log"),
        ]))
        .unwrap();

        assert!(filter.is_enabled("git", "status"));
        assert!(filter.is_enabled("npm", "install"));
        assert!(!filter.is_enabled("git", "log"));
        assert!(!filter.is_enabled("docker", "ps"));
    }

    #[test]
    fn test_profile_beats_per_server() {
        let filter = ToolFilterConfig::from_env(&env(&[
            ("PARE_PROFILE", "Minimal"),
            ("PARE_GIT_TOOLS", "push"),
        ]))
        .unwrap();

        assert_eq!(filter.for_server("git"), ToolFilter::Profile { profile: Profile::Minimal });
        assert!(!filter.is_enabled("git", "push"));
        assert!(filter.is_enabled("git", "status"));
    }

    #[test]
    fn test_per_server_only_affects_its_server() {
        let filter = ToolFilterConfig::from_env(&env(&[("PARE_GIT_TOOLS", "status, log")])).unwrap();

        assert!(filter.is_enabled("git", "log"));
        assert!(!filter.is_enabled("git", "push"));
        assert!(filter.is_enabled("npm", "install"));
    }

    #[test]
    fn test_per_server_uses_hyphen_segment() {
        let filter =
            ToolFilterConfig::from_env(&env(&[("PARE_DOCKER_COMPOSE_TOOLS", "up")])).unwrap();
        assert!(filter.is_enabled("docker-compose", "up"));
        assert!(!filter.is_enabled("docker-compose", "down"));
    }

    #[test]
    fn test_nothing_set_is_unrestricted() {
        let filter = ToolFilterConfig::from_env(&env(&[])).unwrap();
        assert_eq!(filter.for_server("git"), ToolFilter::Unrestricted);
    }

    #[test]
    fn test_unknown_profile_is_config_error() {
        let err = ToolFilterConfig::from_env(&env(&[("PARE_PROFILE", "everything")])).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownProfile("everything".into()));
    }

    #[test]
    fn test_malformed_lists() {
        for value in ["git", "git:", ":status", "git:status:extra", "git:status,,npm:test", "git:st atus"] {
            let result = ToolFilterConfig::from_env(&env(&[("PARE_TOOLS", value)]));
            assert!(
                matches!(result, Err(ConfigurationError::MalformedList { .. })),
                "expected malformed: {value}"
            );
        }
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        let filter = ToolFilterConfig::from_env(&env(&[("PARE_TOOLS", "git:status,")])).unwrap();
        assert_eq!(filter.explicit_tools.unwrap().len(), 1);
    }

    #[test]
    fn test_global_commands_replace_per_server() {
        let resolver = ConfigResolver::new(&env(&[
            ("PARE_ALLOWED_COMMANDS", "npm"),
            ("PARE_GIT_ALLOWED_COMMANDS", "git"),
        ]))
        .unwrap();
        let git = resolver.resolve_server("git").unwrap();

        assert_eq!(
            git.policy.allowed_commands,
            Allowlist::Only(BTreeSet::from(["npm".to_string()]))
        );
    }

    #[test]
    fn test_per_server_commands_without_global() {
        let resolver = ConfigResolver::new(&env(&[("PARE_GIT_ALLOWED_COMMANDS", "git")])).unwrap();
        assert_eq!(
            resolver.resolve_server("git").unwrap().policy.allowed_commands,
            Allowlist::Only(BTreeSet::from(["git".to_string()]))
        );
        assert!(resolver
            .resolve_server("npm")
            .unwrap()
            .policy
            .allowed_commands
            .is_unrestricted());
    }

    #[test]
    fn test_command_entries_must_be_basenames() {
        let err = ConfigResolver::new(&env(&[("PARE_ALLOWED_COMMANDS", "/usr/bin/git")])).unwrap_err();
        assert!(matches!(err, ConfigurationError::MalformedList { .. }));
    }

    #[test]
    fn test_strict_path_is_per_server() {
        let resolver = ConfigResolver::new(&env(&[("PARE_BUILD_STRICT_PATH", "true")])).unwrap();
        assert!(resolver.resolve_server("build").unwrap().policy.strict_path);
        assert!(!resolver.resolve_server("git").unwrap().policy.strict_path);
    }

    #[test]
    fn test_malformed_boolean() {
        let resolver = ConfigResolver::new(&env(&[("PARE_BUILD_STRICT_PATH", "sometimes")])).unwrap();
        assert!(matches!(
            resolver.resolve_server("build"),
            Err(ConfigurationError::MalformedBoolean { .. })
        ));
        assert!(matches!(
            ConfigResolver::new(&env(&[("PARE_SANITIZE_ALL_PATHS", "maybe")])),
            Err(ConfigurationError::MalformedBoolean { .. })
        ));
    }

    #[test]
    fn test_relative_root_rejected() {
        let err = ConfigResolver::new(&env(&[("PARE_ALLOWED_ROOTS", "projects")])).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidRoot { .. }));
    }

    #[test]
    fn test_missing_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let err = ConfigResolver::new(&env(&[("PARE_ALLOWED_ROOTS", missing.to_str().unwrap())]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidRoot { .. }));
    }

    #[test]
    fn test_roots_are_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir(&nested).unwrap();
        let dotted = format!("{}/a/../a", dir.path().display());

        let config = resolve(&env(&[("PARE_GIT_ALLOWED_ROOTS", dotted.as_str())]), "git").unwrap();
        let Allowlist::Only(roots) = config.policy.allowed_roots else {
            panic!("expected restricted roots");
        };
        let root = roots.into_iter().next().unwrap();
        assert_eq!(root.as_path(), nested.canonicalize().unwrap());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let snapshot = env(&[
            ("PARE_PROFILE", "web"),
            ("PARE_GIT_ALLOWED_COMMANDS", "git,gh"),
            ("PARE_SANITIZE_ALL_PATHS", "true"),
            ("HOME", "/home/dev"),
        ]);
        let a = serde_json::to_string(&resolve(&snapshot, "git").unwrap()).unwrap();
        let b = serde_json::to_string(&resolve(&snapshot, "git").unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
