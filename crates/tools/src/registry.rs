use crate::catalog::{self, ServerSpec, ToolSpec};
use pare_policy::{ConfigResolver, ConfigurationError, ServerConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Enabled,
    Disabled,
}

struct ServerEntry {
    spec: &'static ServerSpec,
    config: Option<Arc<ServerConfig>>,
    error: Option<ConfigurationError>,
    states: BTreeMap<&'static str, ToolState>,
}

/// Which `(server, tool)` pairs are advertised. Built once at startup and never changed.
///
/// Disabled tools are not advertised and cannot be looked up; to a caller they do not exist.
pub struct ToolRegistry {
    servers: BTreeMap<&'static str, ServerEntry>,
}

impl ToolRegistry {
    pub fn build(resolver: &ConfigResolver) -> Self {
        Self::with_catalog(resolver, catalog::SERVERS)
    }

    pub fn with_catalog(resolver: &ConfigResolver, servers: &'static [ServerSpec]) -> Self {
        let mut entries = BTreeMap::new();
        for spec in servers {
            let entry = match resolver.resolve_server(spec.name) {
                Ok(config) => {
                    let states = spec
                        .tools
                        .iter()
                        .map(|tool| {
                            let state = if config.tools.allows(spec.name, tool.name) {
                                ToolState::Enabled
                            } else {
                                ToolState::Disabled
                            };
                            (tool.name, state)
                        })
                        .collect();
                    ServerEntry {
                        spec,
                        config: Some(Arc::new(config)),
                        error: None,
                        states,
                    }
                }
                Err(e) => {
                    error!(server = spec.name, error = %e, "Server configuration rejected, registering no tools");
                    ServerEntry {
                        spec,
                        config: None,
                        error: Some(e),
                        states: spec.tools.iter().map(|t| (t.name, ToolState::Disabled)).collect(),
                    }
                }
            };
            let enabled = entry.states.values().filter(|s| **s == ToolState::Enabled).count();
            info!(server = spec.name, enabled, total = spec.tools.len(), "Registered server");
            entries.insert(spec.name, entry);
        }
        Self { servers: entries }
    }

    /// `None` when the pair is not in the catalog at all.
    pub fn state(&self, server: &str, tool: &str) -> Option<ToolState> {
        self.servers.get(server)?.states.get(tool).copied()
    }

    /// An enabled tool and the configuration of its server.
    pub fn get(&self, server: &str, tool: &str) -> Option<(&'static ToolSpec, Arc<ServerConfig>)> {
        let entry = self.servers.get(server)?;
        if entry.states.get(tool) != Some(&ToolState::Enabled) {
            return None;
        }
        let spec = entry.spec.tool(tool)?;
        let config = entry.config.clone()?;
        Some((spec, config))
    }

    pub fn servers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.servers.keys().copied()
    }

    pub fn server_config(&self, server: &str) -> Option<&ServerConfig> {
        self.servers.get(server)?.config.as_deref()
    }

    pub fn config_error(&self, server: &str) -> Option<&ConfigurationError> {
        self.servers.get(server)?.error.as_ref()
    }

    /// Enabled tools of a server, in catalog order.
    pub fn list(&self, server: &str) -> Vec<&'static ToolSpec> {
        let Some(entry) = self.servers.get(server) else {
            return Vec::new();
        };
        entry
            .spec
            .tools
            .iter()
            .filter(|t| entry.states.get(t.name) == Some(&ToolState::Enabled))
            .collect()
    }

    pub fn schemas(&self, server: &str) -> Vec<serde_json::Value> {
        self.list(server)
            .into_iter()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description(),
                        "parameters": call_schema()
                    }
                })
            })
            .collect()
    }
}

fn call_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "command": { "type": "string" },
            "args": { "type": "array", "items": { "type": "string" } },
            "cwd": { "type": "string" },
            "timeoutMs": { "type": "integer", "minimum": 1 },
            "compact": {
                "oneOf": [{ "type": "boolean" }, { "type": "string", "enum": ["auto"] }]
            }
        },
        "additionalProperties": false
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pare_policy::EnvSnapshot;

    fn registry(pairs: &[(&str, &str)]) -> ToolRegistry {
        let env = EnvSnapshot::from_pairs(pairs.iter().copied());
        ToolRegistry::build(&ConfigResolver::new(&env).unwrap())
    }

    #[test]
    fn test_unrestricted_enables_everything() {
        let registry = registry(&[]);
        for server in catalog::SERVERS {
            assert_eq!(registry.list(server.name).len(), server.tools.len());
        }
        assert!(registry.get("git", "status").is_some());
    }

    #[test]
    fn test_disabled_tools_are_invisible() {
        let registry = registry(&[("PARE_GIT_TOOLS", "status,log")]);
        let names: Vec<_> = registry.list("git").iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["status", "log"]);
        assert_eq!(registry.state("git", "push"), Some(ToolState::Disabled));
        assert!(registry.get("git", "push").is_none());
        assert_eq!(registry.schemas("git").len(), 2);
        // other servers unaffected by a per-server list
        assert_eq!(registry.list("npm").len(), catalog::server("npm").unwrap().tools.len());
    }

    #[test]
    fn test_profile_applies_to_all_servers() {
        let registry = registry(&[("PARE_PROFILE", "Minimal")]);
        assert!(registry.get("git", "status").is_some());
        assert!(registry.get("git", "commit").is_none());
        assert!(registry.list("docker").is_empty());
    }

    #[test]
    fn test_unknown_pair_has_no_state() {
        let registry = registry(&[]);
        assert_eq!(registry.state("git", "teleport"), None);
        assert_eq!(registry.state("nope", "status"), None);
    }

    #[test]
    fn test_bad_server_config_disables_only_that_server() {
        let registry = registry(&[("PARE_GIT_STRICT_PATH", "maybe")]);
        assert!(registry.list("git").is_empty());
        assert!(matches!(
            registry.config_error("git"),
            Some(ConfigurationError::MalformedBoolean { .. })
        ));
        assert!(registry.get("npm", "install").is_some());
    }

    #[test]
    fn test_schema_shape() {
        let registry = registry(&[("PARE_TOOLS", "cargo:build")]);
        let schemas = registry.schemas("cargo");
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["function"]["name"], "build");
        assert_eq!(schemas[0]["function"]["parameters"]["type"], "object");
    }
}
