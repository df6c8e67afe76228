use super::print_json;
use anyhow::{bail, Result};
use pare_tools::{catalog, ToolRegistry};
use serde_json::{json, Value};

pub fn run(registry: &ToolRegistry, server: Option<&str>) -> Result<()> {
    let Some(server) = server else {
        return print_json(&overview(registry));
    };
    if catalog::server(server).is_none() {
        bail!("Unknown server '{server}'");
    }
    print_json(&json!({
        "server": server,
        "tools": registry.schemas(server),
    }))
}

/// Every server with its advertised tool names.
pub fn overview(registry: &ToolRegistry) -> Value {
    let servers: Vec<Value> = registry
        .servers()
        .map(|server| {
            let tools: Vec<&str> = registry.list(server).iter().map(|t| t.name).collect();
            let mut entry = json!({ "name": server, "tools": tools });
            if let Some(e) = registry.config_error(server) {
                entry["configError"] = json!(e.to_string());
            }
            entry
        })
        .collect();
    json!({ "servers": servers })
}
