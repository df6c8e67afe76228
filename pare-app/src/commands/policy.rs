use super::print_json;
use anyhow::{Context, Result};
use pare_policy::ConfigResolver;
use pare_tools::catalog;
use serde_json::json;
use tracing::warn;

/// Print the effective configuration of one server.
pub fn run(resolver: &ConfigResolver, server: &str) -> Result<()> {
    if catalog::server(server).is_none() {
        warn!(server, "Server is not in the tool catalog");
    }
    let config = resolver
        .resolve_server(server)
        .with_context(|| format!("Invalid configuration for server '{server}'"))?;
    print_json(&json!({ "server": config }))
}
