//! Named tool presets selected with `PARE_PROFILE`.

use crate::error::ConfigurationError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

type ServerTools = (&'static str, &'static [&'static str]);

const GIT_CORE: &[&str] = &["status", "log", "diff", "branch", "show", "add", "commit"];
const SEARCH: &[&str] = &["search", "find"];
const TEST: &[&str] = &["run", "coverage"];

const MINIMAL: &[ServerTools] = &[
    ("git", &["status", "log", "diff", "show"]),
    ("search", &["search"]),
    ("test", &["run"]),
];

const WEB: &[ServerTools] = &[
    ("git", GIT_CORE),
    ("search", SEARCH),
    ("test", TEST),
    ("npm", &["install", "audit", "outdated", "list", "run", "test"]),
    ("build", &["tsc", "build", "esbuild", "vite-build", "webpack"]),
    ("lint", &["lint", "format-check", "prettier-format"]),
];

const PYTHON: &[ServerTools] = &[
    ("git", GIT_CORE),
    ("search", SEARCH),
    ("test", TEST),
    (
        "python",
        &["pip-install", "pip-list", "mypy", "ruff-check", "pytest", "uv-install", "uv-run", "black"],
    ),
];

const RUST: &[ServerTools] = &[
    ("git", GIT_CORE),
    ("search", SEARCH),
    (
        "cargo",
        &["build", "test", "clippy", "run", "add", "remove", "fmt", "doc", "check", "update", "tree"],
    ),
];

const GO: &[ServerTools] = &[
    ("git", GIT_CORE),
    ("search", SEARCH),
    ("go", &["build", "test", "vet", "run", "mod-tidy", "fmt", "generate", "env", "list"]),
];

const DEVOPS: &[ServerTools] = &[
    ("git", GIT_CORE),
    (
        "docker",
        &["ps", "build", "logs", "images", "run", "exec", "compose-up", "compose-down", "pull", "inspect"],
    ),
    ("k8s", &["get", "describe", "logs", "apply"]),
    ("make", &["run", "list"]),
    ("http", &["request", "get"]),
    ("security", &["trivy", "gitleaks"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Minimal,
    Web,
    Python,
    Rust,
    Go,
    Devops,
    Full,
}

impl Profile {
    pub const ALL: [Profile; 7] = [
        Profile::Minimal,
        Profile::Web,
        Profile::Python,
        Profile::Rust,
        Profile::Go,
        Profile::Devops,
        Profile::Full,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Profile::Minimal => "minimal",
            Profile::Web => "web",
            Profile::Python => "python",
            Profile::Rust => "rust",
            Profile::Go => "go",
            Profile::Devops => "devops",
            Profile::Full => "full",
        }
    }

    fn table(self) -> Option<&'static [ServerTools]> {
        match self {
            Profile::Minimal => Some(MINIMAL),
            Profile::Web => Some(WEB),
            Profile::Python => Some(PYTHON),
            Profile::Rust => Some(RUST),
            Profile::Go => Some(GO),
            Profile::Devops => Some(DEVOPS),
            Profile::Full => None,
        }
    }

    pub fn enables(self, server: &str, tool: &str) -> bool {
        match self.table() {
            None => true,
            Some(table) => table
                .iter()
                .any(|(s, tools)| *s == server && tools.contains(&tool)),
        }
    }

    /// Every `server:tool` pair in the preset. Empty for `full`, which enables everything.
    pub fn entries(self) -> BTreeSet<String> {
        self.table()
            .unwrap_or_default()
            .iter()
            .flat_map(|(server, tools)| tools.iter().map(move |t| format!("{server}:{t}")))
            .collect()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigurationError::UnknownProfile(wanted.to_string()))
    }
}
