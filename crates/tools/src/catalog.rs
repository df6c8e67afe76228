//! Static table of tool servers and the command each tool runs.

use pare_executor::TimeoutClass::{self, Long, Quick, Standard};
use serde::Serialize;

/// Which caller arguments are filesystem paths and go through root confinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PathArgs {
    None,
    All,
    /// The first argument is something else (a search pattern); the rest are paths.
    AfterFirst,
}

impl PathArgs {
    pub fn is_path(self, index: usize) -> bool {
        match self {
            PathArgs::None => false,
            PathArgs::All => true,
            PathArgs::AfterFirst => index > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    /// Executable run when the call does not name one.
    pub program: &'static str,
    /// Trusted arguments placed before anything the caller supplies.
    pub args: &'static [&'static str],
    pub timeout: TimeoutClass,
    pub path_args: PathArgs,
}

impl ToolSpec {
    const fn new(
        name: &'static str,
        program: &'static str,
        args: &'static [&'static str],
        timeout: TimeoutClass,
    ) -> Self {
        Self {
            name,
            program,
            args,
            timeout,
            path_args: PathArgs::None,
        }
    }

    const fn paths(self) -> Self {
        Self {
            path_args: PathArgs::All,
            ..self
        }
    }

    const fn paths_after_first(self) -> Self {
        Self {
            path_args: PathArgs::AfterFirst,
            ..self
        }
    }

    pub fn description(&self) -> String {
        if self.args.is_empty() {
            format!("Run `{}`", self.program)
        } else {
            format!("Run `{} {}`", self.program, self.args.join(" "))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServerSpec {
    pub name: &'static str,
    pub tools: &'static [ToolSpec],
}

impl ServerSpec {
    pub fn tool(&self, name: &str) -> Option<&'static ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}

const GIT: &[ToolSpec] = &[
    ToolSpec::new("status", "git", &["status", "--porcelain=v1", "--branch"], Quick),
    ToolSpec::new("log", "git", &["log", "--oneline"], Quick),
    ToolSpec::new("diff", "git", &["diff"], Quick),
    ToolSpec::new("branch", "git", &["branch", "--list"], Quick),
    ToolSpec::new("show", "git", &["show"], Quick),
    ToolSpec::new("add", "git", &["add", "--"], Quick).paths(),
    ToolSpec::new("commit", "git", &["commit", "-m"], Quick),
    ToolSpec::new("push", "git", &["push"], Standard),
    ToolSpec::new("pull", "git", &["pull"], Standard),
    ToolSpec::new("checkout", "git", &["checkout"], Quick),
    ToolSpec::new("stash", "git", &["stash"], Quick),
    ToolSpec::new("tag", "git", &["tag"], Quick),
    ToolSpec::new("remote", "git", &["remote", "-v"], Quick),
    ToolSpec::new("blame", "git", &["blame", "--"], Quick).paths(),
];

const GITHUB: &[ToolSpec] = &[
    ToolSpec::new("pr-view", "gh", &["pr", "view"], Quick),
    ToolSpec::new("pr-list", "gh", &["pr", "list"], Quick),
    ToolSpec::new("issue-view", "gh", &["issue", "view"], Quick),
    ToolSpec::new("issue-list", "gh", &["issue", "list"], Quick),
    ToolSpec::new("run-list", "gh", &["run", "list"], Quick),
];

const SEARCH: &[ToolSpec] = &[
    ToolSpec::new("search", "rg", &["--line-number", "--"], Quick).paths_after_first(),
    ToolSpec::new("find", "rg", &["--files"], Quick).paths(),
    ToolSpec::new("count", "rg", &["--count", "--"], Quick).paths_after_first(),
];

const TEST: &[ToolSpec] = &[
    ToolSpec::new("run", "npm", &["test", "--"], Long).paths(),
    ToolSpec::new("coverage", "npm", &["run", "coverage", "--"], Long).paths(),
];

const NPM: &[ToolSpec] = &[
    ToolSpec::new("install", "npm", &["install"], Standard),
    ToolSpec::new("audit", "npm", &["audit", "--json"], Standard),
    ToolSpec::new("outdated", "npm", &["outdated", "--json"], Quick),
    ToolSpec::new("list", "npm", &["ls", "--json"], Quick),
    ToolSpec::new("run", "npm", &["run"], Long),
    ToolSpec::new("test", "npm", &["test"], Long),
    ToolSpec::new("init", "npm", &["init", "--yes"], Quick),
];

const BUILD: &[ToolSpec] = &[
    ToolSpec::new("tsc", "npx", &["tsc", "--noEmit"], Long).paths(),
    ToolSpec::new("build", "npm", &["run", "build"], Long),
    ToolSpec::new("esbuild", "npx", &["esbuild"], Long).paths(),
    ToolSpec::new("vite-build", "npx", &["vite", "build"], Long).paths(),
    ToolSpec::new("webpack", "npx", &["webpack"], Long).paths(),
];

const LINT: &[ToolSpec] = &[
    ToolSpec::new("lint", "npx", &["eslint", "--format", "json"], Standard).paths(),
    ToolSpec::new("format-check", "npx", &["prettier", "--check"], Standard).paths(),
    ToolSpec::new("prettier-format", "npx", &["prettier", "--write"], Standard).paths(),
    ToolSpec::new("biome-check", "npx", &["biome", "check"], Standard).paths(),
];

const PYTHON: &[ToolSpec] = &[
    ToolSpec::new("pip-install", "pip", &["install"], Standard),
    ToolSpec::new("pip-list", "pip", &["list", "--format=json"], Quick),
    ToolSpec::new("mypy", "mypy", &[], Standard).paths(),
    ToolSpec::new("ruff-check", "ruff", &["check", "--output-format=json"], Standard).paths(),
    ToolSpec::new("pytest", "pytest", &[], Long).paths(),
    ToolSpec::new("uv-install", "uv", &["pip", "install"], Standard),
    ToolSpec::new("uv-run", "uv", &["run"], Long).paths(),
    ToolSpec::new("black", "black", &[], Standard).paths(),
    ToolSpec::new("pip-audit", "pip-audit", &["--format=json"], Standard),
];

const CARGO: &[ToolSpec] = &[
    ToolSpec::new("build", "cargo", &["build", "--message-format=json"], Long),
    ToolSpec::new("test", "cargo", &["test"], Long),
    ToolSpec::new("clippy", "cargo", &["clippy", "--message-format=json"], Long),
    ToolSpec::new("run", "cargo", &["run"], Long),
    ToolSpec::new("add", "cargo", &["add"], Standard),
    ToolSpec::new("remove", "cargo", &["remove"], Standard),
    ToolSpec::new("fmt", "cargo", &["fmt"], Standard),
    ToolSpec::new("doc", "cargo", &["doc"], Long),
    ToolSpec::new("check", "cargo", &["check", "--message-format=json"], Long),
    ToolSpec::new("update", "cargo", &["update"], Standard),
    ToolSpec::new("tree", "cargo", &["tree"], Quick),
    ToolSpec::new("audit", "cargo", &["audit", "--json"], Standard),
];

const GO: &[ToolSpec] = &[
    ToolSpec::new("build", "go", &["build"], Long).paths(),
    ToolSpec::new("test", "go", &["test", "-json"], Long).paths(),
    ToolSpec::new("vet", "go", &["vet"], Standard).paths(),
    ToolSpec::new("run", "go", &["run"], Long).paths(),
    ToolSpec::new("mod-tidy", "go", &["mod", "tidy"], Standard),
    ToolSpec::new("fmt", "gofmt", &["-l"], Quick).paths(),
    ToolSpec::new("generate", "go", &["generate"], Long).paths(),
    ToolSpec::new("env", "go", &["env", "-json"], Quick),
    ToolSpec::new("list", "go", &["list", "-json"], Quick),
    ToolSpec::new("golangci-lint", "golangci-lint", &["run", "--out-format=json"], Long)
        .paths(),
];

const DOCKER: &[ToolSpec] = &[
    ToolSpec::new("ps", "docker", &["ps", "--format", "json"], Quick),
    ToolSpec::new("build", "docker", &["build"], Long).paths(),
    ToolSpec::new("logs", "docker", &["logs"], Quick),
    ToolSpec::new("images", "docker", &["images", "--format", "json"], Quick),
    ToolSpec::new("run", "docker", &["run", "--rm"], Long),
    ToolSpec::new("exec", "docker", &["exec"], Standard),
    ToolSpec::new("compose-up", "docker", &["compose", "up", "-d"], Long),
    ToolSpec::new("compose-down", "docker", &["compose", "down"], Standard),
    ToolSpec::new("pull", "docker", &["pull"], Long),
    ToolSpec::new("inspect", "docker", &["inspect"], Quick),
];

const K8S: &[ToolSpec] = &[
    ToolSpec::new("get", "kubectl", &["get", "-o", "json"], Quick),
    ToolSpec::new("describe", "kubectl", &["describe"], Quick),
    ToolSpec::new("logs", "kubectl", &["logs"], Quick),
    ToolSpec::new("apply", "kubectl", &["apply", "-f"], Standard).paths(),
];

const MAKE: &[ToolSpec] = &[
    ToolSpec::new("run", "make", &[], Long),
    ToolSpec::new("list", "make", &["-qp"], Quick),
];

const HTTP: &[ToolSpec] = &[
    ToolSpec::new("request", "curl", &["-sS", "-i"], Standard),
    ToolSpec::new("get", "curl", &["-sS", "-i", "-X", "GET"], Standard),
    ToolSpec::new("post", "curl", &["-sS", "-i", "-X", "POST"], Standard),
    ToolSpec::new("head", "curl", &["-sS", "-I"], Quick),
];

const SECURITY: &[ToolSpec] = &[
    ToolSpec::new("trivy", "trivy", &["fs", "--format", "json"], Long).paths(),
    ToolSpec::new("gitleaks", "gitleaks", &["detect", "--report-format", "json", "--source"], Long)
        .paths(),
    ToolSpec::new("semgrep", "semgrep", &["scan", "--json"], Long).paths(),
];

pub const SERVERS: &[ServerSpec] = &[
    ServerSpec { name: "git", tools: GIT },
    ServerSpec { name: "github", tools: GITHUB },
    ServerSpec { name: "search", tools: SEARCH },
    ServerSpec { name: "test", tools: TEST },
    ServerSpec { name: "npm", tools: NPM },
    ServerSpec { name: "build", tools: BUILD },
    ServerSpec { name: "lint", tools: LINT },
    ServerSpec { name: "python", tools: PYTHON },
    ServerSpec { name: "cargo", tools: CARGO },
    ServerSpec { name: "go", tools: GO },
    ServerSpec { name: "docker", tools: DOCKER },
    ServerSpec { name: "make", tools: MAKE },
    ServerSpec { name: "k8s", tools: K8S },
    ServerSpec { name: "http", tools: HTTP },
    ServerSpec { name: "security", tools: SECURITY },
];

pub fn server(name: &str) -> Option<&'static ServerSpec> {
    SERVERS.iter().find(|s| s.name == name)
}
