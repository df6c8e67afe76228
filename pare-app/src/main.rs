use anyhow::{Context, Result};
use pare_app::cli::{self, Command, USAGE};
use pare_app::commands;
use pare_policy::{ConfigResolver, EnvSnapshot};
use pare_tools::ToolRegistry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: i32 = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            std::process::exit(EXIT_USAGE);
        }
    };
    init_tracing(cli.verbose);

    // Read once; nothing below looks at the process environment again.
    let env = EnvSnapshot::capture();
    let resolver = ConfigResolver::new(&env).context("Invalid PARE_* configuration")?;

    let code = match cli.command {
        Command::Help => {
            println!("{USAGE}");
            0
        }
        Command::Policy { server } => {
            commands::policy::run(&resolver, &server)?;
            0
        }
        Command::Tools { server } => {
            let registry = ToolRegistry::build(&resolver);
            commands::tools::run(&registry, server.as_deref())?;
            0
        }
        Command::Run {
            server,
            tool,
            request,
        } => {
            let registry = Arc::new(ToolRegistry::build(&resolver));
            commands::run::run(registry, &server, &tool, request).await?
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr; stdout carries only the JSON result.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
