//! Command-line parsing for the `pare` binary.

use anyhow::{anyhow, bail, Context, Result};
use pare_tools::{CallRequest, CompactMode};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage:
  pare [--verbose] tools [SERVER]
  pare [--verbose] policy SERVER
  pare [--verbose] run SERVER TOOL [--cwd DIR] [--timeout-ms N] [--compact auto|true|false]
                       [--command CMD] [-- ARGS...]

Configuration is read from PARE_* environment variables. Logs go to stderr (RUST_LOG);
results are printed to stdout as JSON.";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Tools { server: Option<String> },
    Policy { server: String },
    Run { server: String, tool: String, request: CallRequest },
    Help,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Cli {
    pub verbose: bool,
    pub command: Command,
}

pub fn parse<I>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().peekable();
    let mut verbose = false;
    while let Some(flag) = args.next_if(|a| a.starts_with('-')) {
        match flag.as_str() {
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => {
                return Ok(Cli {
                    verbose,
                    command: Command::Help,
                })
            }
            other => bail!("unknown option '{other}'"),
        }
    }

    let command = match args.next().as_deref() {
        None | Some("help") => Command::Help,
        Some("tools") => {
            let server = args.next();
            no_more(args)?;
            Command::Tools { server }
        }
        Some("policy") => {
            let server = args.next().ok_or_else(|| anyhow!("policy needs a SERVER"))?;
            no_more(args)?;
            Command::Policy { server }
        }
        Some("run") => parse_run(args)?,
        Some(other) => bail!("unknown command '{other}'"),
    };
    Ok(Cli { verbose, command })
}

fn parse_run(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let server = args.next().ok_or_else(|| anyhow!("run needs a SERVER"))?;
    let tool = args.next().ok_or_else(|| anyhow!("run needs a TOOL"))?;
    let mut request = CallRequest::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| anyhow!("{name} needs a value"));
        match arg.as_str() {
            "--" => break,
            "--cwd" => request.cwd = Some(PathBuf::from(value("--cwd")?)),
            "--timeout-ms" => {
                let raw = value("--timeout-ms")?;
                let ms = raw
                    .parse::<u64>()
                    .with_context(|| format!("--timeout-ms expects milliseconds, got '{raw}'"))?;
                request.timeout_ms = Some(ms);
            }
            "--compact" => {
                request.compact = value("--compact")?
                    .parse::<CompactMode>()
                    .map_err(|e| anyhow!("--compact: {e}"))?;
            }
            "--command" => request.command = Some(value("--command")?),
            other => bail!("unexpected argument '{other}' (put tool arguments after --)"),
        }
    }
    request.args = args.collect();
    Ok(Command::Run {
        server,
        tool,
        request,
    })
}

fn no_more(mut args: impl Iterator<Item = String>) -> Result<()> {
    match args.next() {
        Some(extra) => bail!("unexpected argument '{extra}'"),
        None => Ok(()),
    }
}
