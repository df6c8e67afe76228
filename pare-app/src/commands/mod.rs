pub mod policy;
pub mod run;
pub mod tools;

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// Pretty-print `value` as the single JSON document on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
