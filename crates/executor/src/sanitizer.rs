//! Redaction of filesystem layout from text leaving the server.
//!
//! Only outbound text (stderr, diagnostics, policy errors) goes through here; nothing sent to
//! the wrapped CLI is rewritten.

use once_cell::sync::Lazy;
use pare_policy::ServerConfig;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use tracing::warn;

pub const REDACTED: &str = "<redacted-path>";

#[allow(clippy::expect_used)]
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI pattern is valid")
});

#[allow(clippy::expect_used)]
static SYSTEM_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"/(?:etc|var|opt|usr|tmp|srv|snap|nix)(?:/[^\s"'`<>|:;,()\[\]{}]+)+"#)
        .expect("system path pattern is valid")
});

#[allow(clippy::expect_used)]
static WINDOWS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[A-Za-z]:[\\/](?:Program Files(?: \(x86\))?[\\/])?[^\s"'`<>|:;,()\[\]{}]*"#)
        .expect("windows path pattern is valid")
});

/// Remove ANSI color and cursor escape sequences.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

#[derive(Debug, Clone)]
pub struct OutputSanitizer {
    /// Pattern for the home directory and the byte length of the home prefix it matches.
    home: Option<(Regex, usize)>,
    broad: bool,
}

impl OutputSanitizer {
    pub fn new(home_dir: Option<&Path>, sanitize_all_paths: bool) -> Self {
        Self {
            home: home_dir.and_then(home_pattern),
            broad: sanitize_all_paths,
        }
    }

    pub fn for_server(config: &ServerConfig) -> Self {
        Self::new(config.home_dir.as_deref(), config.policy.sanitize_all_paths)
    }

    pub fn sanitize(&self, text: &str) -> String {
        let mut out = match &self.home {
            Some((home, prefix_len)) => rewrite(text, home, |matched| {
                let tail = matched.get(*prefix_len..).unwrap_or("");
                Some(format!("~{}", tail.replace('\\', "/")))
            }),
            None => text.to_string(),
        };

        if self.broad {
            out = rewrite(&out, &SYSTEM_PATH, redact);
            out = rewrite(&out, &WINDOWS_PATH, |matched| {
                let first = matched[3..].split(is_separator).next().unwrap_or("");
                if first.eq_ignore_ascii_case("Users") {
                    None
                } else {
                    redact(matched)
                }
            });
        }
        out
    }
}

fn home_pattern(home: &Path) -> Option<(Regex, usize)> {
    let home = home.to_string_lossy();
    let home = home.trim_end_matches(is_separator);
    if home.is_empty() {
        return None;
    }
    let case_insensitive = home.as_bytes().get(1) == Some(&b':');
    let pattern = format!(
        r#"{}{}(?:[/\\][^\s"'`<>|:;,()\[\]{{}}]*)?"#,
        if case_insensitive { "(?i)" } else { "" },
        regex::escape(home)
    );
    match Regex::new(&pattern) {
        Ok(re) => Some((re, home.len())),
        Err(e) => {
            warn!(error = %e, "Home directory redaction disabled");
            None
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn redact(path: &str) -> Option<String> {
    path.rsplit(is_separator)
        .find(|segment| !segment.is_empty())
        .map(|basename| format!("{REDACTED}/{basename}"))
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '/' | '\\' | '.' | '_' | '-' | '~')
}

/// Apply `replace` to every match that stands on its own, i.e. is not the middle of a longer
/// path or name. Returning `None` leaves the match unchanged.
fn rewrite(text: &str, re: &Regex, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in re.find_iter(text) {
        let prev = text[..m.start()].chars().next_back();
        let next = text[m.end()..].chars().next();
        let glued_before = prev.is_some_and(is_path_char);
        let glued_after = next.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if glued_before || glued_after {
            continue;
        }
        if let Some(replacement) = replace(m.as_str()) {
            out.push_str(&text[last..m.start()]);
            out.push_str(&replacement);
            last = m.end();
        }
    }
    out.push_str(&text[last..]);
    out
}
