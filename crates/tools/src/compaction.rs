//! Choice between the full and compact JSON shape of a tool result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Per-tool pair of output shapes.
///
/// `to_compact` drops detail the caller can usually live without; it is never a superset of
/// `to_full`.
pub trait Reducer {
    type Full: Serialize;
    type Compact: Serialize;

    fn to_full(&self) -> Self::Full;
    fn to_compact(&self) -> Self::Compact;
}

/// Requested compaction behaviour. `compact: true` and `compact: "auto"` both mean auto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CompactFlag", into = "CompactFlag")]
pub enum CompactMode {
    #[default]
    Auto,
    /// Always return the full shape.
    Full,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CompactFlag {
    Bool(bool),
    Text(String),
}

impl TryFrom<CompactFlag> for CompactMode {
    type Error = String;

    fn try_from(flag: CompactFlag) -> Result<Self, Self::Error> {
        match flag {
            CompactFlag::Bool(true) => Ok(CompactMode::Auto),
            CompactFlag::Bool(false) => Ok(CompactMode::Full),
            CompactFlag::Text(text) => text.parse(),
        }
    }
}

impl From<CompactMode> for CompactFlag {
    fn from(mode: CompactMode) -> Self {
        match mode {
            CompactMode::Auto => CompactFlag::Text("auto".into()),
            CompactMode::Full => CompactFlag::Bool(false),
        }
    }
}

impl FromStr for CompactMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "true" => Ok(CompactMode::Auto),
            "false" => Ok(CompactMode::Full),
            other => Err(format!("expected true, false or \"auto\", got '{other}'")),
        }
    }
}

impl fmt::Display for CompactMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompactMode::Auto => write!(f, "auto"),
            CompactMode::Full => write!(f, "false"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Full,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionChoice {
    pub chosen: Representation,
    pub full_token_estimate: usize,
    pub compact_token_estimate: usize,
}

/// The chosen shape, already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Compacted {
    pub choice: CompactionChoice,
    pub value: Value,
}

/// Estimate the token cost of text.
///
/// # Arguments
/// * `text` - Serialized output as it will be sent
///
/// # Returns
/// `ceil(bytes / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate the token cost of a JSON value in its compact serialized form.
pub fn estimate_value_tokens(value: &Value) -> usize {
    estimate_tokens(&value.to_string())
}

/// Pick a shape from the two estimates. Compact wins only when strictly cheaper.
pub fn decide(mode: CompactMode, full_tokens: usize, compact_tokens: usize) -> CompactionChoice {
    let chosen = match mode {
        CompactMode::Auto if compact_tokens < full_tokens => Representation::Compact,
        _ => Representation::Full,
    };
    CompactionChoice {
        chosen,
        full_token_estimate: full_tokens,
        compact_token_estimate: compact_tokens,
    }
}

/// Serialize both shapes of `result` and keep the one `mode` selects.
///
/// # Arguments
/// * `result` - Tool result providing both shapes
/// * `mode` - Requested compaction behaviour
///
/// # Returns
/// The choice with its estimates, and the chosen value
pub fn compact<R: Reducer>(result: &R, mode: CompactMode) -> Result<Compacted, serde_json::Error> {
    let full = serde_json::to_value(result.to_full())?;
    let compact = serde_json::to_value(result.to_compact())?;
    let choice = decide(mode, estimate_value_tokens(&full), estimate_value_tokens(&compact));
    debug!(
        mode = %mode,
        chosen = ?choice.chosen,
        full_tokens = choice.full_token_estimate,
        compact_tokens = choice.compact_token_estimate,
        "Compaction decided"
    );
    let value = match choice.chosen {
        Representation::Full => full,
        Representation::Compact => compact,
    };
    Ok(Compacted { choice, value })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    struct Pair {
        full: Value,
        compact: Value,
    }

    impl Reducer for Pair {
        type Full = Value;
        type Compact = Value;

        fn to_full(&self) -> Value {
            self.full.clone()
        }

        fn to_compact(&self) -> Value {
            self.compact.clone()
        }
    }

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // bytes, not chars
        assert_eq!(estimate_tokens("ééé"), 2);
    }

    #[test]
    fn test_auto_prefers_strictly_smaller_compact() {
        let pair = Pair {
            full: json!({"files": ["a.rs", "b.rs", "c.rs"], "total": 3}),
            compact: json!({"total": 3}),
        };
        let out = compact(&pair, CompactMode::Auto).unwrap();
        assert_eq!(out.choice.chosen, Representation::Compact);
        assert_eq!(out.value, json!({"total": 3}));
        assert!(out.choice.compact_token_estimate < out.choice.full_token_estimate);
    }

    #[test]
    fn test_tie_keeps_full() {
        let choice = decide(CompactMode::Auto, 10, 10);
        assert_eq!(choice.chosen, Representation::Full);
    }

    #[test]
    fn test_false_always_full() {
        let pair = Pair {
            full: json!({"big": "x".repeat(500)}),
            compact: json!({}),
        };
        let out = compact(&pair, CompactMode::Full).unwrap();
        assert_eq!(out.choice.chosen, Representation::Full);
        assert_eq!(out.value, pair.full);
    }

    #[test]
    fn test_mode_from_json() {
        let parse = |v: Value| serde_json::from_value::<CompactMode>(v);
        assert_eq!(parse(json!(true)).unwrap(), CompactMode::Auto);
        assert_eq!(parse(json!("auto")).unwrap(), CompactMode::Auto);
        assert_eq!(parse(json!(false)).unwrap(), CompactMode::Full);
        assert!(parse(json!("sometimes")).is_err());
        assert!(parse(json!(1)).is_err());
    }

    #[test]
    fn test_choice_serialization() {
        let choice = decide(CompactMode::Auto, 40, 12);
        assert_eq!(
            serde_json::to_value(choice).unwrap(),
            json!({"chosen": "compact", "fullTokenEstimate": 40, "compactTokenEstimate": 12})
        );
    }

    proptest! {
        #[test]
        fn prop_auto_never_picks_the_larger_shape(full in ".{0,200}", compact_text in ".{0,200}") {
            let pair = Pair { full: json!({"text": full}), compact: json!({"text": compact_text}) };
            let out = compact(&pair, CompactMode::Auto).unwrap();
            let chosen = estimate_value_tokens(&out.value);
            let other = match out.choice.chosen {
                Representation::Full => out.choice.compact_token_estimate,
                Representation::Compact => out.choice.full_token_estimate,
            };
            prop_assert!(chosen <= other);
        }

        #[test]
        fn prop_decision_is_deterministic(full in 0usize..10_000, compact_tokens in 0usize..10_000) {
            prop_assert_eq!(
                decide(CompactMode::Auto, full, compact_tokens),
                decide(CompactMode::Auto, full, compact_tokens)
            );
        }
    }
}
