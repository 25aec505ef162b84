//! Lexer metadata, regex flags, and engine limits.

use serde::{Deserialize, Serialize};

/// Describes a lexer and the flags its patterns are compiled with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexerConfig {
    pub name: String,
    pub aliases: Vec<String>,
    pub filenames: Vec<String>,
    pub mime_types: Vec<String>,
    pub case_insensitive: bool,
    /// `.` also matches `\n`.
    pub dot_all: bool,
    /// Patterns are multi-line (`^`/`$` at line boundaries) unless this is set.
    pub not_multiline: bool,
    pub priority: f32,
}

impl LexerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Guards against grammars that recurse or spin on adversarial input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_nesting_depth: usize,
    pub max_stack_depth: usize,
    pub max_zero_width_steps: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_stack_depth: 4096,
            max_zero_width_steps: 1024,
        }
    }
}

impl Limits {
    /// Defaults, overridden by `RULELEX_MAX_NESTING`, `RULELEX_MAX_STACK` and
    /// `RULELEX_MAX_ZERO_WIDTH` when they parse.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_nesting_depth: env_usize("RULELEX_MAX_NESTING", d.max_nesting_depth),
            max_stack_depth: env_usize("RULELEX_MAX_STACK", d.max_stack_depth),
            max_zero_width_steps: env_usize("RULELEX_MAX_ZERO_WIDTH", d.max_zero_width_steps),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}
