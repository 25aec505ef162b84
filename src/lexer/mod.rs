pub mod emit;
pub mod engine;
pub mod mutate;
pub mod tables;

use std::fmt;

use rayon::prelude::*;

use crate::{
    config::{LexerConfig, Limits},
    error::LexError,
};
use tables::build::{self, CompiledTable};

pub use emit::{Emitter, Group};
pub use engine::{LexerState, TokenIter};
pub use mutate::Mutator;
pub use tables::{Rule, Rules, TokenType};

/// A classified span of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'t> {
    pub kind: TokenType,
    /// Byte offset in the outermost input.
    pub start: usize,
    pub text: &'t str,
}

impl Token<'_> {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokeniseOptions {
    /// State the stack starts with.
    pub state: String,
    /// Set for runs started by another run's emitter.
    pub nested: bool,
    /// Nesting level; runs deeper than `Limits::max_nesting_depth` are refused.
    pub depth: usize,
}

impl Default for TokeniseOptions {
    fn default() -> Self {
        Self::start_in("root")
    }
}

impl TokeniseOptions {
    pub fn start_in(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            nested: false,
            depth: 0,
        }
    }

    pub(crate) fn nested_in(parent: &LexerState<'_, '_>, state: &str) -> Self {
        Self {
            state: state.to_owned(),
            nested: true,
            depth: parent.depth + 1,
        }
    }
}

pub type Tokens<'s, 't> = Box<dyn Iterator<Item = Result<Token<'t>, LexError>> + 's>;

/// Anything that turns text into a token stream.
pub trait Lexer: Send + Sync {
    fn config(&self) -> &LexerConfig;

    fn tokenise<'s, 't: 's>(
        &'s self,
        options: &TokeniseOptions,
        text: &'t str,
    ) -> Result<Tokens<'s, 't>, LexError>;
}

/// A compiled rule table plus the engine that runs it.
///
/// Immutable after construction; share it (`&` or `Arc`) across any number
/// of concurrent runs.
pub struct RegexLexer {
    config: LexerConfig,
    limits: Limits,
    rules: Rules,
    pub(crate) table: CompiledTable,
}

impl RegexLexer {
    /// Compile `rules`, with limits taken from the environment.
    pub fn new(config: LexerConfig, rules: Rules) -> Result<Self, LexError> {
        Self::with_limits(config, rules, Limits::from_env())
    }

    pub fn with_limits(config: LexerConfig, rules: Rules, limits: Limits) -> Result<Self, LexError> {
        let table = build::compile(&config, &rules)?;
        Ok(Self {
            config,
            limits,
            rules,
            table,
        })
    }

    pub fn config(&self) -> &LexerConfig {
        &self.config
    }

    /// The rules as authored (includes and combined mutators unexpanded).
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Authored states followed by synthesised combined states.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.table.states.iter().map(|s| s.name.as_str())
    }

    pub(crate) fn state_name(&self, id: mutate::StateId) -> &str {
        self.table
            .states
            .get(id)
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }

    pub fn tokenise_iter<'s, 't>(
        &'s self,
        options: &TokeniseOptions,
        text: &'t str,
    ) -> Result<TokenIter<'s, 't>, LexError> {
        TokenIter::new(self, options, text)
    }

    /// Tokenise from `root` and collect.
    pub fn tokenise_all<'t>(&self, text: &'t str) -> Result<Vec<Token<'t>>, LexError> {
        self.tokenise_iter(&TokeniseOptions::default(), text)?
            .collect()
    }

    /// Tokenise independent inputs in parallel against this one grammar.
    pub fn tokenise_many<'t>(&self, inputs: &[&'t str]) -> Vec<Result<Vec<Token<'t>>, LexError>> {
        inputs
            .par_iter()
            .map(|&text| self.tokenise_all(text))
            .collect()
    }
}

impl Lexer for RegexLexer {
    fn config(&self) -> &LexerConfig {
        &self.config
    }

    fn tokenise<'s, 't: 's>(
        &'s self,
        options: &TokeniseOptions,
        text: &'t str,
    ) -> Result<Tokens<'s, 't>, LexError> {
        Ok(Box::new(self.tokenise_iter(options, text)?))
    }
}

impl fmt::Debug for RegexLexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexLexer")
            .field("name", &self.config.name)
            .field("states", &self.table.states.len())
            .finish()
    }
}
