//! Rule-driven lexing: grammars are ordered regex rules grouped into named
//! states, run by a stack machine that emits classified tokens.

pub mod config;
pub mod error;
pub mod lexer;
pub mod registry;

pub use config::{LexerConfig, Limits};
pub use error::{LexError, SerialiseError};
pub use lexer::{
    Emitter, Lexer, LexerState, Mutator, RegexLexer, Rule, Rules, Token, TokenIter, TokenType,
    TokeniseOptions,
};
pub use registry::{LexerResolver, Registry};
