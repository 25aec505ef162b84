use thiserror::Error;

/// Failures raised while compiling a grammar or running the engine.
///
/// Unmatched input and by-groups arity mismatches are *not* errors: they show
/// up as `TokenType::Error` tokens in the output stream.
#[derive(Debug, Error)]
pub enum LexError {
    #[error("invalid rule #{index} in state {state:?}: {reason}")]
    InvalidRule {
        state: String,
        index: usize,
        reason: String,
    },
    #[error("state {from:?} references unknown state {name:?}")]
    DanglingState { from: String, name: String },
    #[error("cyclic include: {}", chain.join(" -> "))]
    CyclicInclude { chain: Vec<String> },
    #[error("bad pattern {pattern:?} in state {state:?}: {message}")]
    Pattern {
        state: String,
        pattern: String,
        message: String,
    },
    #[error(
        "using-by-group in state {state:?} has {emitters} emitters but pattern {pattern:?} has {groups} groups"
    )]
    UsingByGroupArity {
        state: String,
        pattern: String,
        emitters: usize,
        groups: usize,
    },
    #[error("unknown start state {0:?}")]
    UnknownState(String),
    #[error("rule #{rule} in state {state:?} matched zero characters at {pos} without a mutator")]
    ZeroWidthMatch {
        state: String,
        rule: usize,
        pos: usize,
    },
    #[error("no progress after {steps} zero-width matches at offset {pos}")]
    NoProgress { pos: usize, steps: usize },
    #[error("state stack exceeded {limit} entries at offset {pos}")]
    StackOverflow { pos: usize, limit: usize },
    #[error("nested tokenisation exceeded depth {limit}")]
    NestingTooDeep { limit: usize },
    #[error("group index {index} out of range for a match with {groups} groups")]
    GroupOutOfRange { index: usize, groups: usize },
    #[error("nested lexer {lexer:?} failed: {source}")]
    Nested {
        lexer: String,
        #[source]
        source: Box<LexError>,
    },
}

/// Failures raised by the XML / JSON grammar codecs.
#[derive(Debug, Error)]
pub enum SerialiseError {
    #[error("unknown token type {0:?}")]
    UnknownTokenType(String),
    #[error("unknown emitter kind {0:?}")]
    UnknownEmitter(String),
    #[error("unknown mutator kind {0:?}")]
    UnknownMutator(String),
    #[error("duplicate emitter {0:?}")]
    DuplicateEmitter(String),
    #[error("duplicate mutator {0:?}")]
    DuplicateMutator(String),
    #[error("emitter in state {state:?} rule #{index} cannot be serialised ({kind})")]
    NotSerialisable {
        state: String,
        index: usize,
        kind: &'static str,
    },
    #[error("no lexer registered as {0:?}")]
    UnknownLexer(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
