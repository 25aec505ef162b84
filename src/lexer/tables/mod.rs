pub mod build;
pub mod io;
pub mod tokens;
pub mod xml;

use indexmap::IndexMap;

use crate::lexer::{
    Lexer, LexerState, Token,
    emit::{EmitterFn, Group, UsingByGroup},
    mutate::Mutator,
};
use crate::registry::LexerResolver;
use std::sync::Arc;

pub use crate::lexer::emit::Emitter;
pub use io::{load_rules_json, load_rules_json_bytes, rules_to_json, save_rules_json};
pub use tokens::TokenType;
pub use xml::{
    lexer_from_xml, lexer_to_xml, load_lexer_xml, rules_from_xml, rules_to_xml, save_lexer_xml,
};

/// One (pattern, emitter, mutator) triple.
///
/// A rule without a pattern always matches zero characters; it must then
/// carry a mutator.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub pattern: Option<String>,
    pub emitter: Option<Emitter>,
    pub mutator: Option<Mutator>,
}

/// State name -> ordered rules. Declaration order is match priority.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules {
    states: IndexMap<String, Vec<Rule>>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Rules::insert`].
    pub fn state(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.insert(name, rules);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) {
        self.states.insert(name.into(), rules.into_iter().collect());
    }

    pub fn get(&self, name: &str) -> Option<&[Rule]> {
        self.states.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.states.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<Rule>)> for Rules {
    fn from_iter<I: IntoIterator<Item = (S, Vec<Rule>)>>(iter: I) -> Self {
        Self {
            states: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

// -------------------- rule builders --------------------

pub fn rule(
    pattern: impl Into<String>,
    emitter: impl Into<Emitter>,
    mutator: Option<Mutator>,
) -> Rule {
    Rule {
        pattern: Some(pattern.into()),
        emitter: Some(emitter.into()),
        mutator,
    }
}

/// Splice another state's rules in at this position.
pub fn include(state: impl Into<String>) -> Rule {
    Rule {
        pattern: None,
        emitter: None,
        mutator: Some(Mutator::Include(state.into())),
    }
}

/// Pattern-less rule: always applies `mutator` without consuming input.
pub fn default(mutator: Mutator) -> Rule {
    Rule {
        pattern: None,
        emitter: None,
        mutator: Some(mutator),
    }
}

// -------------------- mutator builders --------------------

/// Push states; the last one becomes the top. No names pushes the current state.
pub fn push<I, S>(states: I) -> Mutator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Mutator::Push(states.into_iter().map(Into::into).collect())
}

pub fn pop(depth: usize) -> Mutator {
    Mutator::Pop(depth)
}

pub fn combined<I, S>(states: I) -> Mutator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Mutator::Combined(states.into_iter().map(Into::into).collect())
}

pub fn mutators(list: impl IntoIterator<Item = Mutator>) -> Mutator {
    Mutator::Multi(list.into_iter().collect())
}

// -------------------- emitter builders --------------------

impl From<TokenType> for Emitter {
    fn from(t: TokenType) -> Self {
        Emitter::Token(t)
    }
}

impl From<TokenType> for Option<Emitter> {
    fn from(t: TokenType) -> Self {
        Some(Emitter::Token(t))
    }
}

/// One emitter per capture group, in group order. `None` skips a group.
pub fn by_groups<I, E>(emitters: I) -> Emitter
where
    I: IntoIterator<Item = E>,
    E: Into<Option<Emitter>>,
{
    Emitter::ByGroups(emitters.into_iter().map(Into::into).collect())
}

/// Emitters keyed by group name (unnamed groups by their index).
pub fn by_group_names<I, K, E>(emitters: I) -> Emitter
where
    I: IntoIterator<Item = (K, E)>,
    K: Into<String>,
    E: Into<Option<Emitter>>,
{
    Emitter::ByGroupNames(
        emitters
            .into_iter()
            .map(|(k, e)| (k.into(), e.into()))
            .collect(),
    )
}

/// Run the whole match through another lexer.
pub fn using(lexer: Arc<dyn Lexer>) -> Emitter {
    Emitter::Using(lexer)
}

/// Re-enter the current grammar at `state` for the whole match.
pub fn using_self(state: impl Into<String>) -> Emitter {
    Emitter::UsingSelf(state.into())
}

/// Tokenise group `code_group` with the lexer named by group `name_group`,
/// falling back to `emitters` (one per group) when the name does not resolve.
pub fn using_by_group<I, E>(
    resolver: Arc<dyn LexerResolver>,
    name_group: usize,
    code_group: usize,
    emitters: I,
) -> Emitter
where
    I: IntoIterator<Item = E>,
    E: Into<Option<Emitter>>,
{
    Emitter::UsingByGroup(Arc::new(UsingByGroup {
        resolver,
        name_group,
        code_group,
        emitters: emitters.into_iter().map(Into::into).collect(),
    }))
}

/// Wrap a plain function as an emitter. Such emitters cannot be serialised.
pub fn emit_fn<F>(f: F) -> Emitter
where
    F: for<'l, 't> Fn(&[Option<Group<'t>>], &LexerState<'l, 't>) -> Vec<Token<'t>>
        + Send
        + Sync
        + 'static,
{
    Emitter::Func(EmitterFn(Arc::new(f)))
}
