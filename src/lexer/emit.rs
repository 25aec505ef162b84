//! Turning one match into zero or more tokens.

use std::{fmt, slice, sync::Arc};

use indexmap::IndexMap;
use log::debug;

use crate::{
    error::LexError,
    lexer::{Lexer, LexerState, Token, TokeniseOptions, tables::TokenType},
    registry::LexerResolver,
};

/// A captured group: its text and its byte offset in the run's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group<'t> {
    pub text: &'t str,
    pub start: usize,
}

impl<'t> Group<'t> {
    #[inline]
    pub fn token(self, kind: TokenType) -> Token<'t> {
        Token {
            kind,
            start: self.start,
            text: self.text,
        }
    }
}

type EmitFnInner = dyn for<'l, 't> Fn(&[Option<Group<'t>>], &LexerState<'l, 't>) -> Vec<Token<'t>>
    + Send
    + Sync;

/// Type-erased emitter. Never serialisable.
#[derive(Clone)]
pub struct EmitterFn(pub(crate) Arc<EmitFnInner>);

/// Parameters of [`Emitter::UsingByGroup`].
pub struct UsingByGroup {
    pub resolver: Arc<dyn LexerResolver>,
    pub name_group: usize,
    pub code_group: usize,
    pub emitters: Vec<Option<Emitter>>,
}

/// How a match becomes tokens.
#[derive(Clone)]
pub enum Emitter {
    /// The whole match as one token.
    Token(TokenType),
    /// Emitter `i` applies to group `i + 1`.
    ByGroups(Vec<Option<Emitter>>),
    /// Emitters keyed by group name.
    ByGroupNames(IndexMap<String, Option<Emitter>>),
    /// Delegate the whole match to another lexer.
    Using(Arc<dyn Lexer>),
    /// Delegate the whole match to this grammar, starting in the named state.
    UsingSelf(String),
    /// Delegate one group to a lexer named by another group.
    UsingByGroup(Arc<UsingByGroup>),
    Func(EmitterFn),
}

/// Element names of the serialisable emitters.
pub const EMITTER_KINDS: &[&str] = &["token", "bygroups", "bygroupnames", "using", "usingself"];

impl Emitter {
    pub fn kind(&self) -> &'static str {
        match self {
            Emitter::Token(_) => "token",
            Emitter::ByGroups(_) => "bygroups",
            Emitter::ByGroupNames(_) => "bygroupnames",
            Emitter::Using(_) => "using",
            Emitter::UsingSelf(_) => "usingself",
            Emitter::UsingByGroup(_) => "usingbygroup",
            Emitter::Func(_) => "func",
        }
    }

    /// The first non-serialisable emitter kind reachable from `self`, if any.
    pub fn unserialisable_kind(&self) -> Option<&'static str> {
        match self {
            Emitter::UsingByGroup(_) | Emitter::Func(_) => Some(self.kind()),
            Emitter::ByGroups(list) => list.iter().flatten().find_map(Emitter::unserialisable_kind),
            Emitter::ByGroupNames(map) => map.values().flatten().find_map(Emitter::unserialisable_kind),
            Emitter::Token(_) | Emitter::Using(_) | Emitter::UsingSelf(_) => None,
        }
    }

    /// `groups[0]` is the whole match (or the single group an outer by-groups
    /// emitter handed down).
    pub(crate) fn emit<'l, 't>(
        &self,
        groups: &[Option<Group<'t>>],
        state: &LexerState<'l, 't>,
        out: &mut Vec<Token<'t>>,
    ) -> Result<(), LexError> {
        match self {
            Emitter::Token(kind) => {
                if let Some(Some(whole)) = groups.first() {
                    out.push(whole.token(*kind));
                }
                Ok(())
            }
            Emitter::ByGroups(emitters) => {
                if emitters.len() != groups.len().saturating_sub(1) {
                    debug!(
                        "by-groups: {} emitters for {} groups at offset {}",
                        emitters.len(),
                        groups.len().saturating_sub(1),
                        state.pos
                    );
                    emit_error(groups, out);
                    return Ok(());
                }
                for (emitter, group) in emitters.iter().zip(&groups[1..]) {
                    if let Some(emitter) = emitter {
                        emitter.emit(slice::from_ref(group), state, out)?;
                    }
                }
                Ok(())
            }
            Emitter::ByGroupNames(emitters) => {
                if groups.len() <= 1 {
                    match emitters.get("0") {
                        Some(Some(emitter)) => emitter.emit(groups, state, out)?,
                        Some(None) => {}
                        None => emit_error(groups, out),
                    }
                    return Ok(());
                }
                for (i, group) in groups.iter().enumerate().skip(1) {
                    let name = state
                        .group_name(i)
                        .map(str::to_owned)
                        .unwrap_or_else(|| i.to_string());
                    match emitters.get(&name) {
                        Some(Some(emitter)) => emitter.emit(slice::from_ref(group), state, out)?,
                        Some(None) => {}
                        None => emit_error(slice::from_ref(group), out),
                    }
                }
                Ok(())
            }
            Emitter::Using(lexer) => match groups.first() {
                Some(Some(whole)) => {
                    let options = TokeniseOptions::nested_in(state, "root");
                    delegate(lexer.as_ref(), &options, *whole, out)
                }
                _ => Ok(()),
            },
            Emitter::UsingSelf(start) => match groups.first() {
                Some(Some(whole)) => {
                    let options = TokeniseOptions::nested_in(state, start);
                    delegate(state.lexer, &options, *whole, out)
                }
                _ => Ok(()),
            },
            Emitter::UsingByGroup(u) => u.emit(groups, state, out),
            Emitter::Func(f) => {
                out.extend((f.0)(groups, state));
                Ok(())
            }
        }
    }
}

impl UsingByGroup {
    fn emit<'l, 't>(
        &self,
        groups: &[Option<Group<'t>>],
        state: &LexerState<'l, 't>,
        out: &mut Vec<Token<'t>>,
    ) -> Result<(), LexError> {
        let n_groups = groups.len().saturating_sub(1);
        if self.emitters.len() != n_groups {
            return Err(LexError::UsingByGroupArity {
                state: state.current_state().to_owned(),
                pattern: state.current_pattern().unwrap_or_default().to_owned(),
                emitters: self.emitters.len(),
                groups: n_groups,
            });
        }

        let name = match groups.get(self.name_group) {
            Some(Some(g)) => g.text,
            Some(None) => "",
            None => {
                return Err(LexError::GroupOutOfRange {
                    index: self.name_group,
                    groups: n_groups,
                });
            }
        };
        let sublexer = self.resolver.resolve(name);
        if sublexer.is_none() {
            debug!("using-by-group: no lexer for {name:?}, using fallback emitters");
        }

        for (i, (emitter, group)) in self.emitters.iter().zip(&groups[1..]).enumerate() {
            match (&sublexer, group) {
                (Some(sub), Some(code)) if i + 1 == self.code_group => {
                    let options = TokeniseOptions::nested_in(state, "root");
                    delegate(sub.as_ref(), &options, *code, out)?;
                }
                _ => {
                    if let Some(emitter) = emitter {
                        emitter.emit(slice::from_ref(group), state, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn emit_error<'t>(groups: &[Option<Group<'t>>], out: &mut Vec<Token<'t>>) {
    if let Some(Some(whole)) = groups.first() {
        out.push(whole.token(TokenType::Error));
    }
}

/// Tokenise `group` with `lexer` and splice the result in, rebased onto the
/// group's offset.
fn delegate<'t, L: Lexer + ?Sized>(
    lexer: &L,
    options: &TokeniseOptions,
    group: Group<'t>,
    out: &mut Vec<Token<'t>>,
) -> Result<(), LexError> {
    let wrap = |e: LexError| LexError::Nested {
        lexer: lexer.config().name.clone(),
        source: Box::new(e),
    };
    for tok in lexer.tokenise(options, group.text).map_err(wrap)? {
        let mut tok = tok.map_err(wrap)?;
        tok.start += group.start;
        out.push(tok);
    }
    Ok(())
}

impl PartialEq for Emitter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Emitter::Token(a), Emitter::Token(b)) => a == b,
            (Emitter::ByGroups(a), Emitter::ByGroups(b)) => a == b,
            (Emitter::ByGroupNames(a), Emitter::ByGroupNames(b)) => a == b,
            (Emitter::Using(a), Emitter::Using(b)) => a.config().name == b.config().name,
            (Emitter::UsingSelf(a), Emitter::UsingSelf(b)) => a == b,
            (Emitter::UsingByGroup(a), Emitter::UsingByGroup(b)) => Arc::ptr_eq(a, b),
            (Emitter::Func(a), Emitter::Func(b)) => Arc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emitter::Token(t) => f.debug_tuple("Token").field(t).finish(),
            Emitter::ByGroups(list) => f.debug_tuple("ByGroups").field(list).finish(),
            Emitter::ByGroupNames(map) => f.debug_tuple("ByGroupNames").field(map).finish(),
            Emitter::Using(l) => f.debug_tuple("Using").field(&l.config().name).finish(),
            Emitter::UsingSelf(s) => f.debug_tuple("UsingSelf").field(s).finish(),
            Emitter::UsingByGroup(u) => f
                .debug_struct("UsingByGroup")
                .field("name_group", &u.name_group)
                .field("code_group", &u.code_group)
                .field("emitters", &u.emitters)
                .finish(),
            Emitter::Func(_) => f.write_str("Func(..)"),
        }
    }
}
