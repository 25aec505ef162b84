//! Looking lexers up by name, for delegation and for decoding `using` emitters.

use std::sync::{Arc, PoisonError, RwLock};

use hashbrown::HashMap;
use log::debug;

use crate::lexer::Lexer;

/// Resolves a lexer name (as captured from input or stored in a grammar
/// file) to a lexer.
pub trait LexerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Lexer>>;
}

impl<F> LexerResolver for F
where
    F: Fn(&str) -> Option<Arc<dyn Lexer>> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Arc<dyn Lexer>> {
        self(name)
    }
}

/// Lexers keyed by lower-cased name and aliases.
///
/// Registration takes `&self` so a registry can be shared (in an `Arc`) with
/// grammars built before every language is registered.
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    lexers: Vec<Arc<dyn Lexer>>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations win on name clashes.
    pub fn register(&self, lexer: Arc<dyn Lexer>) -> Arc<dyn Lexer> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = inner.lexers.len();
        let config = lexer.config();
        for key in std::iter::once(&config.name).chain(&config.aliases) {
            if inner.by_name.insert(key.to_lowercase(), id).is_some() {
                debug!("registry: {key:?} now refers to {:?}", config.name);
            }
        }
        inner.lexers.push(lexer.clone());
        lexer
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Lexer>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let id = *inner.by_name.get(&name.to_lowercase())?;
        inner.lexers.get(id).cloned()
    }

    /// Registered lexer names, sorted.
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = inner
            .lexers
            .iter()
            .map(|l| l.config().name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl LexerResolver for Registry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Lexer>> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LexerConfig,
        lexer::{
            RegexLexer,
            tables::{Rules, TokenType, rule},
        },
    };

    fn tiny(name: &str, aliases: &[&str]) -> Arc<dyn Lexer> {
        let rules = Rules::new().state("root", [rule(".", TokenType::Text, None)]);
        Arc::new(
            RegexLexer::new(LexerConfig::named(name).with_aliases(aliases.iter().copied()), rules)
                .unwrap(),
        )
    }

    #[test]
    fn lookup_by_name_and_alias_ignores_case() {
        let reg = Registry::new();
        reg.register(tiny("Python", &["py", "python3"]));
        assert_eq!(reg.get("python").unwrap().config().name, "Python");
        assert_eq!(reg.get("PY").unwrap().config().name, "Python");
        assert!(reg.get("ruby").is_none());
        assert_eq!(reg.names(), vec!["Python".to_string()]);
    }

    #[test]
    fn closures_resolve_too() {
        let only_x = |name: &str| -> Option<Arc<dyn Lexer>> {
            (name == "x").then(|| tiny("x", &[]))
        };
        assert!(only_x.resolve("x").is_some());
        assert!(only_x.resolve("y").is_none());
    }
}
