// src/lexer/tables/build.rs
use hashbrown::HashMap;
use log::debug;
use regex_automata::{
    PatternID,
    meta::{self, Regex},
    util::syntax,
};
use std::time::Instant;

use super::{Rule, Rules};
use crate::{
    config::LexerConfig,
    error::LexError,
    lexer::{
        emit::Emitter,
        mutate::{Mutator, StackOp, StateId},
    },
};

pub(crate) struct CompiledRule {
    pub pattern: Option<String>,
    pub regex: Option<Regex>,
    pub emitter: Option<Emitter>,
    pub op: Option<StackOp>,
    /// Per-run capture buffer index.
    pub slot: usize,
}

impl CompiledRule {
    /// Name of capture group `index`, if it has one.
    pub fn group_name(&self, index: usize) -> Option<&str> {
        self.regex
            .as_ref()?
            .group_info()
            .to_name(PatternID::ZERO, index)
    }

    /// Number of groups, the implicit whole-match group included.
    pub fn group_len(&self) -> usize {
        self.regex
            .as_ref()
            .map(|re| re.group_info().group_len(PatternID::ZERO))
            .unwrap_or(1)
    }
}

pub(crate) struct CompiledState {
    pub name: String,
    pub rules: Vec<CompiledRule>,
}

/// States with includes expanded, combined states synthesised and patterns
/// compiled. Immutable once built.
pub(crate) struct CompiledTable {
    pub states: Vec<CompiledState>,
    pub index: HashMap<String, StateId>,
    pub slots: usize,
}

impl CompiledTable {
    pub fn id(&self, name: &str) -> Option<StateId> {
        self.index.get(name).copied()
    }
}

/// Display name of the synthetic state standing for `combined(names)`.
/// Only used for logs and `state_names`; lookups go by the name list.
pub fn combined_state_name(names: &[String]) -> String {
    format!("__combined_{}", names.join("__"))
}

pub(crate) fn compile(config: &LexerConfig, rules: &Rules) -> Result<CompiledTable, LexError> {
    let t0 = Instant::now();
    validate(rules)?;

    let mut expanded: HashMap<&str, Vec<&Rule>> = HashMap::new();
    for (name, _) in rules.iter() {
        expand(rules, name, &mut Vec::new(), &mut expanded)?;
    }

    let mut names: Vec<String> = Vec::with_capacity(rules.len());
    let mut bodies: Vec<Vec<&Rule>> = Vec::with_capacity(rules.len());
    let mut index: HashMap<String, StateId> = HashMap::new();
    for (name, _) in rules.iter() {
        index.insert(name.to_owned(), names.len());
        names.push(name.to_owned());
        bodies.push(expanded.get(name).cloned().unwrap_or_default());
    }

    // Synthesise combined states until no new combination shows up; a
    // combined state may itself contain combined mutators. Keyed by the
    // name list so neither `a__b` nor an authored `__combined_a__b` can
    // alias `combined(a, b)`.
    let mut combined: HashMap<&[String], StateId> = HashMap::new();
    let mut i = 0;
    while i < bodies.len() {
        let mut combos = Vec::new();
        for &rule in &bodies[i] {
            if let Some(m) = &rule.mutator {
                collect_combined(m, &mut combos);
            }
        }
        for combo in combos {
            if combined.contains_key(combo) {
                continue;
            }
            let cname = combined_state_name(combo);
            let body: Vec<&Rule> = combo
                .iter()
                .flat_map(|n| expanded.get(n.as_str()).into_iter().flatten().copied())
                .collect();
            debug!("[rules] combined state {cname} with {} rules", body.len());
            combined.insert(combo, names.len());
            names.push(cname);
            bodies.push(body);
        }
        i += 1;
    }

    let builder = regex_builder(config);
    let mut cache: HashMap<&str, Regex> = HashMap::new();
    let mut slots = 0usize;
    let mut states = Vec::with_capacity(names.len());
    for (name, body) in names.into_iter().zip(bodies) {
        let mut compiled = Vec::with_capacity(body.len());
        for rule in body {
            let regex = match rule.pattern.as_deref() {
                None => None,
                Some(pattern) => Some(match cache.get(pattern) {
                    Some(re) => re.clone(),
                    None => {
                        let re = builder.build(pattern).map_err(|e| LexError::Pattern {
                            state: name.clone(),
                            pattern: pattern.to_owned(),
                            message: e.to_string(),
                        })?;
                        cache.insert(pattern, re.clone());
                        re
                    }
                }),
            };
            let op = rule
                .mutator
                .as_ref()
                .map(|m| compile_mutator(m, &index, &combined, &name))
                .transpose()?;
            let compiled_rule = CompiledRule {
                pattern: rule.pattern.clone(),
                regex,
                emitter: rule.emitter.clone(),
                op,
                slot: slots,
            };
            check_using_by_group(&compiled_rule, &name, compiled.len())?;
            compiled.push(compiled_rule);
            slots += 1;
        }
        states.push(CompiledState {
            name,
            rules: compiled,
        });
    }

    debug!(
        "[rules] {:?}: {} states ({} authored), {} rules, {} patterns in {:?}",
        config.name,
        states.len(),
        rules.len(),
        slots,
        cache.len(),
        t0.elapsed()
    );
    Ok(CompiledTable {
        states,
        index,
        slots,
    })
}

fn regex_builder(config: &LexerConfig) -> meta::Builder {
    let mut builder = Regex::builder();
    builder.syntax(
        syntax::Config::new()
            .multi_line(!config.not_multiline)
            .case_insensitive(config.case_insensitive)
            .dot_matches_new_line(config.dot_all),
    );
    builder
}

/// Rule shape and dangling state references.
fn validate(rules: &Rules) -> Result<(), LexError> {
    for (state, list) in rules.iter() {
        for (index, rule) in list.iter().enumerate() {
            let invalid = |reason: &str| LexError::InvalidRule {
                state: state.to_owned(),
                index,
                reason: reason.to_owned(),
            };
            match &rule.mutator {
                None if rule.pattern.is_none() => {
                    return Err(invalid("rule has neither a pattern nor a mutator"));
                }
                Some(Mutator::Include(_)) if rule.pattern.is_some() || rule.emitter.is_some() => {
                    return Err(invalid("include carries no pattern or emitter"));
                }
                Some(Mutator::Multi(list)) if contains_include(list) => {
                    return Err(invalid("include cannot be combined with other mutators"));
                }
                _ => {}
            }

            let mut refs: Vec<&str> = rule
                .mutator
                .as_ref()
                .map(Mutator::referenced_states)
                .unwrap_or_default();
            if let Some(emitter) = &rule.emitter {
                collect_self_states(emitter, &mut refs);
            }
            if let Some(missing) = refs.into_iter().find(|n| !rules.contains(n)) {
                return Err(LexError::DanglingState {
                    from: state.to_owned(),
                    name: missing.to_owned(),
                });
            }
        }
    }
    Ok(())
}

fn contains_include(list: &[Mutator]) -> bool {
    list.iter().any(|m| match m {
        Mutator::Include(_) => true,
        Mutator::Multi(inner) => contains_include(inner),
        _ => false,
    })
}

fn collect_self_states<'e>(emitter: &'e Emitter, out: &mut Vec<&'e str>) {
    match emitter {
        Emitter::UsingSelf(state) => out.push(state),
        Emitter::ByGroups(list) => list.iter().flatten().for_each(|e| collect_self_states(e, out)),
        Emitter::ByGroupNames(map) => map
            .values()
            .flatten()
            .for_each(|e| collect_self_states(e, out)),
        Emitter::UsingByGroup(u) => u
            .emitters
            .iter()
            .flatten()
            .for_each(|e| collect_self_states(e, out)),
        Emitter::Token(_) | Emitter::Using(_) | Emitter::Func(_) => {}
    }
}

/// Resolve `name`'s rule list with includes spliced in, memoised in `memo`.
fn expand<'r>(
    rules: &'r Rules,
    name: &'r str,
    visiting: &mut Vec<&'r str>,
    memo: &mut HashMap<&'r str, Vec<&'r Rule>>,
) -> Result<(), LexError> {
    if memo.contains_key(name) {
        return Ok(());
    }
    if let Some(at) = visiting.iter().position(|n| *n == name) {
        let mut chain: Vec<String> = visiting[at..].iter().map(|s| s.to_string()).collect();
        chain.push(name.to_owned());
        return Err(LexError::CyclicInclude { chain });
    }
    let list = rules.get(name).ok_or_else(|| LexError::DanglingState {
        from: visiting.last().copied().unwrap_or(name).to_owned(),
        name: name.to_owned(),
    })?;

    visiting.push(name);
    let mut out = Vec::with_capacity(list.len());
    for rule in list {
        match &rule.mutator {
            Some(Mutator::Include(target)) => {
                expand(rules, target, visiting, memo)?;
                out.extend(memo.get(target.as_str()).into_iter().flatten().copied());
            }
            _ => out.push(rule),
        }
    }
    visiting.pop();
    memo.insert(name, out);
    Ok(())
}

fn collect_combined<'m>(m: &'m Mutator, out: &mut Vec<&'m [String]>) {
    match m {
        Mutator::Combined(names) => out.push(names),
        Mutator::Multi(list) => list.iter().for_each(|m| collect_combined(m, out)),
        _ => {}
    }
}

fn compile_mutator(
    m: &Mutator,
    index: &HashMap<String, StateId>,
    combined: &HashMap<&[String], StateId>,
    state: &str,
) -> Result<StackOp, LexError> {
    let id = |name: &str| {
        index
            .get(name)
            .copied()
            .ok_or_else(|| LexError::DanglingState {
                from: state.to_owned(),
                name: name.to_owned(),
            })
    };
    Ok(match m {
        Mutator::Push(names) => StackOp::Push(
            names
                .iter()
                .map(|n| id(n.as_str()))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Mutator::Pop(n) => StackOp::Pop(*n),
        Mutator::Combined(names) => StackOp::Push(vec![
            combined
                .get(names.as_slice())
                .copied()
                .ok_or_else(|| LexError::DanglingState {
                    from: state.to_owned(),
                    name: combined_state_name(names),
                })?,
        ]),
        Mutator::Multi(list) => StackOp::Multi(
            list.iter()
                .map(|m| compile_mutator(m, index, combined, state))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Mutator::Include(_) => {
            return Err(LexError::InvalidRule {
                state: state.to_owned(),
                index: 0,
                reason: "include survived expansion".to_owned(),
            });
        }
    })
}

/// Using-by-group arity is a hard precondition, checked before any run.
/// Nested under by-groups it would only ever see one group, so it is only
/// allowed at the top of a rule.
fn check_using_by_group(rule: &CompiledRule, state: &str, index: usize) -> Result<(), LexError> {
    let Some(emitter) = &rule.emitter else {
        return Ok(());
    };
    let nested = match emitter {
        Emitter::ByGroups(list) => list.iter().flatten().any(has_using_by_group),
        Emitter::ByGroupNames(map) => map.values().flatten().any(has_using_by_group),
        Emitter::UsingByGroup(u) => u.emitters.iter().flatten().any(has_using_by_group),
        _ => false,
    };
    if nested {
        return Err(LexError::InvalidRule {
            state: state.to_owned(),
            index,
            reason: "using-by-group must be the rule's own emitter".to_owned(),
        });
    }
    let Emitter::UsingByGroup(u) = emitter else {
        return Ok(());
    };
    let groups = rule.group_len() - 1;
    let pattern = || rule.pattern.clone().unwrap_or_default();
    if u.emitters.len() != groups {
        return Err(LexError::UsingByGroupArity {
            state: state.to_owned(),
            pattern: pattern(),
            emitters: u.emitters.len(),
            groups,
        });
    }
    for index in [u.name_group, u.code_group] {
        if index == 0 || index > groups {
            return Err(LexError::GroupOutOfRange { index, groups });
        }
    }
    Ok(())
}

fn has_using_by_group(emitter: &Emitter) -> bool {
    match emitter {
        Emitter::UsingByGroup(_) => true,
        Emitter::ByGroups(list) => list.iter().flatten().any(has_using_by_group),
        Emitter::ByGroupNames(map) => map.values().flatten().any(has_using_by_group),
        Emitter::Token(_) | Emitter::Using(_) | Emitter::UsingSelf(_) | Emitter::Func(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lexer::tables::{TokenType, by_groups, combined, include, pop, push, rule, using_by_group},
        registry::Registry,
    };
    use std::sync::Arc;

    fn compile_default(rules: &Rules) -> Result<CompiledTable, LexError> {
        compile(&LexerConfig::named("test"), rules)
    }

    #[test]
    fn include_is_spliced_in_place() {
        let rules = Rules::new()
            .state(
                "root",
                [
                    rule("a", TokenType::Keyword, None),
                    include("common"),
                    rule("z", TokenType::Keyword, None),
                ],
            )
            .state(
                "common",
                [
                    rule("b", TokenType::Name, None),
                    rule("c", TokenType::Name, None),
                ],
            );
        let table = compile_default(&rules).unwrap();
        let root = &table.states[table.id("root").unwrap()];
        let patterns: Vec<_> = root.rules.iter().map(|r| r.pattern.as_deref()).collect();
        assert_eq!(patterns, vec![Some("a"), Some("b"), Some("c"), Some("z")]);
    }

    #[test]
    fn cyclic_include_is_rejected() {
        let rules = Rules::new()
            .state("root", [include("a")])
            .state("a", [include("b")])
            .state("b", [include("a")]);
        match compile_default(&rules) {
            Err(LexError::CyclicInclude { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected cyclic include, got {:?}", other.err()),
        }
    }

    #[test]
    fn dangling_push_is_rejected() {
        let rules = Rules::new().state("root", [rule("x", TokenType::Text, Some(push(["nope"])))]);
        assert!(matches!(
            compile_default(&rules),
            Err(LexError::DanglingState { from, name }) if from == "root" && name == "nope"
        ));
    }

    #[test]
    fn combined_state_is_synthesised() {
        let rules = Rules::new()
            .state("root", [rule("\\(", TokenType::Punctuation, Some(combined(["a", "b"])))])
            .state("a", [rule("1", TokenType::Number, None)])
            .state("b", [rule("\\)", TokenType::Punctuation, Some(pop(1)))]);
        let table = compile_default(&rules).unwrap();
        let id = pushed(&table, "root", 0);
        assert_eq!(table.states[id].name, "__combined_a__b");
        assert!(table.id("__combined_a__b").is_none());
        assert_eq!(table.states[id].rules.len(), 2);
        assert_eq!(table.slots, 5);
    }

    fn pushed(table: &CompiledTable, state: &str, rule: usize) -> StateId {
        match &table.states[table.id(state).unwrap()].rules[rule].op {
            Some(StackOp::Push(ids)) => ids[0],
            other => panic!("expected a single push, got {other:?}"),
        }
    }

    fn patterns(table: &CompiledTable, id: StateId) -> Vec<&str> {
        table.states[id]
            .rules
            .iter()
            .filter_map(|r| r.pattern.as_deref())
            .collect()
    }

    #[test]
    fn combined_states_do_not_alias_on_joined_names() {
        let rules = Rules::new()
            .state(
                "root",
                [
                    rule("1", TokenType::Punctuation, Some(combined(["a__b"]))),
                    rule("2", TokenType::Punctuation, Some(combined(["a", "b"]))),
                ],
            )
            .state("a__b", [rule("x", TokenType::Keyword, None)])
            .state("a", [rule("y", TokenType::Name, None)])
            .state("b", [rule("z", TokenType::Number, None)]);
        let table = compile_default(&rules).unwrap();
        let joined = pushed(&table, "root", 0);
        let pair = pushed(&table, "root", 1);
        assert_ne!(joined, pair);
        assert_eq!(patterns(&table, joined), vec!["x"]);
        assert_eq!(patterns(&table, pair), vec!["y", "z"]);
    }

    #[test]
    fn authored_state_does_not_shadow_combined() {
        let rules = Rules::new()
            .state(
                "root",
                [
                    rule("1", TokenType::Punctuation, Some(push(["__combined_a__b"]))),
                    rule("2", TokenType::Punctuation, Some(combined(["a", "b"]))),
                ],
            )
            .state("__combined_a__b", [rule("w", TokenType::Keyword, None)])
            .state("a", [rule("y", TokenType::Name, None)])
            .state("b", [rule("z", TokenType::Number, None)]);
        let table = compile_default(&rules).unwrap();
        let authored = pushed(&table, "root", 0);
        assert_eq!(authored, table.id("__combined_a__b").unwrap());
        assert_eq!(patterns(&table, authored), vec!["w"]);
        assert_eq!(patterns(&table, pushed(&table, "root", 1)), vec!["y", "z"]);
    }

    #[test]
    fn using_by_group_inside_by_groups_is_invalid() {
        let inner = using_by_group(
            Arc::new(Registry::new()),
            1,
            2,
            [TokenType::Keyword, TokenType::Text],
        );
        let rules = Rules::new().state(
            "root",
            [
                rule("x", TokenType::Text, None),
                rule(
                    r"(\w+):(.*)",
                    by_groups([Some(TokenType::Keyword.into()), Some(inner)]),
                    None,
                ),
            ],
        );
        assert!(matches!(
            compile_default(&rules),
            Err(LexError::InvalidRule { state, index: 1, .. }) if state == "root"
        ));
    }

    #[test]
    fn rule_without_pattern_or_mutator_is_invalid() {
        let rules = Rules::new().state(
            "root",
            [Rule {
                pattern: None,
                emitter: Some(TokenType::Text.into()),
                mutator: None,
            }],
        );
        assert!(matches!(
            compile_default(&rules),
            Err(LexError::InvalidRule { index: 0, .. })
        ));
    }

    #[test]
    fn bad_pattern_reports_state() {
        let rules = Rules::new().state("root", [rule("(", TokenType::Text, None)]);
        assert!(matches!(
            compile_default(&rules),
            Err(LexError::Pattern { state, .. }) if state == "root"
        ));
    }
}
