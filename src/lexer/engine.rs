// src/lexer/engine.rs
// State-stack driven match loop. One `TokenIter` per run; the grammar is only read.

use std::{collections::VecDeque, iter::FusedIterator};

use hashbrown::HashMap;
use log::{debug, trace};
use regex_automata::{Anchored, Input, PatternID, util::captures::Captures};

use crate::{
    error::LexError,
    lexer::{
        RegexLexer, Token, TokeniseOptions,
        emit::Group,
        mutate::StateId,
        tables::{TokenType, build::CompiledRule},
    },
};

/// Per-run context handed to emitters.
pub struct LexerState<'l, 't> {
    pub lexer: &'l RegexLexer,
    pub text: &'t str,
    /// Offset just past the current match.
    pub pos: usize,
    /// 0 for a top-level run, +1 per nested run.
    pub depth: usize,
    pub nested: bool,
    pub(crate) stack: Vec<StateId>,
    /// (state, rule index) of the rule that matched last.
    pub(crate) rule: Option<(StateId, usize)>,
    /// Groups of the current match; `groups[0]` is the whole match.
    pub groups: Vec<Option<Group<'t>>>,
    pub named_groups: HashMap<&'l str, Group<'t>>,
}

impl<'l, 't> LexerState<'l, 't> {
    /// State names from bottom to top.
    pub fn stack(&self) -> Vec<&'l str> {
        let lexer = self.lexer;
        self.stack.iter().map(|&id| lexer.state_name(id)).collect()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn current_state(&self) -> &'l str {
        let lexer = self.lexer;
        self.stack
            .last()
            .map(|&id| lexer.state_name(id))
            .unwrap_or_default()
    }

    /// Index of the last matched rule within its (expanded) state.
    pub fn current_rule_index(&self) -> Option<usize> {
        self.rule.map(|(_, i)| i)
    }

    pub(crate) fn current_rule(&self) -> Option<&'l CompiledRule> {
        let lexer = self.lexer;
        let (state, index) = self.rule?;
        lexer.table.states.get(state)?.rules.get(index)
    }

    pub fn current_pattern(&self) -> Option<&'l str> {
        self.current_rule()?.pattern.as_deref()
    }

    /// Name of group `index` in the pattern that matched last.
    pub fn group_name(&self, index: usize) -> Option<&'l str> {
        self.current_rule()?.group_name(index)
    }

    pub fn named_group(&self, name: &str) -> Option<Group<'t>> {
        self.named_groups.get(name).copied()
    }
}

/// Lazy token stream of one run. Stopping iteration is cancellation.
pub struct TokenIter<'l, 't> {
    state: LexerState<'l, 't>,
    start_state: StateId,
    queue: VecDeque<Token<'t>>,
    captures: Vec<Option<Captures>>,
    zero_width_steps: usize,
    done: bool,
}

impl<'l, 't> TokenIter<'l, 't> {
    pub(crate) fn new(
        lexer: &'l RegexLexer,
        options: &TokeniseOptions,
        text: &'t str,
    ) -> Result<Self, LexError> {
        let limit = lexer.limits().max_nesting_depth;
        if options.depth > limit {
            return Err(LexError::NestingTooDeep { limit });
        }
        let start_state = lexer
            .table
            .id(&options.state)
            .ok_or_else(|| LexError::UnknownState(options.state.clone()))?;
        if options.nested {
            trace!(
                "nested run of {:?} at depth {} from {:?}",
                lexer.config().name,
                options.depth,
                options.state
            );
        }
        Ok(Self {
            state: LexerState {
                lexer,
                text,
                pos: 0,
                depth: options.depth,
                nested: options.nested,
                stack: vec![start_state],
                rule: None,
                groups: Vec::new(),
                named_groups: HashMap::new(),
            },
            start_state,
            queue: VecDeque::new(),
            captures: std::iter::repeat_with(|| None)
                .take(lexer.table.slots)
                .collect(),
            zero_width_steps: 0,
            done: false,
        })
    }

    pub fn state(&self) -> &LexerState<'l, 't> {
        &self.state
    }

    fn step(&mut self) -> Result<(), LexError> {
        let lexer = self.state.lexer;
        let text = self.state.text;
        let pos = self.state.pos;
        if pos >= text.len() {
            self.done = true;
            return Ok(());
        }

        let top = self.state.stack.last().copied().unwrap_or(self.start_state);
        let rules = &lexer.table.states[top].rules;
        let Some((index, end)) = self.first_match(rules, pos) else {
            self.recover(top, pos);
            return Ok(());
        };
        let rule = &rules[index];
        trace!(
            "[{}] {:?} rule #{index} matched {pos}..{end}",
            lexer.state_name(top),
            rule.pattern
        );

        if end == pos {
            if rule.op.is_none() {
                return Err(LexError::ZeroWidthMatch {
                    state: lexer.state_name(top).to_owned(),
                    rule: index,
                    pos,
                });
            }
            self.zero_width_steps += 1;
            let limit = lexer.limits().max_zero_width_steps;
            if self.zero_width_steps > limit {
                return Err(LexError::NoProgress { pos, steps: limit });
            }
        } else {
            self.zero_width_steps = 0;
        }

        self.state.rule = Some((top, index));
        fill_groups(
            rule,
            self.captures[rule.slot].as_ref(),
            text,
            pos,
            &mut self.state.groups,
            &mut self.state.named_groups,
        );
        self.state.pos = end;

        if let Some(emitter) = &rule.emitter {
            let mut out = Vec::new();
            emitter.emit(&self.state.groups, &self.state, &mut out)?;
            self.queue
                .extend(out.into_iter().filter(|t| !t.text.is_empty()));
        }
        if let Some(op) = &rule.op {
            op.apply(&mut self.state.stack, lexer.limits().max_stack_depth, end)?;
        }
        Ok(())
    }

    /// First rule, in declaration order, matching at `pos`: (index, match end).
    fn first_match(&mut self, rules: &[CompiledRule], pos: usize) -> Option<(usize, usize)> {
        let input = Input::new(self.state.text)
            .range(pos..)
            .anchored(Anchored::Yes);
        for (index, rule) in rules.iter().enumerate() {
            let Some(re) = &rule.regex else {
                return Some((index, pos));
            };
            let caps = self.captures[rule.slot].get_or_insert_with(|| re.create_captures());
            re.search_captures(&input, caps);
            if let Some(m) = caps.get_match() {
                return Some((index, m.end()));
            }
        }
        None
    }

    /// Nothing matched at `pos`.
    fn recover(&mut self, top: StateId, pos: usize) {
        let rest = &self.state.text[pos..];
        if rest.starts_with('\n') && top != self.start_state {
            debug!(
                "no rule in {:?} matched a newline at {pos}; resetting the stack",
                self.state.lexer.state_name(top)
            );
            self.state.stack.clear();
            self.state.stack.push(self.start_state);
            return;
        }
        let len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
        self.queue.push_back(Token {
            kind: TokenType::Error,
            start: pos,
            text: &rest[..len],
        });
        self.state.pos = pos + len;
        self.zero_width_steps = 0;
    }
}

fn fill_groups<'l, 't>(
    rule: &'l CompiledRule,
    caps: Option<&Captures>,
    text: &'t str,
    pos: usize,
    groups: &mut Vec<Option<Group<'t>>>,
    named: &mut HashMap<&'l str, Group<'t>>,
) {
    groups.clear();
    named.clear();
    let (Some(re), Some(caps)) = (&rule.regex, caps) else {
        groups.push(Some(Group { text: "", start: pos }));
        return;
    };
    let info = re.group_info();
    for i in 0..caps.group_len() {
        let group = caps.get_group(i).map(|sp| Group {
            text: &text[sp.start..sp.end],
            start: sp.start,
        });
        if let (Some(g), Some(name)) = (group, info.to_name(PatternID::ZERO, i)) {
            named.insert(name, g);
        }
        groups.push(group);
    }
}

impl<'l, 't> Iterator for TokenIter<'l, 't> {
    type Item = Result<Token<'t>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tok) = self.queue.pop_front() {
                return Some(Ok(tok));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.step() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

impl FusedIterator for TokenIter<'_, '_> {}

#[cfg(test)]
mod tests {
    use crate::{
        config::LexerConfig,
        error::LexError,
        lexer::{
            RegexLexer, TokeniseOptions,
            tables::{Rules, TokenType, default, pop, push, rule},
        },
    };

    fn lexer(rules: Rules) -> RegexLexer {
        RegexLexer::new(LexerConfig::named("test"), rules).unwrap()
    }

    #[test]
    fn first_declared_rule_wins_over_longer_match() {
        let lx = lexer(Rules::new().state(
            "root",
            [
                rule("if", TokenType::Keyword, None),
                rule("[a-z]+", TokenType::Name, None),
            ],
        ));
        let toks = lx.tokenise_all("iffy").unwrap();
        assert_eq!(toks[0].kind, TokenType::Keyword);
        assert_eq!(toks[0].text, "if");
        assert_eq!(toks[1].kind, TokenType::Name);
        assert_eq!(toks[1].text, "fy");
    }

    #[test]
    fn unmatched_multibyte_char_is_one_error_token() {
        let lx = lexer(Rules::new().state("root", [rule("a", TokenType::Text, None)]));
        let toks = lx.tokenise_all("aéa").unwrap();
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[1].kind, TokenType::Error);
        assert_eq!(toks[1].text, "é");
        assert_eq!(toks[2].start, 3);
    }

    #[test]
    fn zero_width_without_mutator_fails_fast() {
        let lx = lexer(Rules::new().state("root", [rule("x*", TokenType::Text, None)]));
        let err = lx.tokenise_all("y").unwrap_err();
        assert!(matches!(err, LexError::ZeroWidthMatch { pos: 0, rule: 0, .. }));
    }

    #[test]
    fn zero_width_ping_pong_is_cut_off() {
        let lx = lexer(
            Rules::new()
                .state("root", [default(push(["a"]))])
                .state("a", [default(pop(1))]),
        );
        let err = lx.tokenise_all("q").unwrap_err();
        assert!(matches!(err, LexError::NoProgress { pos: 0, .. }));
    }

    #[test]
    fn newline_resets_to_start_state() {
        let lx = lexer(
            Rules::new()
                .state(
                    "root",
                    [
                        rule("#", TokenType::Comment, Some(push(["comment"]))),
                        rule("\\s+", TokenType::Whitespace, None),
                        rule("\\w+", TokenType::Name, None),
                    ],
                )
                .state("comment", [rule("[^\\n]+", TokenType::Comment, None)]),
        );
        let mut it = lx.tokenise_iter(&TokeniseOptions::default(), "#hi\nx").unwrap();
        let toks: Vec<_> = it.by_ref().map(Result::unwrap).collect();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::Comment,
                TokenType::Comment,
                TokenType::Whitespace,
                TokenType::Name
            ]
        );
        assert_eq!(it.state().stack(), vec!["root"]);
    }

    #[test]
    fn line_anchors_see_surrounding_text() {
        let lx = lexer(Rules::new().state(
            "root",
            [
                rule("^#.*", TokenType::CommentPreproc, None),
                rule("\\s+", TokenType::Whitespace, None),
                rule("[^\\s]+", TokenType::Text, None),
            ],
        ));
        let toks = lx.tokenise_all("a #b\n#c").unwrap();
        let pre: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenType::CommentPreproc)
            .map(|t| t.text)
            .collect();
        assert_eq!(pre, vec!["#c"]);
    }

    #[test]
    fn unknown_start_state_is_an_error() {
        let lx = lexer(Rules::new().state("root", [rule("a", TokenType::Text, None)]));
        let err = lx
            .tokenise_iter(&TokeniseOptions::start_in("nope"), "a")
            .err()
            .unwrap();
        assert!(matches!(err, LexError::UnknownState(s) if s == "nope"));
    }
}
