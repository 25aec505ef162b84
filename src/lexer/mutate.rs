//! State-stack transitions.

use log::debug;

use crate::error::LexError;

/// Index of a compiled state.
pub type StateId = usize;

/// How a match changes the state stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutator {
    /// Push states in order; the last becomes the top. Empty pushes the current state.
    Push(Vec<String>),
    /// Pop states, never below one remaining entry.
    Pop(usize),
    /// Resolved when the grammar is compiled: the named state's rules are
    /// spliced in where the include rule stands.
    Include(String),
    /// Push a synthetic state whose rules are the named states' rules, concatenated.
    Combined(Vec<String>),
    /// Apply mutators in sequence.
    Multi(Vec<Mutator>),
}

/// Element names of the mutators; `mutators` is the multi form.
pub const MUTATOR_KINDS: &[&str] = &["push", "pop", "include", "combined", "mutators"];

impl Mutator {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutator::Push(_) => "push",
            Mutator::Pop(_) => "pop",
            Mutator::Include(_) => "include",
            Mutator::Combined(_) => "combined",
            Mutator::Multi(_) => "mutators",
        }
    }

    /// Every state name this mutator refers to.
    pub fn referenced_states(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_states(&mut out);
        out
    }

    fn collect_states<'m>(&'m self, out: &mut Vec<&'m str>) {
        match self {
            Mutator::Push(names) | Mutator::Combined(names) => {
                out.extend(names.iter().map(String::as_str))
            }
            Mutator::Include(name) => out.push(name),
            Mutator::Pop(_) => {}
            Mutator::Multi(list) => list.iter().for_each(|m| m.collect_states(out)),
        }
    }
}

/// A mutator with state names resolved to ids. Include is gone by now and
/// combined has become a push of its synthetic state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StackOp {
    Push(Vec<StateId>),
    Pop(usize),
    Multi(Vec<StackOp>),
}

impl StackOp {
    pub(crate) fn apply(
        &self,
        stack: &mut Vec<StateId>,
        max_depth: usize,
        pos: usize,
    ) -> Result<(), LexError> {
        match self {
            StackOp::Push(ids) if ids.is_empty() => {
                if let Some(&top) = stack.last() {
                    stack.push(top);
                }
            }
            StackOp::Push(ids) => stack.extend_from_slice(ids),
            StackOp::Pop(n) => {
                let keep = stack.len().saturating_sub(*n).max(1);
                if *n >= stack.len() {
                    debug!(
                        "pop({n}) at offset {pos} clamped: stack depth {}",
                        stack.len()
                    );
                }
                stack.truncate(keep);
            }
            StackOp::Multi(ops) => {
                for op in ops {
                    op.apply(stack, max_depth, pos)?;
                }
            }
        }
        if stack.len() > max_depth {
            return Err(LexError::StackOverflow {
                pos,
                limit: max_depth,
            });
        }
        Ok(())
    }
}
