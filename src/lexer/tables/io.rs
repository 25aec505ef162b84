use std::{
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use super::{Rule, Rules, tokens::TokenType};
use crate::{
    config::LexerConfig,
    error::SerialiseError,
    lexer::{emit::Emitter, mutate::Mutator},
    registry::LexerResolver,
};

// -------------------- JSON (de)serialization --------------------

#[derive(Serialize, Deserialize)]
struct LexerDisk {
    #[serde(default)]
    config: LexerConfig,
    rules: IndexMap<String, Vec<RuleDisk>>,
}

#[derive(Serialize, Deserialize)]
struct RuleDisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emitter: Option<EmitterDisk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mutator: Option<MutatorDisk>,
}

#[serde_as]
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum EmitterDisk {
    Token {
        #[serde(rename = "type")]
        #[serde_as(as = "DisplayFromStr")]
        token: TokenType,
    },
    ByGroups {
        emitters: Vec<Option<EmitterDisk>>,
    },
    ByGroupNames {
        emitters: IndexMap<String, Option<EmitterDisk>>,
    },
    Using {
        lexer: String,
    },
    UsingSelf {
        state: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum MutatorDisk {
    Push {
        #[serde(default)]
        states: Vec<String>,
    },
    Pop {
        depth: usize,
    },
    Include {
        state: String,
    },
    Combined {
        states: Vec<String>,
    },
    Mutators {
        mutators: Vec<MutatorDisk>,
    },
}

impl EmitterDisk {
    fn from_emitter(e: &Emitter) -> Option<Self> {
        Some(match e {
            Emitter::Token(t) => Self::Token { token: *t },
            Emitter::ByGroups(list) => Self::ByGroups {
                emitters: list
                    .iter()
                    .map(|e| Self::from_slot(e.as_ref()))
                    .collect::<Option<_>>()?,
            },
            Emitter::ByGroupNames(map) => Self::ByGroupNames {
                emitters: map
                    .iter()
                    .map(|(k, e)| Some((k.clone(), Self::from_slot(e.as_ref())?)))
                    .collect::<Option<_>>()?,
            },
            Emitter::Using(lexer) => Self::Using {
                lexer: lexer.config().name.clone(),
            },
            Emitter::UsingSelf(state) => Self::UsingSelf {
                state: state.clone(),
            },
            Emitter::UsingByGroup(_) | Emitter::Func(_) => return None,
        })
    }

    /// `Some(None)` for a skipped group, `None` when unserialisable.
    fn from_slot(e: Option<&Emitter>) -> Option<Option<Self>> {
        match e {
            None => Some(None),
            Some(e) => Self::from_emitter(e).map(Some),
        }
    }

    fn into_emitter(self, resolver: &dyn LexerResolver) -> Result<Emitter, SerialiseError> {
        Ok(match self {
            Self::Token { token } => Emitter::Token(token),
            Self::ByGroups { emitters } => Emitter::ByGroups(
                emitters
                    .into_iter()
                    .map(|e| e.map(|e| e.into_emitter(resolver)).transpose())
                    .collect::<Result<_, _>>()?,
            ),
            Self::ByGroupNames { emitters } => Emitter::ByGroupNames(
                emitters
                    .into_iter()
                    .map(|(k, e)| Ok((k, e.map(|e| e.into_emitter(resolver)).transpose()?)))
                    .collect::<Result<_, SerialiseError>>()?,
            ),
            Self::Using { lexer } => Emitter::Using(
                resolver
                    .resolve(&lexer)
                    .ok_or(SerialiseError::UnknownLexer(lexer))?,
            ),
            Self::UsingSelf { state } => Emitter::UsingSelf(state),
        })
    }
}

impl From<&Mutator> for MutatorDisk {
    fn from(m: &Mutator) -> Self {
        match m {
            Mutator::Push(states) => Self::Push {
                states: states.clone(),
            },
            Mutator::Pop(depth) => Self::Pop { depth: *depth },
            Mutator::Include(state) => Self::Include {
                state: state.clone(),
            },
            Mutator::Combined(states) => Self::Combined {
                states: states.clone(),
            },
            Mutator::Multi(list) => Self::Mutators {
                mutators: list.iter().map(Self::from).collect(),
            },
        }
    }
}

impl From<MutatorDisk> for Mutator {
    fn from(m: MutatorDisk) -> Self {
        match m {
            MutatorDisk::Push { states } => Mutator::Push(states),
            MutatorDisk::Pop { depth } => Mutator::Pop(depth),
            MutatorDisk::Include { state } => Mutator::Include(state),
            MutatorDisk::Combined { states } => Mutator::Combined(states),
            MutatorDisk::Mutators { mutators } => {
                Mutator::Multi(mutators.into_iter().map(Mutator::from).collect())
            }
        }
    }
}

impl LexerDisk {
    fn new(config: &LexerConfig, rules: &Rules) -> Result<Self, SerialiseError> {
        let mut states = IndexMap::with_capacity(rules.len());
        for (state, list) in rules.iter() {
            let mut out = Vec::with_capacity(list.len());
            for (index, rule) in list.iter().enumerate() {
                let emitter = match &rule.emitter {
                    None => None,
                    Some(e) => Some(EmitterDisk::from_emitter(e).ok_or_else(|| {
                        SerialiseError::NotSerialisable {
                            state: state.to_owned(),
                            index,
                            kind: e.unserialisable_kind().unwrap_or(e.kind()),
                        }
                    })?),
                };
                out.push(RuleDisk {
                    pattern: rule.pattern.clone(),
                    emitter,
                    mutator: rule.mutator.as_ref().map(MutatorDisk::from),
                });
            }
            states.insert(state.to_owned(), out);
        }
        Ok(Self {
            config: config.clone(),
            rules: states,
        })
    }

    fn into_parts(
        self,
        resolver: &dyn LexerResolver,
    ) -> Result<(LexerConfig, Rules), SerialiseError> {
        let mut rules = Rules::new();
        for (state, list) in self.rules {
            let decoded = list
                .into_iter()
                .map(|r| {
                    Ok(Rule {
                        pattern: r.pattern,
                        emitter: r.emitter.map(|e| e.into_emitter(resolver)).transpose()?,
                        mutator: r.mutator.map(Mutator::from),
                    })
                })
                .collect::<Result<Vec<_>, SerialiseError>>()?;
            rules.insert(state, decoded);
        }
        Ok((self.config, rules))
    }
}

pub fn rules_to_json(config: &LexerConfig, rules: &Rules) -> Result<String, SerialiseError> {
    Ok(serde_json::to_string_pretty(&LexerDisk::new(config, rules)?)?)
}

pub fn save_rules_json(path: &Path, config: &LexerConfig, rules: &Rules) -> Result<()> {
    let disk = LexerDisk::new(config, rules)
        .with_context(|| format!("encoding rules for {}", path.display()))?;
    let f = std::fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, &disk)?;
    w.flush()?;
    Ok(())
}

/// `resolver` supplies the lexers named by `using` emitters.
pub fn load_rules_json_bytes(
    data: &[u8],
    resolver: &dyn LexerResolver,
) -> Result<(LexerConfig, Rules), SerialiseError> {
    serde_json::from_slice::<LexerDisk>(data)?.into_parts(resolver)
}

pub fn load_rules_json(path: &Path, resolver: &dyn LexerResolver) -> Result<(LexerConfig, Rules)> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    load_rules_json_bytes(&data, resolver)
        .with_context(|| format!("Failed to parse rules JSON {}", path.display()))
}
