// src/main.rs
// Tokenise a file with a grammar stored as XML or JSON and print the tokens.
//
//   rulelex <grammar.xml|grammar.json> [input]     (stdin when input is omitted)
//   RULELEX_START=<state>                          start state (default "root")

use std::{
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use rulelex::{
    RegexLexer, Registry, TokeniseOptions,
    lexer::tables::{load_lexer_xml, load_rules_json},
};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(grammar) = args.next() else {
        bail!("usage: rulelex <grammar.xml|grammar.json> [input]");
    };
    let grammar = Path::new(&grammar);

    // Grammars loaded here cannot delegate to other languages by name.
    let registry = Registry::new();
    let (config, rules) = match grammar.extension().and_then(|e| e.to_str()) {
        Some("json") => load_rules_json(grammar, &registry)?,
        _ => load_lexer_xml(grammar, &registry)?,
    };
    let lexer = RegexLexer::new(config, rules)
        .with_context(|| format!("compiling {}", grammar.display()))?;

    let mut src = String::new();
    match args.next() {
        Some(path) => {
            src = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
        }
        None => {
            std::io::stdin().read_to_string(&mut src)?;
        }
    }

    let start = std::env::var("RULELEX_START").unwrap_or_else(|_| "root".into());
    let out = std::io::stdout();
    let mut out = out.lock();
    for tok in lexer.tokenise_iter(&TokeniseOptions::start_in(start), &src)? {
        let tok = tok?;
        writeln!(out, "{:>6}  {:<24} {:?}", tok.start, tok.kind.name(), tok.text)?;
    }
    Ok(())
}
