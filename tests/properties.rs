//! Randomised checks of coverage, determinism and progress over a small
//! C-like grammar. Seeded, so failures replay.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rulelex::{
    LexerConfig, Mutator, RegexLexer, Rules, Token, TokenType,
    lexer::tables::{pop, push, rule, using_self},
};

const ALPHABET: &[&str] = &[
    "a", "b", "z", "_", "0", "7", "\"", "\\", "{", "}", "(", ")", "+", "=", "/", "*", ";", " ",
    "\n", "\t", "é", "λ", "🙂", "//", "/*", "*/",
];

fn grammar() -> RegexLexer {
    let rules = Rules::new()
        .state(
            "root",
            [
                rule(r"//[^\n]*", TokenType::CommentSingle, None),
                rule(r"/\*", TokenType::CommentMultiline, Some(push(["comment"]))),
                rule("\"", TokenType::String, Some(push(["string"]))),
                rule(r"\{[^{}]*\}", using_self("block"), None),
                rule(r"\(", TokenType::Punctuation, Some(Mutator::Push(Vec::new()))),
                rule(r"\)", TokenType::Punctuation, Some(pop(1))),
                rule(r"[0-9]+", TokenType::Number, None),
                rule(r"[A-Za-z_]\w*", TokenType::Name, None),
                rule(r"[+=/*;]", TokenType::Operator, None),
                rule(r"\s+", TokenType::Whitespace, None),
            ],
        )
        .state(
            "comment",
            [
                rule(r"\*/", TokenType::CommentMultiline, Some(pop(1))),
                rule(r"[^*]+", TokenType::CommentMultiline, None),
                rule(r"\*", TokenType::CommentMultiline, None),
            ],
        )
        .state(
            "string",
            [
                rule("\"", TokenType::String, Some(pop(1))),
                rule(r"\\.", TokenType::StringEscape, None),
                rule(r#"[^"\\\n]+"#, TokenType::String, None),
            ],
        )
        .state(
            "block",
            [
                rule(r"[{}]", TokenType::Punctuation, None),
                rule(r"[^{}]+", TokenType::Text, None),
            ],
        );
    RegexLexer::new(LexerConfig::named("c-ish"), rules).unwrap()
}

fn random_input(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..=60);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
        .collect()
}

fn inputs(seed: u64, n: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| random_input(&mut rng)).collect()
}

fn assert_covers(src: &str, toks: &[Token<'_>]) {
    let mut pos = 0;
    for t in toks {
        assert_eq!(t.start, pos, "gap or overlap before {t:?} in {src:?}");
        assert!(!t.text.is_empty(), "empty token in {src:?}");
        assert_eq!(&src[t.start..t.end()], t.text);
        pos = t.end();
    }
    assert_eq!(pos, src.len(), "input not fully covered: {src:?}");
}

#[test]
fn tokens_cover_input_exactly() {
    let lx = grammar();
    for src in inputs(0x5eed, 300) {
        let toks = lx
            .tokenise_all(&src)
            .unwrap_or_else(|e| panic!("{src:?}: {e}"));
        assert_covers(&src, &toks);
    }
}

#[test]
fn tokenising_is_deterministic() {
    let lx = grammar();
    for src in inputs(7, 100) {
        assert_eq!(lx.tokenise_all(&src).unwrap(), lx.tokenise_all(&src).unwrap());
    }
}

#[test]
fn parallel_batch_matches_sequential_runs() {
    let lx = grammar();
    let owned = inputs(42, 64);
    let srcs: Vec<&str> = owned.iter().map(String::as_str).collect();
    let batch = lx.tokenise_many(&srcs);
    assert_eq!(batch.len(), srcs.len());
    for (src, got) in srcs.iter().zip(batch) {
        assert_eq!(got.unwrap(), lx.tokenise_all(src).unwrap());
    }
}

#[test]
fn every_step_makes_progress() {
    let lx = grammar();
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let src = random_input(&mut rng);
        // Bounded by the input length: each token consumes at least one byte.
        let n = lx.tokenise_all(&src).unwrap().len();
        assert!(n <= src.len());
    }
}

#[test]
fn early_stop_is_harmless() {
    let lx = grammar();
    let src = "abc ".repeat(1000);
    let first: Vec<_> = lx
        .tokenise_iter(&Default::default(), &src)
        .unwrap()
        .take(3)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first[2].text, "abc");
}
