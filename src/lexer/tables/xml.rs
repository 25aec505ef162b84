//! XML form of a grammar:
//!
//! ```xml
//! <lexer>
//!   <config><name>Go</name><alias>golang</alias></config>
//!   <rules>
//!     <state name="root">
//!       <rule pattern="\d+"><token type="LiteralNumber"/></rule>
//!       <rule pattern="&quot;"><token type="LiteralString"/><push><state name="string"/></push></rule>
//!       <rule><include state="comments"/></rule>
//!     </state>
//!   </rules>
//! </lexer>
//! ```

use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use log::debug;
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};

use super::{Rule, Rules, tokens::TokenType};
use crate::{
    config::LexerConfig,
    error::SerialiseError,
    lexer::{
        emit::{EMITTER_KINDS, Emitter},
        mutate::{MUTATOR_KINDS, Mutator},
    },
    registry::LexerResolver,
};

// -------------------- writing --------------------

type XmlWriter = Writer<Vec<u8>>;

pub fn rules_to_xml(rules: &Rules) -> Result<String, SerialiseError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_rules(&mut w, rules)?;
    Ok(String::from_utf8(w.into_inner())?)
}

pub fn lexer_to_xml(config: &LexerConfig, rules: &Rules) -> Result<String, SerialiseError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    start(&mut w, "lexer", &[])?;
    write_config(&mut w, config)?;
    write_rules(&mut w, rules)?;
    end(&mut w, "lexer")?;
    Ok(String::from_utf8(w.into_inner())?)
}

fn start(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerialiseError> {
    let mut el = BytesStart::new(name);
    for &attr in attrs {
        el.push_attribute(attr);
    }
    w.write_event(Event::Start(el))?;
    Ok(())
}

fn empty(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<(), SerialiseError> {
    let mut el = BytesStart::new(name);
    for &attr in attrs {
        el.push_attribute(attr);
    }
    w.write_event(Event::Empty(el))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> Result<(), SerialiseError> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn simple(w: &mut XmlWriter, name: &str, value: &str) -> Result<(), SerialiseError> {
    start(w, name, &[])?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    end(w, name)
}

fn write_config(w: &mut XmlWriter, config: &LexerConfig) -> Result<(), SerialiseError> {
    start(w, "config", &[])?;
    simple(w, "name", &config.name)?;
    for alias in &config.aliases {
        simple(w, "alias", alias)?;
    }
    for filename in &config.filenames {
        simple(w, "filename", filename)?;
    }
    for mime in &config.mime_types {
        simple(w, "mime_type", mime)?;
    }
    for (name, set) in [
        ("case_insensitive", config.case_insensitive),
        ("dot_all", config.dot_all),
        ("not_multiline", config.not_multiline),
    ] {
        if set {
            simple(w, name, "true")?;
        }
    }
    if config.priority != 0.0 {
        simple(w, "priority", &config.priority.to_string())?;
    }
    end(w, "config")
}

fn write_rules(w: &mut XmlWriter, rules: &Rules) -> Result<(), SerialiseError> {
    start(w, "rules", &[])?;
    for (state, list) in rules.iter() {
        start(w, "state", &[("name", state)])?;
        for (index, rule) in list.iter().enumerate() {
            if let Some(kind) = rule.emitter.as_ref().and_then(Emitter::unserialisable_kind) {
                return Err(SerialiseError::NotSerialisable {
                    state: state.to_owned(),
                    index,
                    kind,
                });
            }
            match &rule.pattern {
                Some(p) => start(w, "rule", &[("pattern", p.as_str())])?,
                None => start(w, "rule", &[])?,
            }
            if let Some(e) = &rule.emitter {
                write_emitter(w, e)?;
            }
            if let Some(m) = &rule.mutator {
                write_mutator(w, m)?;
            }
            end(w, "rule")?;
        }
        end(w, "state")?;
    }
    end(w, "rules")
}

fn write_emitter(w: &mut XmlWriter, e: &Emitter) -> Result<(), SerialiseError> {
    match e {
        Emitter::Token(t) => empty(w, "token", &[("type", t.name())]),
        Emitter::ByGroups(list) => {
            start(w, "bygroups", &[])?;
            for e in list {
                match e {
                    Some(e) => write_emitter(w, e)?,
                    None => empty(w, "skip", &[])?,
                }
            }
            end(w, "bygroups")
        }
        Emitter::ByGroupNames(map) => {
            start(w, "bygroupnames", &[])?;
            for (name, e) in map {
                match e {
                    Some(e) => {
                        start(w, "group", &[("name", name.as_str())])?;
                        write_emitter(w, e)?;
                        end(w, "group")?;
                    }
                    None => empty(w, "group", &[("name", name.as_str())])?,
                }
            }
            end(w, "bygroupnames")
        }
        Emitter::Using(lexer) => empty(w, "using", &[("lexer", lexer.config().name.as_str())]),
        Emitter::UsingSelf(state) => empty(w, "usingself", &[("state", state.as_str())]),
        Emitter::UsingByGroup(_) | Emitter::Func(_) => Err(SerialiseError::Malformed(format!(
            "{} emitter has no XML form",
            e.kind()
        ))),
    }
}

fn write_mutator(w: &mut XmlWriter, m: &Mutator) -> Result<(), SerialiseError> {
    match m {
        Mutator::Push(states) | Mutator::Combined(states) => {
            let tag = m.kind();
            start(w, tag, &[])?;
            for s in states {
                empty(w, "state", &[("name", s.as_str())])?;
            }
            end(w, tag)
        }
        Mutator::Pop(depth) => empty(w, "pop", &[("depth", depth.to_string().as_str())]),
        Mutator::Include(state) => empty(w, "include", &[("state", state.as_str())]),
        Mutator::Multi(list) => {
            start(w, "mutators", &[])?;
            for m in list {
                write_mutator(w, m)?;
            }
            end(w, "mutators")
        }
    }
}

// -------------------- reading --------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn open(e: &BytesStart<'_>) -> Result<Self, SerialiseError> {
        let mut el = Element {
            name: String::from_utf8(e.name().as_ref().to_vec())?,
            ..Element::default()
        };
        for attr in e.attributes() {
            let attr = attr?;
            el.attrs.push((
                String::from_utf8(attr.key.as_ref().to_vec())?,
                attr.unescape_value()?.into_owned(),
            ));
        }
        Ok(el)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str) -> Result<&str, SerialiseError> {
        self.attr(key).ok_or_else(|| {
            SerialiseError::Malformed(format!("<{}> lacks the {key:?} attribute", self.name))
        })
    }

    fn require_tag(&self, name: &str) -> Result<(), SerialiseError> {
        if self.name == name {
            Ok(())
        } else {
            Err(SerialiseError::Malformed(format!(
                "expected <{name}>, found <{}>",
                self.name
            )))
        }
    }
}

fn parse(xml: &str) -> Result<Element, SerialiseError> {
    // Text is kept as written; config leaves like `<name>` may carry
    // meaningful whitespace. Only leaves ever read their text.
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Element> = Vec::new();
    loop {
        let closed = match reader.read_event()? {
            Event::Start(e) => {
                open.push(Element::open(&e)?);
                continue;
            }
            Event::Empty(e) => Element::open(&e)?,
            Event::End(_) => open
                .pop()
                .ok_or_else(|| SerialiseError::Malformed("unbalanced end tag".into()))?,
            Event::Text(t) => {
                if let Some(top) = open.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
                continue;
            }
            Event::CData(c) => {
                if let Some(top) = open.last_mut() {
                    top.text.push_str(&String::from_utf8(c.into_inner().into_owned())?);
                }
                continue;
            }
            Event::Eof => {
                return Err(SerialiseError::Malformed("document has no root element".into()));
            }
            _ => continue,
        };
        match open.last_mut() {
            Some(parent) => parent.children.push(closed),
            None => return Ok(closed),
        }
    }
}

/// Accepts either a bare `<rules>` document or a full `<lexer>`.
pub fn rules_from_xml(xml: &str, resolver: &dyn LexerResolver) -> Result<Rules, SerialiseError> {
    let root = parse(xml)?;
    if root.name == "lexer" {
        return decode_lexer(&root, resolver).map(|(_, rules)| rules);
    }
    decode_rules(&root, resolver)
}

pub fn lexer_from_xml(
    xml: &str,
    resolver: &dyn LexerResolver,
) -> Result<(LexerConfig, Rules), SerialiseError> {
    decode_lexer(&parse(xml)?, resolver)
}

pub fn save_lexer_xml(path: &Path, config: &LexerConfig, rules: &Rules) -> anyhow::Result<()> {
    let xml = lexer_to_xml(config, rules)
        .with_context(|| format!("encoding rules for {}", path.display()))?;
    std::fs::write(path, xml).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn load_lexer_xml(
    path: &Path,
    resolver: &dyn LexerResolver,
) -> anyhow::Result<(LexerConfig, Rules)> {
    let xml = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    lexer_from_xml(&xml, resolver)
        .with_context(|| format!("Failed to parse lexer XML {}", path.display()))
}

fn decode_lexer(
    root: &Element,
    resolver: &dyn LexerResolver,
) -> Result<(LexerConfig, Rules), SerialiseError> {
    root.require_tag("lexer")?;
    let mut config = None;
    let mut rules = None;
    for child in &root.children {
        match child.name.as_str() {
            "config" => config = Some(decode_config(child)?),
            "rules" => rules = Some(decode_rules(child, resolver)?),
            other => debug!("xml: ignoring <{other}> in <lexer>"),
        }
    }
    let rules = rules.ok_or_else(|| SerialiseError::Malformed("<lexer> has no <rules>".into()))?;
    Ok((config.unwrap_or_default(), rules))
}

fn decode_config(el: &Element) -> Result<LexerConfig, SerialiseError> {
    let mut config = LexerConfig::default();
    for child in &el.children {
        let text = child.text.clone();
        match child.name.as_str() {
            "name" => config.name = text,
            "alias" => config.aliases.push(text),
            "filename" => config.filenames.push(text),
            "mime_type" => config.mime_types.push(text),
            "case_insensitive" => config.case_insensitive = decode_bool(child)?,
            "dot_all" => config.dot_all = decode_bool(child)?,
            "not_multiline" => config.not_multiline = decode_bool(child)?,
            "priority" => {
                config.priority = text.trim().parse().map_err(|_| {
                    SerialiseError::Malformed(format!("bad priority {text:?}"))
                })?
            }
            other => debug!("xml: ignoring config field <{other}>"),
        }
    }
    Ok(config)
}

fn decode_bool(el: &Element) -> Result<bool, SerialiseError> {
    match el.text.trim() {
        "true" | "" => Ok(true),
        "false" => Ok(false),
        other => Err(SerialiseError::Malformed(format!(
            "<{}> must be true or false, not {other:?}",
            el.name
        ))),
    }
}

fn decode_rules(el: &Element, resolver: &dyn LexerResolver) -> Result<Rules, SerialiseError> {
    el.require_tag("rules")?;
    let mut rules = Rules::new();
    for state in &el.children {
        state.require_tag("state")?;
        let list = state
            .children
            .iter()
            .map(|r| decode_rule(r, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        rules.insert(state.required("name")?, list);
    }
    Ok(rules)
}

fn decode_rule(el: &Element, resolver: &dyn LexerResolver) -> Result<Rule, SerialiseError> {
    el.require_tag("rule")?;
    let mut rule = Rule {
        pattern: el.attr("pattern").map(str::to_owned),
        emitter: None,
        mutator: None,
    };
    for child in &el.children {
        let kind = child.name.as_str();
        if EMITTER_KINDS.contains(&kind) {
            if rule.emitter.is_some() {
                return Err(SerialiseError::DuplicateEmitter(kind.to_owned()));
            }
            rule.emitter = Some(decode_emitter(child, resolver)?);
        } else if MUTATOR_KINDS.contains(&kind) {
            if rule.mutator.is_some() {
                return Err(SerialiseError::DuplicateMutator(kind.to_owned()));
            }
            rule.mutator = Some(decode_mutator(child)?);
        } else {
            return Err(SerialiseError::UnknownEmitter(kind.to_owned()));
        }
    }
    Ok(rule)
}

fn decode_emitter(el: &Element, resolver: &dyn LexerResolver) -> Result<Emitter, SerialiseError> {
    Ok(match el.name.as_str() {
        "token" => Emitter::Token(el.required("type")?.parse::<TokenType>()?),
        "bygroups" => Emitter::ByGroups(
            el.children
                .iter()
                .map(|c| match c.name.as_str() {
                    "skip" => Ok(None),
                    _ => decode_emitter(c, resolver).map(Some),
                })
                .collect::<Result<_, _>>()?,
        ),
        "bygroupnames" => {
            let mut map = IndexMap::with_capacity(el.children.len());
            for group in &el.children {
                group.require_tag("group")?;
                let emitter = match group.children.as_slice() {
                    [] => None,
                    [e] => Some(decode_emitter(e, resolver)?),
                    [_, e, ..] => return Err(SerialiseError::DuplicateEmitter(e.name.clone())),
                };
                map.insert(group.required("name")?.to_owned(), emitter);
            }
            Emitter::ByGroupNames(map)
        }
        "using" => {
            let name = el.required("lexer")?;
            Emitter::Using(
                resolver
                    .resolve(name)
                    .ok_or_else(|| SerialiseError::UnknownLexer(name.to_owned()))?,
            )
        }
        "usingself" => Emitter::UsingSelf(el.required("state")?.to_owned()),
        other => return Err(SerialiseError::UnknownEmitter(other.to_owned())),
    })
}

fn decode_mutator(el: &Element) -> Result<Mutator, SerialiseError> {
    let states = || {
        el.children
            .iter()
            .map(|s| {
                s.require_tag("state")?;
                s.required("name").map(str::to_owned)
            })
            .collect::<Result<Vec<_>, SerialiseError>>()
    };
    Ok(match el.name.as_str() {
        "push" => Mutator::Push(states()?),
        "combined" => Mutator::Combined(states()?),
        "pop" => {
            let depth = el.required("depth")?;
            Mutator::Pop(depth.parse().map_err(|_| {
                SerialiseError::Malformed(format!("bad pop depth {depth:?}"))
            })?)
        }
        "include" => Mutator::Include(el.required("state")?.to_owned()),
        "mutators" => Mutator::Multi(
            el.children
                .iter()
                .map(decode_mutator)
                .collect::<Result<_, _>>()?,
        ),
        other => return Err(SerialiseError::UnknownMutator(other.to_owned())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lexer::tables::{
            by_group_names, by_groups, combined, emit_fn, include, mutators, pop, push, rule,
            using_self,
        },
        registry::Registry,
    };

    fn template_rules() -> Rules {
        let tt = |p: &str, t: TokenType| rule(p, t, None);
        Rules::new()
            .state(
                "root",
                [
                    tt(r"{{(- )?/\*(.|\n)*?\*/( -)?}}", TokenType::CommentMultiline),
                    rule(r"{{[-]?", TokenType::CommentPreproc, Some(push(["template"]))),
                    tt(r"[^{]+", TokenType::Other),
                    tt(r"\{", TokenType::Other),
                ],
            )
            .state(
                "template",
                [
                    rule(r"[-]?}}", TokenType::CommentPreproc, Some(pop(1))),
                    rule(r"\(", TokenType::Operator, Some(push(["subexpression"]))),
                    tt(r#""(\\\\|\\"|[^"])*""#, TokenType::LiteralString),
                    include("expression"),
                ],
            )
            .state(
                "subexpression",
                [
                    rule(r"\)", TokenType::Operator, Some(pop(1))),
                    include("expression"),
                ],
            )
            .state(
                "expression",
                [
                    tt(r"\s+", TokenType::Whitespace),
                    rule(r"\(", TokenType::Operator, Some(push(["subexpression"]))),
                    tt(r"(range|if|else|with|template|end|true|false|nil)\b", TokenType::Keyword),
                    tt(r"\||:?=|,", TokenType::Operator),
                    tt(r"[$]?[^\W\d]\w*", TokenType::NameOther),
                    tt(r"\$|[$]?\.(?:[^\W\d]\w*)?", TokenType::NameAttribute),
                    tt(r"-?0[xX][0-9a-fA-F]+", TokenType::LiteralNumberHex),
                    tt(r"-?(0|[1-9][0-9]*)", TokenType::LiteralNumberInteger),
                    tt("`[^`]*`", TokenType::LiteralString),
                ],
            )
    }

    #[test]
    fn template_grammar_round_trips() {
        let rules = template_rules();
        let xml = rules_to_xml(&rules).unwrap();
        assert!(xml.contains(r#"<token type="CommentPreproc"/>"#), "{xml}");
        assert!(xml.contains(r#"<include state="expression"/>"#), "{xml}");
        let back = rules_from_xml(&xml, &Registry::new()).unwrap();
        assert_eq!(back, rules);
    }

    #[test]
    fn composite_emitters_and_mutators_round_trip() {
        let rules = Rules::new()
            .state(
                "root",
                [
                    rule(
                        r"(\w+)(\s*)(=)",
                        by_groups([
                            Some(TokenType::NameAttribute.into()),
                            None,
                            Some(TokenType::Operator.into()),
                        ]),
                        Some(mutators([push(["value"]), Mutator::Push(Vec::new())])),
                    ),
                    rule(
                        r"(?P<open><)(?P<tag>\w+)",
                        by_group_names([
                            ("open", Some(TokenType::Punctuation.into())),
                            ("tag", None),
                        ]),
                        Some(combined(["attrs", "value"])),
                    ),
                    rule(r"\[.*?\]", using_self("value"), None),
                ],
            )
            .state("attrs", [rule(r"\s+", TokenType::Whitespace, None)])
            .state("value", [rule(r"\d+", TokenType::Number, Some(pop(2)))]);
        let config = LexerConfig {
            case_insensitive: true,
            priority: 0.5,
            ..LexerConfig::named("kv").with_aliases(["keyvalue"])
        };
        let xml = lexer_to_xml(&config, &rules).unwrap();
        let (config2, rules2) = lexer_from_xml(&xml, &Registry::new()).unwrap();
        assert_eq!(config2, config);
        assert_eq!(rules2, rules);
        // A full document is also accepted where only rules are wanted.
        assert_eq!(rules_from_xml(&xml, &Registry::new()).unwrap(), rules);
    }

    #[test]
    fn special_characters_in_patterns_are_escaped() {
        let rules = Rules::new().state("root", [rule(r#"<"&'>"#, TokenType::Punctuation, None)]);
        let xml = rules_to_xml(&rules).unwrap();
        assert_eq!(rules_from_xml(&xml, &Registry::new()).unwrap(), rules);
    }

    #[test]
    fn duplicate_emitter_is_rejected() {
        let xml = r#"<rules><state name="root">
            <rule pattern="a"><token type="Text"/><token type="Keyword"/></rule>
        </state></rules>"#;
        assert!(matches!(
            rules_from_xml(xml, &Registry::new()),
            Err(SerialiseError::DuplicateEmitter(k)) if k == "token"
        ));
    }

    #[test]
    fn duplicate_mutator_is_rejected() {
        let xml = r#"<rules><state name="root">
            <rule pattern="a"><pop depth="1"/><push/></rule>
        </state></rules>"#;
        assert!(matches!(
            rules_from_xml(xml, &Registry::new()),
            Err(SerialiseError::DuplicateMutator(k)) if k == "push"
        ));
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let unknown_child = r#"<rules><state name="root"><rule pattern="a"><sparkle/></rule></state></rules>"#;
        assert!(matches!(
            rules_from_xml(unknown_child, &Registry::new()),
            Err(SerialiseError::UnknownEmitter(k)) if k == "sparkle"
        ));
        let unknown_nested = r#"<rules><state name="root"><rule pattern="a"><mutators><jump/></mutators></rule></state></rules>"#;
        assert!(matches!(
            rules_from_xml(unknown_nested, &Registry::new()),
            Err(SerialiseError::UnknownMutator(k)) if k == "jump"
        ));
        let unknown_token = r#"<rules><state name="root"><rule pattern="a"><token type="Sparkle"/></rule></state></rules>"#;
        assert!(matches!(
            rules_from_xml(unknown_token, &Registry::new()),
            Err(SerialiseError::UnknownTokenType(k)) if k == "Sparkle"
        ));
    }

    #[test]
    fn function_emitter_cannot_be_written() {
        let rules = Rules::new().state(
            "root",
            [
                rule("a", TokenType::Text, None),
                rule("b", by_groups([Some(emit_fn(|_, _| Vec::new()))]), None),
            ],
        );
        assert!(matches!(
            rules_to_xml(&rules),
            Err(SerialiseError::NotSerialisable { index: 1, kind: "func", ref state }) if state == "root"
        ));
    }

    #[test]
    fn config_text_keeps_its_whitespace() {
        let mut config = LexerConfig::named(" spaced ").with_aliases([" x", "y "]);
        config.filenames.push("*.ini".into());
        let rules = Rules::new().state("root", [rule("a", TokenType::Text, None)]);
        let xml = lexer_to_xml(&config, &rules).unwrap();
        let (back, _) = lexer_from_xml(&xml, &Registry::new()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn padded_flags_still_parse() {
        let xml = "<lexer><config><dot_all> true </dot_all><priority>\n 0.5 \n</priority></config>\
                   <rules><state name=\"root\"><rule pattern=\"a\"><token type=\"Text\"/></rule></state></rules></lexer>";
        let (config, _) = lexer_from_xml(xml, &Registry::new()).unwrap();
        assert!(config.dot_all);
        assert_eq!(config.priority, 0.5);
    }

    #[test]
    fn truncated_document_fails() {
        assert!(rules_from_xml("<rules><state name=\"root\">", &Registry::new()).is_err());
        assert!(rules_from_xml("", &Registry::new()).is_err());
    }
}
