//! CSS tokenization into a lightweight rule tree.
//!
//! Adapted from a CSS Syntax Module Level 3 parser built on `cssparser`;
//! extended here to surface `@media` nesting (for cascade weighting, spec
//! §4.3) and `@import` targets (for the fetcher's import-chain resolution).

use cssparser::{
    AtRuleParser, BasicParseErrorKind, CowRcStr, DeclarationParser, ParseError, Parser,
    ParserInput, ParserState, QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
    StyleSheetParser,
};

/// A single CSS declaration (`property: value [!important]`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Lowercased property name.
    pub name: String,
    /// Raw value text (without a trailing `!important`).
    pub value: String,
    /// Whether the declaration was marked `!important`.
    pub important: bool,
}

/// A single style rule with a raw prelude and parsed declarations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyleRule {
    /// Raw prelude text (typically the selector list).
    pub prelude: String,
    /// Declarations within the rule block.
    pub declarations: Vec<Declaration>,
    /// Enclosing `@media` prelude strings, outermost first. Empty for rules
    /// declared at the stylesheet's top level.
    pub media: Vec<String>,
}

/// A parsed stylesheet: its rules (media-nested rules flattened with their
/// `@media` context attached) and any `@import` targets, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stylesheet {
    /// Rules in source order; nested `@media` rules are flattened in.
    pub rules: Vec<StyleRule>,
    /// `@import` URLs/paths as written, unresolved.
    pub imports: Vec<String>,
}

fn split_important_tail(value: &str) -> (String, bool) {
    let trimmed = value.trim();
    if let Some(pos) = trimmed.rfind("!important") {
        if let Some(prefix) = trimmed.get(..pos) {
            let head = prefix.trim_end();
            return (head.to_owned(), true);
        }
    }
    (trimmed.to_owned(), false)
}

struct BodyDeclParser;

impl<'i> DeclarationParser<'i> for BodyDeclParser {
    type Declaration = Declaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _decl_start: &ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let start = input.position();
        while input.next_including_whitespace_and_comments().is_ok() {}
        let raw = input.slice_from(start);
        let (value, important) = split_important_tail(raw);
        Ok(Declaration {
            name: name.to_ascii_lowercase(),
            value,
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for BodyDeclParser {
    type Prelude = ();
    type AtRule = Declaration;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        _name: CowRcStr<'i>,
        _input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Ok(())
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        _state: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::AtRuleBodyInvalid))
    }

    fn rule_without_block(
        &mut self,
        _prelude: Self::Prelude,
        _state: &ParserState,
    ) -> Result<Self::AtRule, Self::Error> {
        Err(())
    }
}

impl<'i> QualifiedRuleParser<'i> for BodyDeclParser {
    type Prelude = ();
    type QualifiedRule = Declaration;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::QualifiedRuleInvalid))
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        _state: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::QualifiedRuleInvalid))
    }
}

impl<'i> RuleBodyItemParser<'i, Declaration, ()> for BodyDeclParser {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

fn parse_declarations_from_block(block: &mut Parser) -> Vec<Declaration> {
    let mut body = BodyDeclParser;
    RuleBodyParser::new(block, &mut body).flatten().collect()
}

/// A style rule nested one level deep inside `@media`; deeper at-rules are
/// skipped (the layout profiler only needs breakpoint-level granularity).
struct NestedRuleParser;

impl<'i> AtRuleParser<'i> for NestedRuleParser {
    type Prelude = ();
    type AtRule = StyleRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        _name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::AtRuleInvalid("nested".into())))
    }
}

impl<'i> QualifiedRuleParser<'i> for NestedRuleParser {
    type Prelude = String;
    type QualifiedRule = StyleRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let start = input.state();
        while input.next_including_whitespace_and_comments().is_ok() {}
        Ok(input.slice_from(start.position()).trim().to_owned())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _state: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        Ok(StyleRule {
            prelude,
            declarations: parse_declarations_from_block(input),
            media: Vec::new(),
        })
    }
}

impl<'i> RuleBodyItemParser<'i, StyleRule, ()> for NestedRuleParser {
    fn parse_declarations(&self) -> bool {
        false
    }
    fn parse_qualified(&self) -> bool {
        true
    }
}

fn parse_nested_rules(block: &mut Parser) -> Vec<StyleRule> {
    let mut nested = NestedRuleParser;
    RuleBodyParser::new(block, &mut nested).flatten().collect()
}

enum AtPrelude {
    Import(String),
    Media(String),
}

enum TopItem {
    Style(StyleRule),
    Media { prelude: String, rules: Vec<StyleRule> },
    Import(String),
}

struct TopLevelParser;

impl<'i> AtRuleParser<'i> for TopLevelParser {
    type Prelude = AtPrelude;
    type AtRule = TopItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        match &*name.to_ascii_lowercase() {
            "import" => {
                let url = input
                    .expect_url_or_string()
                    .map(|s| s.as_ref().to_owned())
                    .map_err(|_| input.new_error(BasicParseErrorKind::AtRuleInvalid(name.clone())))?;
                while input.next().is_ok() {}
                Ok(AtPrelude::Import(url))
            }
            "media" => {
                let start = input.state();
                while input.next_including_whitespace_and_comments().is_ok() {}
                Ok(AtPrelude::Media(input.slice_from(start.position()).trim().to_owned()))
            }
            _ => Err(input.new_error(BasicParseErrorKind::AtRuleInvalid(name.clone()))),
        }
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _state: &ParserState,
    ) -> Result<Self::AtRule, Self::Error> {
        match prelude {
            AtPrelude::Import(url) => Ok(TopItem::Import(url)),
            AtPrelude::Media(_) => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _state: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        match prelude {
            AtPrelude::Media(text) => Ok(TopItem::Media {
                prelude: text,
                rules: parse_nested_rules(input),
            }),
            AtPrelude::Import(_) => Err(input.new_error(BasicParseErrorKind::AtRuleBodyInvalid)),
        }
    }
}

impl<'i> QualifiedRuleParser<'i> for TopLevelParser {
    type Prelude = String;
    type QualifiedRule = TopItem;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let start = input.state();
        while input.next_including_whitespace_and_comments().is_ok() {}
        Ok(input.slice_from(start.position()).trim().to_owned())
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _state: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        Ok(TopItem::Style(StyleRule {
            prelude,
            declarations: parse_declarations_from_block(input),
            media: Vec::new(),
        }))
    }
}

/// Parses a full stylesheet, flattening `@media` bodies into top-level rules
/// tagged with their enclosing media prelude and collecting `@import` URLs.
pub fn parse_stylesheet(css: &str) -> Stylesheet {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut top = TopLevelParser;
    let mut sheet = Stylesheet::default();

    for item in StyleSheetParser::new(&mut parser, &mut top).flatten() {
        match item {
            TopItem::Style(rule) => sheet.rules.push(rule),
            TopItem::Media { prelude, rules } => {
                for mut rule in rules {
                    rule.media.push(prelude.clone());
                    sheet.rules.push(rule);
                }
            }
            TopItem::Import(url) => sheet.imports.push(url),
        }
    }
    sheet
}
