use std::collections::{HashMap, HashSet};

use cssparser::{
    AtRuleParser, BasicParseErrorKind, CowRcStr, DeclarationParser, Delimiter, ParseError, Parser,
    ParserInput, ParserState, QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
    StyleSheetParser, parse_important,
};
use selectors::matching::matches_selector;
use selectors::parser::{Selector, SelectorParseErrorKind};

use crate::css::animation::{AnimationLonghands, ComputedAnimation};
use crate::css::selector::{DomElement, DomSelectors, SelectorList, subject_keys, with_matching_context};
use crate::{Document, DomError, NodeId, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    name: String,
    value: String,
    important: bool,
}

#[derive(Debug, Clone)]
struct StyleRule {
    selector: Selector<DomSelectors>,
    declarations: Vec<Declaration>,
    specificity: u32,
    order: usize,
}

/// Rules bucketed by the rightmost compound so only plausible candidates are
/// matched per element.
#[derive(Debug, Clone, Default)]
struct RuleIndex {
    by_id: HashMap<String, Vec<usize>>,
    by_class: HashMap<String, Vec<usize>>,
    by_tag: HashMap<String, Vec<usize>>,
    universal: Vec<usize>,
}

impl RuleIndex {
    fn add(&mut self, idx: usize, selector: &Selector<DomSelectors>) {
        let keys = subject_keys(selector);
        if let Some(id) = keys.id {
            self.by_id.entry(id).or_default().push(idx);
        } else if let Some(class) = keys.class {
            self.by_class.entry(class).or_default().push(idx);
        } else if let Some(tag) = keys.tag {
            self.by_tag.entry(tag).or_default().push(idx);
        } else {
            self.universal.push(idx);
        }
    }

    fn candidates_for(&self, doc: &Document, node: NodeId) -> Vec<usize> {
        let Some(el) = doc.element(node) else {
            return Vec::new();
        };
        let mut set: HashSet<usize> = HashSet::new();
        if let Some(v) = el.id().and_then(|id| self.by_id.get(id)) {
            set.extend(v);
        }
        for class in el.classes() {
            if let Some(v) = self.by_class.get(class) {
                set.extend(v);
            }
        }
        if let Some(v) = self.by_tag.get(&el.tag) {
            set.extend(v);
        }
        set.extend(self.universal.iter().copied());
        set.into_iter().collect()
    }
}

/// Top-level items of a style sheet this cascade keeps.
enum Rule {
    Style(SelectorList, Vec<Declaration>),
    Keyframes(String),
}

/// Style rules and `@keyframes` names. Every other at-rule (`@media`,
/// `@supports`, `@import`, ...) is rejected and skipped whole.
struct TopLevelRuleParser;

impl<'i> QualifiedRuleParser<'i> for TopLevelRuleParser {
    type Prelude = SelectorList;
    type QualifiedRule = Rule;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<SelectorList, ParseError<'i, Self::Error>> {
        SelectorList::parse_from(input)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: SelectorList,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<Rule, ParseError<'i, Self::Error>> {
        Ok(Rule::Style(prelude, parse_declaration_block(input)))
    }
}

impl<'i> AtRuleParser<'i> for TopLevelRuleParser {
    type Prelude = String;
    type AtRule = Rule;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<String, ParseError<'i, Self::Error>> {
        if !name.eq_ignore_ascii_case("keyframes") && !name.eq_ignore_ascii_case("-webkit-keyframes")
        {
            return Err(input.new_error(BasicParseErrorKind::AtRuleInvalid(name)));
        }
        let keyframes = String::from(&**input.expect_ident_or_string()?);
        input.expect_exhausted()?;
        Ok(keyframes)
    }

    fn parse_block<'t>(
        &mut self,
        name: String,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<Rule, ParseError<'i, Self::Error>> {
        // Keyframe selectors and their declarations are not needed.
        while input.next().is_ok() {}
        Ok(Rule::Keyframes(name))
    }
}

/// Declarations of one block. Nested rules are not parsed.
struct DeclarationListParser;

impl<'i> DeclarationParser<'i> for DeclarationListParser {
    type Declaration = Declaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> std::result::Result<Declaration, ParseError<'i, ()>> {
        let start = input.position();
        input.parse_until_before(Delimiter::Bang, |input| {
            while input.next().is_ok() {}
            Ok::<_, ParseError<'i, ()>>(())
        })?;
        let value = input.slice_from(start).trim().to_string();
        let important = input.try_parse(parse_important).is_ok();
        input.expect_exhausted()?;
        if value.is_empty() {
            return Err(input.new_error_for_next_token());
        }
        Ok(Declaration {
            name: name.to_ascii_lowercase(),
            value,
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type AtRule = Declaration;
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type QualifiedRule = Declaration;
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, Declaration, ()> for DeclarationListParser {
    fn parse_declarations(&self) -> bool {
        true
    }

    fn parse_qualified(&self) -> bool {
        false
    }
}

fn parse_declaration_block(input: &mut Parser<'_, '_>) -> Vec<Declaration> {
    let mut parser = DeclarationListParser;
    RuleBodyParser::new(input, &mut parser)
        .filter_map(|result| match result {
            Ok(declaration) => Some(declaration),
            Err((_, text)) => {
                tracing::trace!(declaration = %text.trim(), "skipping invalid declaration");
                None
            }
        })
        .collect()
}

/// Declarations of a `style` attribute or a block body.
fn parse_declarations(source: &str) -> Vec<Declaration> {
    let mut input = ParserInput::new(source);
    let mut parser = Parser::new(&mut input);
    parse_declaration_block(&mut parser)
}

/// Parsed author style sheet, restricted to the animation family.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<StyleRule>,
    index: RuleIndex,
    keyframes: HashSet<String>,
}

impl StyleSheet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_sources(sources: &[String]) -> Self {
        let mut sheet = Self::empty();
        for source in sources {
            sheet.add_source(source);
        }
        tracing::debug!(
            rules = sheet.rules.len(),
            keyframes = sheet.keyframes.len(),
            "parsed animation style sheet"
        );
        sheet
    }

    /// Build from every `<style>` element of the document.
    pub fn from_document(doc: &Document) -> Self {
        Self::from_sources(&doc.style_sources())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Whether an `@keyframes` block with this name was seen.
    pub fn has_keyframes(&self, name: &str) -> bool {
        self.keyframes.contains(name)
    }

    pub fn add_source(&mut self, source: &str) {
        let mut input = ParserInput::new(source);
        let mut input = Parser::new(&mut input);
        let mut rules = TopLevelRuleParser;
        for result in StyleSheetParser::new(&mut input, &mut rules) {
            match result {
                Ok(Rule::Style(selectors, declarations)) => self.add_rule(selectors, declarations),
                Ok(Rule::Keyframes(name)) => {
                    self.keyframes.insert(name);
                }
                Err((error, text)) => {
                    tracing::trace!(rule = %text.trim(), error = ?error.kind, "skipping rule");
                }
            }
        }
    }

    fn add_rule(&mut self, selectors: SelectorList, declarations: Vec<Declaration>) {
        if declarations.is_empty() {
            return;
        }
        let order = self.rules.len();
        for selector in selectors.into_element_selectors() {
            let idx = self.rules.len();
            self.index.add(idx, &selector);
            self.rules.push(StyleRule {
                specificity: selector.specificity(),
                selector,
                declarations: declarations.clone(),
                order,
            });
        }
    }

    /// Resolve the animation longhands for `node`: matching rules by
    /// specificity then source order, the inline `style` attribute above
    /// rules, and `!important` above everything normal.
    pub fn compute_animation(&self, doc: &Document, node: NodeId) -> Result<ComputedAnimation> {
        let el = match doc.data(node) {
            None => return Err(DomError::UnknownNode),
            Some(data) => data.as_element().ok_or(DomError::NotAnElement)?,
        };

        let inline = el.attr("style").map(parse_declarations).unwrap_or_default();
        // (important, specificity, order, position) sort key per declaration
        let mut matched: Vec<(bool, u32, usize, usize, &Declaration)> = Vec::new();
        if let Some(element) = DomElement::new(doc, node) {
            with_matching_context(|context| {
                for idx in self.index.candidates_for(doc, node) {
                    let rule = &self.rules[idx];
                    if !matches_selector(&rule.selector, 0, None, &element, context) {
                        continue;
                    }
                    for (pos, decl) in rule.declarations.iter().enumerate() {
                        matched.push((decl.important, rule.specificity, rule.order, pos, decl));
                    }
                }
            });
        }
        for (pos, decl) in inline.iter().enumerate() {
            matched.push((decl.important, u32::MAX, usize::MAX, pos, decl));
        }
        matched.sort_by_key(|(important, specificity, order, pos, _)| {
            (*important, *specificity, *order, *pos)
        });

        let mut longhands = AnimationLonghands::default();
        for (.., decl) in matched {
            longhands.apply(&decl.name, &decl.value);
        }
        Ok(longhands.compute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_split_important() {
        let decls = parse_declarations("animation-name: a !IMPORTANT; color:red;; :x; y:");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "animation-name");
        assert_eq!(decls[0].value, "a");
        assert!(decls[0].important);
        assert_eq!(decls[1].value, "red");
        assert!(!decls[1].important);
    }

    #[test]
    fn declaration_values_keep_functions_and_strings() {
        let decls = parse_declarations(
            "Animation: spin 1s cubic-bezier(0.1, 0.7, 1, 0.1) infinite; content: \"a; b\"",
        );
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "animation");
        assert_eq!(decls[0].value, "spin 1s cubic-bezier(0.1, 0.7, 1, 0.1) infinite");
        assert_eq!(decls[1].value, "\"a; b\"");
    }

    #[test]
    fn keyframes_names_are_collected() {
        let sheet = StyleSheet::from_sources(&[
            "@keyframes fade { 0% { opacity: 0 } 100% { opacity: 1 } }\n\
             @-webkit-keyframes 'spin' { to { transform: rotate(1turn) } }\n\
             .a { animation-name: fade }"
                .to_string(),
        ]);
        assert!(sheet.has_keyframes("fade"));
        assert!(sheet.has_keyframes("spin"));
        assert_eq!(sheet.rule_count(), 1);
    }

    #[test]
    fn selector_lists_share_source_order() {
        let sheet = StyleSheet::from_sources(&[".a, .b { animation-name: x }".to_string()]);
        assert_eq!(sheet.rule_count(), 2);
        assert_eq!(sheet.rules[0].order, sheet.rules[1].order);
    }

    #[test]
    fn invalid_rules_do_not_hide_later_ones() {
        let sheet = StyleSheet::from_sources(&[
            ".a:bogus { animation-name: x } \
             @media print { .b { animation-name: y } } \
             .c[data-k=\"1, 2\"] { animation-name: z } \
             .d { animation-name: w"
                .to_string(),
        ]);
        // `.c[...]` and the unterminated `.d` block survive.
        assert_eq!(sheet.rule_count(), 2);
    }

    #[test]
    fn unterminated_comment_drops_tail() {
        let sheet =
            StyleSheet::from_sources(&[".a { animation-name: x } /* .b { animation-name: y }".to_string()]);
        assert_eq!(sheet.rule_count(), 1);
    }
}
