//! Selector matching through Servo's `selectors` crate.
//!
//! [`DomElement`] adapts a [`Document`] element to `selectors::Element`, so
//! the full Selectors Level 3 grammar (combinators, attribute operators,
//! `:not()`, `:nth-child()`, `:is()`/`:where()`) matches the way a browser
//! would. User-action pseudo-classes parse but never match: a headless page
//! has no pointer or focus.

use cssparser::{
    CowRcStr, CssStringWriter, ParseError, Parser as CssParser, ParserInput, SourceLocation,
    ToCss, serialize_identifier,
};
use ego_tree::NodeRef;
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::context::QuirksMode;
use selectors::matching::{
    ElementSelectorFlags, IgnoreNthChildForInvalidation, MatchingContext, MatchingMode,
    NeedsSelectorFlags, matches_selector,
};
use selectors::parser::{Component, ParseRelative, Selector, SelectorImpl, SelectorParseErrorKind};
use selectors::{Element, NthIndexCache, OpaqueElement, SelectorList as ServoSelectorList};

use crate::document::{ElementData, NodeData};
use crate::{Document, NodeId};

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CssIdent(pub String);

impl AsRef<str> for CssIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for CssIdent {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'a> From<&'a str> for CssIdent {
    fn from(s: &'a str) -> Self {
        Self(s.to_owned())
    }
}

impl ToCss for CssIdent {
    fn to_css<W>(&self, dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        serialize_identifier(&self.0, dest)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CssAttrValue(pub String);

impl AsRef<str> for CssAttrValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'a> From<&'a str> for CssAttrValue {
    fn from(s: &'a str) -> Self {
        Self(s.to_owned())
    }
}

impl ToCss for CssAttrValue {
    fn to_css<W>(&self, dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        use std::fmt::Write;
        dest.write_char('"')?;
        write!(CssStringWriter::new(dest), "{}", &self.0)?;
        dest.write_char('"')
    }
}

/// Non tree-structural pseudo-classes understood by the page style sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoClass {
    Hover,
    Active,
    Focus,
    FocusVisible,
    FocusWithin,
    Visited,
    Target,
    Link,
    AnyLink,
    Checked,
    Disabled,
    Enabled,
}

impl PseudoClass {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "hover" => Self::Hover,
            "active" => Self::Active,
            "focus" => Self::Focus,
            "focus-visible" => Self::FocusVisible,
            "focus-within" => Self::FocusWithin,
            "visited" => Self::Visited,
            "target" => Self::Target,
            "link" => Self::Link,
            "any-link" => Self::AnyLink,
            "checked" => Self::Checked,
            "disabled" => Self::Disabled,
            "enabled" => Self::Enabled,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Hover => "hover",
            Self::Active => "active",
            Self::Focus => "focus",
            Self::FocusVisible => "focus-visible",
            Self::FocusWithin => "focus-within",
            Self::Visited => "visited",
            Self::Target => "target",
            Self::Link => "link",
            Self::AnyLink => "any-link",
            Self::Checked => "checked",
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
        }
    }
}

impl ToCss for PseudoClass {
    fn to_css<W>(&self, dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        dest.write_char(':')?;
        dest.write_str(self.name())
    }
}

impl selectors::parser::NonTSPseudoClass for PseudoClass {
    type Impl = DomSelectors;

    fn is_active_or_hover(&self) -> bool {
        matches!(self, Self::Active | Self::Hover)
    }

    fn is_user_action_state(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::Hover | Self::Focus | Self::FocusVisible | Self::FocusWithin
        )
    }
}

/// `::before` / `::after`. Generated boxes are not document nodes, so rules
/// targeting them never apply to an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PseudoElement {
    Before,
    After,
}

impl ToCss for PseudoElement {
    fn to_css<W>(&self, dest: &mut W) -> std::fmt::Result
    where
        W: std::fmt::Write,
    {
        dest.write_str(match self {
            Self::Before => "::before",
            Self::After => "::after",
        })
    }
}

impl selectors::parser::PseudoElement for PseudoElement {
    type Impl = DomSelectors;
}

#[derive(Clone, Debug)]
pub enum DomSelectors {}

impl SelectorImpl for DomSelectors {
    type ExtraMatchingData<'a> = ();
    type AttrValue = CssAttrValue;
    type Identifier = CssIdent;
    type LocalName = CssIdent;
    type NamespaceUrl = CssIdent;
    type NamespacePrefix = CssIdent;
    type BorrowedNamespaceUrl = str;
    type BorrowedLocalName = str;
    type NonTSPseudoClass = PseudoClass;
    type PseudoElement = PseudoElement;
}

struct SelectorParser;

impl<'i> selectors::Parser<'i> for SelectorParser {
    type Impl = DomSelectors;
    type Error = SelectorParseErrorKind<'i>;

    fn parse_is_and_where(&self) -> bool {
        true
    }

    fn parse_non_ts_pseudo_class(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoClass, ParseError<'i, Self::Error>> {
        PseudoClass::from_name(&name).ok_or_else(|| {
            location.new_custom_error(SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name))
        })
    }

    fn parse_pseudo_element(
        &self,
        location: SourceLocation,
        name: CowRcStr<'i>,
    ) -> Result<PseudoElement, ParseError<'i, Self::Error>> {
        match name.to_ascii_lowercase().as_str() {
            "before" => Ok(PseudoElement::Before),
            "after" => Ok(PseudoElement::After),
            _ => Err(location.new_custom_error(
                SelectorParseErrorKind::UnsupportedPseudoClassOrElement(name),
            )),
        }
    }
}

/// An element node of a [`Document`], as seen by the selector engine.
#[derive(Clone, Debug)]
pub struct DomElement<'a> {
    node: NodeRef<'a, NodeData>,
    data: &'a ElementData,
}

impl<'a> DomElement<'a> {
    fn wrap(node: NodeRef<'a, NodeData>) -> Option<Self> {
        node.value().as_element().map(|data| Self { node, data })
    }

    /// `None` for unknown handles and non-element nodes.
    pub fn new(doc: &'a Document, node: NodeId) -> Option<Self> {
        doc.node_ref(node).and_then(Self::wrap)
    }

    fn is_form_control(&self) -> bool {
        matches!(
            self.data.tag.as_str(),
            "button" | "input" | "select" | "textarea" | "option" | "optgroup" | "fieldset"
        )
    }
}

impl Element for DomElement<'_> {
    type Impl = DomSelectors;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.data)
    }

    fn parent_element(&self) -> Option<Self> {
        self.node.parent().and_then(Self::wrap)
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.node.prev_siblings().find_map(Self::wrap)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.node.next_siblings().find_map(Self::wrap)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.node.children().find_map(Self::wrap)
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &str) -> bool {
        self.data.tag.eq_ignore_ascii_case(name)
    }

    fn has_namespace(&self, _ns: &str) -> bool {
        true
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.data.tag == other.data.tag
    }

    fn attr_matches(
        &self,
        _ns: &NamespaceConstraint<&CssIdent>,
        local_name: &CssIdent,
        operation: &AttrSelectorOperation<&CssAttrValue>,
    ) -> bool {
        self.data
            .attr(local_name.as_ref())
            .is_some_and(|value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &PseudoClass,
        _context: &mut MatchingContext<DomSelectors>,
    ) -> bool {
        match pc {
            PseudoClass::Link | PseudoClass::AnyLink => self.is_link(),
            PseudoClass::Checked => self.data.has_attr("checked") || self.data.has_attr("selected"),
            PseudoClass::Disabled => self.is_form_control() && self.data.has_attr("disabled"),
            PseudoClass::Enabled => self.is_form_control() && !self.data.has_attr("disabled"),
            _ => false,
        }
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<DomSelectors>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.data.tag.as_str(), "a" | "area" | "link") && self.data.has_attr("href")
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssIdent) -> Option<CssIdent> {
        None
    }

    fn is_part(&self, _name: &CssIdent) -> bool {
        false
    }

    fn has_id(&self, id: &CssIdent, case: CaseSensitivity) -> bool {
        self.data
            .id()
            .is_some_and(|value| case.eq(value.as_bytes(), id.0.as_bytes()))
    }

    fn has_class(&self, name: &CssIdent, case: CaseSensitivity) -> bool {
        self.data
            .classes()
            .any(|class| case.eq(class.as_bytes(), name.0.as_bytes()))
    }

    fn is_empty(&self) -> bool {
        !self.node.children().any(|child| match child.value() {
            NodeData::Element(_) => true,
            NodeData::Text(text) => !text.is_empty(),
            _ => false,
        })
    }

    fn is_root(&self) -> bool {
        self.node
            .parent()
            .is_some_and(|parent| matches!(parent.value(), NodeData::Document))
    }
}

/// Run `f` with a fresh matching context. One context is meant to cover one
/// style resolution so `:nth-child` lookups are cached across rules.
pub(crate) fn with_matching_context<R>(
    f: impl FnOnce(&mut MatchingContext<'_, DomSelectors>) -> R,
) -> R {
    let mut cache = NthIndexCache::default();
    let mut context = MatchingContext::new(
        MatchingMode::Normal,
        None,
        &mut cache,
        QuirksMode::NoQuirks,
        NeedsSelectorFlags::No,
        IgnoreNthChildForInvalidation::No,
    );
    f(&mut context)
}

/// The rightmost compound's `#id`, `.class` and tag, used to bucket rules.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SubjectKeys {
    pub(crate) id: Option<String>,
    pub(crate) class: Option<String>,
    pub(crate) tag: Option<String>,
}

pub(crate) fn subject_keys(selector: &Selector<DomSelectors>) -> SubjectKeys {
    let mut keys = SubjectKeys::default();
    for component in selector.iter() {
        match component {
            Component::ID(id) if keys.id.is_none() => keys.id = Some(id.0.clone()),
            Component::Class(class) if keys.class.is_none() => {
                keys.class = Some(class.0.clone())
            }
            Component::LocalName(name) => keys.tag = Some(name.lower_name.0.clone()),
            _ => {}
        }
    }
    keys
}

/// A parsed, comma-separated selector list. One invalid entry invalidates
/// the whole list, as in a browser.
#[derive(Debug, Clone)]
pub struct SelectorList(ServoSelectorList<DomSelectors>);

impl SelectorList {
    pub fn parse(input: &str) -> Option<Self> {
        let mut input = ParserInput::new(input);
        let mut parser = CssParser::new(&mut input);
        parser.parse_entirely(Self::parse_from).ok()
    }

    pub(crate) fn parse_from<'i>(
        input: &mut CssParser<'i, '_>,
    ) -> Result<Self, ParseError<'i, SelectorParseErrorKind<'i>>> {
        ServoSelectorList::parse(&SelectorParser, input, ParseRelative::No).map(Self)
    }

    /// Entries that can match an element; pseudo-element selectors are left out.
    pub(crate) fn into_element_selectors(self) -> impl Iterator<Item = Selector<DomSelectors>> {
        self.0
            .0
            .into_iter()
            .filter(|selector| !selector.has_pseudo_element())
    }

    /// Highest specificity among the entries matching `node`.
    pub fn match_specificity(&self, doc: &Document, node: NodeId) -> Option<u32> {
        let element = DomElement::new(doc, node)?;
        with_matching_context(|context| {
            self.0
                .0
                .iter()
                .filter(|&selector| matches_selector(selector, 0, None, &element, context))
                .map(Selector::specificity)
                .max()
        })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.match_specificity(doc, node).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(doc: &Document, id: &str) -> NodeId {
        doc.find_by_id(id).expect("element present")
    }

    fn list(selector: &str) -> SelectorList {
        SelectorList::parse(selector).expect("valid selector")
    }

    #[test]
    fn parses_the_selector_grammar() {
        assert!(SelectorList::parse("div.a#b[data-x]").is_some());
        assert!(SelectorList::parse("ul > li, .a .b").is_some());
        assert!(SelectorList::parse("*").is_some());
        assert!(SelectorList::parse("div *").is_some());
        assert!(SelectorList::parse(".a:hover").is_some());
        assert!(SelectorList::parse("a + b ~ c").is_some());
        assert!(SelectorList::parse(".card:not(.static):nth-child(2n+1)").is_some());
        assert!(SelectorList::parse(":is(.a, .b) > p::before").is_some());
        assert!(SelectorList::parse("").is_none());
        assert!(SelectorList::parse("> a").is_none());
        assert!(SelectorList::parse(".a >").is_none());
        assert!(SelectorList::parse(".a:bogus").is_none());
        // One invalid entry drops the whole list.
        assert!(SelectorList::parse(".a:bogus, .b").is_none());
    }

    #[test]
    fn specificity_orders_ids_classes_tags() {
        let doc = Document::parse_html(
            r#"<div id="a" class="a b c"><span id="s" class="a b c"></span></div>"#,
        );
        let a = node(&doc, "a");
        let s = node(&doc, "s");
        let id = list("#a").match_specificity(&doc, a);
        let classes = list(".a.b.c").match_specificity(&doc, a);
        let tags = list("div span").match_specificity(&doc, s);
        assert!(id > classes);
        assert!(classes > tags);
        assert!(tags.is_some());
    }

    #[test]
    fn matches_attribute_operators() {
        let doc = Document::parse_html(
            r#"<div id="d" data-state="open-wide" data-tags="a, b"></div>"#,
        );
        let d = node(&doc, "d");
        assert!(list("[data-state=open-wide]").matches(&doc, d));
        assert!(list("[data-state^='open']").matches(&doc, d));
        assert!(list("[data-state*=\"n-w\"]").matches(&doc, d));
        assert!(list("[data-state$=wide]").matches(&doc, d));
        assert!(!list("[data-state=closed]").matches(&doc, d));
        assert!(list("div[data-state]").matches(&doc, d));
        assert!(list("[data-tags=\"a, b\"]").matches(&doc, d));
    }

    #[test]
    fn structural_pseudo_classes_and_siblings() {
        let mut doc = Document::parse_html(
            r#"<ul id="list"><li id="one" class="card"></li><li id="two" class="card static"></li></ul>"#,
        );
        let list_node = node(&doc, "list");
        let mut third = ElementData::new("li");
        third.add_class("card");
        let three = doc.append_element(list_node, third).expect("list exists");

        let one = node(&doc, "one");
        let two = node(&doc, "two");
        assert!(list(".card:not(.static)").matches(&doc, one));
        assert!(!list(".card:not(.static)").matches(&doc, two));
        assert!(list(".card + .card").matches(&doc, two));
        assert!(!list(".card + .card").matches(&doc, one));
        assert!(list("#one ~ li").matches(&doc, three));
        assert!(list("li:nth-child(3)").matches(&doc, three));
        assert!(list("li:last-child").matches(&doc, three));
        assert!(list("li:first-child").matches(&doc, one));
        assert!(list(":where(ul) > :is(.static)").matches(&doc, two));
    }

    #[test]
    fn user_action_states_never_match() {
        let doc = Document::parse_html(
            r#"<a id="l" href="/x" class="c"></a><input id="i" disabled>"#,
        );
        let l = node(&doc, "l");
        assert!(!list(".c:hover").matches(&doc, l));
        assert!(!list(".c:focus").matches(&doc, l));
        assert!(list("a:link").matches(&doc, l));
        assert!(list("input:disabled").matches(&doc, node(&doc, "i")));
        assert!(!list(".c::before").matches(&doc, l));
    }

    #[test]
    fn subject_keys_use_rightmost_compound() {
        let selector = list("#outer .x > li.card#item")
            .into_element_selectors()
            .next()
            .expect("one selector");
        let keys = subject_keys(&selector);
        assert_eq!(keys.id.as_deref(), Some("item"));
        assert_eq!(keys.class.as_deref(), Some("card"));
        assert_eq!(keys.tag.as_deref(), Some("li"));
    }

    #[test]
    fn pseudo_element_entries_are_not_element_selectors() {
        let selectors: Vec<_> = list(".a, .a::after").into_element_selectors().collect();
        assert_eq!(selectors.len(), 1);
    }
}
