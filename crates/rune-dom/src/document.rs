use ego_tree::{NodeId, NodeRef, Tree};
use scraper::{Html, Node};

use crate::error::{DomError, Result};

/// Payload stored for each node of a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// The document node at the root of the tree.
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

impl NodeData {
    pub fn as_element(&self) -> Option<&ElementData> {
        match self {
            Self::Element(el) => Some(el),
            _ => None,
        }
    }

    fn from_scraper(node: &Node) -> Option<Self> {
        match node {
            Node::Element(el) => Some(Self::Element(ElementData {
                tag: el.name().to_ascii_lowercase(),
                attrs: el
                    .attrs()
                    .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                    .collect(),
            })),
            Node::Text(text) => Some(Self::Text(String::from(&**text))),
            Node::Comment(comment) => Some(Self::Comment(String::from(&**comment))),
            _ => None,
        }
    }
}

/// An element's tag and attributes. `class` and `id` live in `attrs` like any
/// other attribute; class-list helpers split the `class` value on whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Set an attribute, replacing any previous value. Returns the old value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.attrs.push((name.to_ascii_lowercase(), value));
                None
            }
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(index).1)
    }

    /// Add a class. Returns false when it was already present.
    pub fn add_class(&mut self, class: &str) -> bool {
        if self.has_class(class) {
            return false;
        }
        let mut list: Vec<&str> = self.classes().collect();
        list.push(class);
        let joined = list.join(" ");
        self.set_attr("class", joined);
        true
    }

    /// Remove every occurrence of a class. Returns false when it was absent.
    pub fn remove_class(&mut self, class: &str) -> bool {
        if !self.has_class(class) {
            return false;
        }
        let joined = self
            .classes()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr("class", joined);
        true
    }
}

/// Owned, mutable DOM tree.
#[derive(Debug, Clone)]
pub struct Document {
    tree: Tree<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only the document node.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(NodeData::Document),
        }
    }

    /// Parse a complete HTML document.
    pub fn parse_html(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let mut document = Self::new();
        let root = document.root();
        copy_children(&mut document.tree, root, parsed.tree.root());
        document
    }

    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.tree
            .root()
            .children()
            .find(|child| child.value().as_element().is_some())
            .map(|child| child.id())
    }

    pub fn body(&self) -> Option<NodeId> {
        self.elements().find(|&id| self.tag(id) == Some("body"))
    }

    /// True when the handle refers to a node of this document, attached or not.
    pub fn contains(&self, node: NodeId) -> bool {
        self.tree.get(node).is_some()
    }

    /// True when the node is reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let Some(node_ref) = self.tree.get(node) else {
            return false;
        };
        let top = node_ref.ancestors().last().unwrap_or(node_ref);
        top.id() == self.root()
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.tree.get(node).map(|n| n.value())
    }

    pub(crate) fn node_ref(&self, node: NodeId) -> Option<NodeRef<'_, NodeData>> {
        self.tree.get(node)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.tree.get(node).and_then(|n| n.value().as_element())
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|el| el.attr(name))
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).is_some_and(|el| el.has_class(class))
    }

    /// Parent node, if attached to one.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.get(node)?.parent().map(|p| p.id())
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|&p| self.element(p).is_some())
    }

    /// Ancestors from the parent up to the root, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.tree
            .get(node)
            .into_iter()
            .flat_map(|n| n.ancestors())
            .map(|n| n.id())
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.tree
            .get(node)
            .into_iter()
            .flat_map(|n| n.children())
            .map(|n| n.id())
    }

    /// Descendants of `node` in document order, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.tree
            .get(node)
            .into_iter()
            .flat_map(|n| n.descendants().skip(1))
            .map(|n| n.id())
    }

    /// Element descendants of `node` in document order, excluding `node`.
    pub fn element_descendants(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(node)
            .filter(move |&id| self.element(id).is_some())
    }

    /// Every attached element in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.element_descendants(self.root())
    }

    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.elements()
            .find(|&node| self.element(node).and_then(|el| el.id()) == Some(id))
    }

    pub fn elements_with_class<'a>(&'a self, class: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.elements()
            .filter(move |&node| self.has_class(node, class))
    }

    /// Concatenated text of every text node under `node`.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .filter_map(|id| match self.data(id) {
                Some(NodeData::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of every attached `<style>` element, in document order.
    pub fn style_sources(&self) -> Vec<String> {
        self.style_sources_under(self.root())
    }

    /// Text of the `<style>` elements at or below `node`, in document order.
    pub fn style_sources_under(&self, node: NodeId) -> Vec<String> {
        std::iter::once(node)
            .chain(self.descendants(node))
            .filter(|&id| self.tag(id) == Some("style"))
            .map(|id| self.text_content(id))
            .collect()
    }

    /// Short `tag#id.class` label used in logs and events.
    pub fn describe(&self, node: NodeId) -> String {
        match self.data(node) {
            Some(NodeData::Element(el)) => {
                let mut label = el.tag.clone();
                if let Some(id) = el.id() {
                    label.push('#');
                    label.push_str(id);
                }
                for class in el.classes() {
                    label.push('.');
                    label.push_str(class);
                }
                label
            }
            Some(NodeData::Document) => "#document".to_string(),
            Some(NodeData::Text(_)) => "#text".to_string(),
            Some(NodeData::Comment(_)) => "#comment".to_string(),
            None => "#unknown".to_string(),
        }
    }

    fn with_element_mut<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut ElementData) -> R,
    ) -> Result<R> {
        let mut node_mut = self.tree.get_mut(node).ok_or(DomError::UnknownNode)?;
        match node_mut.value() {
            NodeData::Element(el) => Ok(f(el)),
            _ => Err(DomError::NotAnElement),
        }
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<bool> {
        self.with_element_mut(node, |el| el.add_class(class))
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<bool> {
        self.with_element_mut(node, |el| el.remove_class(class))
    }

    pub fn set_attr(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        self.with_element_mut(node, |el| el.set_attr(name, value))
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<Option<String>> {
        self.with_element_mut(node, |el| el.remove_attr(name))
    }

    /// Append a new, empty element under `parent`.
    pub fn append_element(&mut self, parent: NodeId, element: ElementData) -> Result<NodeId> {
        let mut parent_mut = self.tree.get_mut(parent).ok_or(DomError::UnknownNode)?;
        Ok(parent_mut.append(NodeData::Element(element)).id())
    }

    /// Remove a node (and its subtree) from its parent. The handle stays valid
    /// but the node is no longer attached.
    pub fn detach(&mut self, node: NodeId) -> Result<()> {
        if node == self.root() {
            return Err(DomError::NotAnElement);
        }
        let mut node_mut = self.tree.get_mut(node).ok_or(DomError::UnknownNode)?;
        node_mut.detach();
        Ok(())
    }

    /// Parse `html` as a fragment and append its top-level nodes to `parent`.
    /// Returns the inserted top-level node handles in order.
    pub fn insert_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        match self.data(parent) {
            Some(NodeData::Element(_)) | Some(NodeData::Document) => {}
            Some(_) => return Err(DomError::NotAnElement),
            None => return Err(DomError::UnknownNode),
        }
        let fragment = Html::parse_fragment(html);
        let fragment_root = fragment.tree.root();
        // html5ever wraps fragment content in a synthetic <html> element.
        let container = fragment_root
            .children()
            .find(|child| matches!(child.value(), Node::Element(el) if el.name() == "html"))
            .unwrap_or(fragment_root);
        let inserted = copy_children(&mut self.tree, parent, container);
        tracing::debug!(
            parent = %self.describe(parent),
            count = inserted.len(),
            "inserted html fragment"
        );
        Ok(inserted)
    }
}

/// Copy the children of a scraper node under `parent`, depth first.
/// Returns the handles of the directly inserted children.
fn copy_children(tree: &mut Tree<NodeData>, parent: NodeId, source: NodeRef<'_, Node>) -> Vec<NodeId> {
    let mut inserted = Vec::new();
    for child in source.children() {
        let Some(data) = NodeData::from_scraper(child.value()) else {
            continue;
        };
        let Some(mut parent_mut) = tree.get_mut(parent) else {
            break;
        };
        let id = parent_mut.append(data).id();
        inserted.push(id);
        copy_children(tree, id, child);
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head><style>.a { color: red; }</style></head>
            <body>
                <section id="hero" class="card is-animating">
                    <h1 class="title">Hello</h1>
                    <p class="title animate-nested">World</p>
                </section>
                <!-- footer -->
            </body>
        </html>
    "#;

    #[test]
    fn parses_elements_in_document_order() {
        let doc = Document::parse_html(PAGE);
        let tags: Vec<_> = doc.elements().filter_map(|id| doc.tag(id)).collect();
        assert_eq!(tags, vec!["html", "head", "style", "body", "section", "h1", "p"]);
        assert!(doc.body().is_some());
        assert_eq!(doc.tag(doc.document_element().unwrap()), Some("html"));
    }

    #[test]
    fn class_list_mutation() {
        let mut doc = Document::parse_html(PAGE);
        let hero = doc.find_by_id("hero").unwrap();
        assert!(doc.has_class(hero, "is-animating"));

        assert!(doc.remove_class(hero, "is-animating").unwrap());
        assert!(!doc.remove_class(hero, "is-animating").unwrap());
        assert_eq!(doc.attr(hero, "class"), Some("card"));

        assert!(doc.add_class(hero, "done").unwrap());
        assert!(!doc.add_class(hero, "done").unwrap());
        assert_eq!(doc.describe(hero), "section#hero.card.done");
    }

    #[test]
    fn attribute_mutation() {
        let mut doc = Document::parse_html(PAGE);
        let hero = doc.find_by_id("hero").unwrap();
        assert_eq!(doc.set_attr(hero, "data-bound", "").unwrap(), None);
        assert!(doc.has_attr(hero, "data-bound"));
        assert_eq!(doc.remove_attr(hero, "data-bound").unwrap(), Some(String::new()));
        assert!(!doc.has_attr(hero, "data-bound"));
    }

    #[test]
    fn mutation_of_text_node_is_rejected() {
        let mut doc = Document::parse_html(PAGE);
        let hero = doc.find_by_id("hero").unwrap();
        let text = doc
            .descendants(hero)
            .find(|&id| matches!(doc.data(id), Some(NodeData::Text(_))))
            .unwrap();
        assert_eq!(doc.add_class(text, "x"), Err(DomError::NotAnElement));
    }

    #[test]
    fn descendants_exclude_self() {
        let doc = Document::parse_html(PAGE);
        let hero = doc.find_by_id("hero").unwrap();
        let inner: Vec<_> = doc
            .element_descendants(hero)
            .filter_map(|id| doc.tag(id))
            .collect();
        assert_eq!(inner, vec!["h1", "p"]);
        assert_eq!(doc.elements_with_class("title").count(), 2);
    }

    #[test]
    fn detach_and_attachment() {
        let mut doc = Document::parse_html(PAGE);
        let hero = doc.find_by_id("hero").unwrap();
        let h1 = doc.element_descendants(hero).next().unwrap();
        assert!(doc.is_attached(h1));
        doc.detach(hero).unwrap();
        assert!(doc.contains(h1));
        assert!(!doc.is_attached(h1));
        assert!(doc.find_by_id("hero").is_none());
    }

    #[test]
    fn insert_fragment_appends_top_level_nodes() {
        let mut doc = Document::parse_html(PAGE);
        let body = doc.body().unwrap();
        let inserted = doc
            .insert_html(body, r#"<div class="is-animating"><span>a</span></div><p>b</p>"#)
            .unwrap();
        assert_eq!(inserted.len(), 2);
        assert_eq!(doc.tag(inserted[0]), Some("div"));
        assert_eq!(doc.tag(inserted[1]), Some("p"));
        assert_eq!(doc.parent(inserted[0]), Some(body));
        assert_eq!(doc.text_content(inserted[0]), "a");
    }

    #[test]
    fn style_sources_collects_style_text() {
        let doc = Document::parse_html(PAGE);
        assert_eq!(doc.style_sources(), vec![".a { color: red; }".to_string()]);
    }
}
