//! Reading and writing class/attribute markers on elements.

use rune_config::Marker;
use rune_dom::{Document, DomError, NodeId};

/// Marker access for [`Document`].
pub trait MarkerExt {
    fn has_marker(&self, node: NodeId, marker: &Marker) -> bool;

    /// Apply the marker. Returns false when it was already present.
    fn set_marker(&mut self, node: NodeId, marker: &Marker) -> Result<bool, DomError>;

    /// Remove the marker. Returns false when it was absent.
    fn clear_marker(&mut self, node: NodeId, marker: &Marker) -> Result<bool, DomError>;
}

impl MarkerExt for Document {
    fn has_marker(&self, node: NodeId, marker: &Marker) -> bool {
        match marker {
            Marker::Class(name) => self.has_class(node, name),
            Marker::Attribute(name) => self.has_attr(node, name),
        }
    }

    fn set_marker(&mut self, node: NodeId, marker: &Marker) -> Result<bool, DomError> {
        match marker {
            Marker::Class(name) => self.add_class(node, name),
            Marker::Attribute(name) => Ok(self.set_attr(node, name, "")?.is_none()),
        }
    }

    fn clear_marker(&mut self, node: NodeId, marker: &Marker) -> Result<bool, DomError> {
        match marker {
            Marker::Class(name) => self.remove_class(node, name),
            Marker::Attribute(name) => Ok(self.remove_attr(node, name)?.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_and_attribute_markers() {
        let mut doc = Document::parse_html(r#"<div id="a" class="x"></div>"#);
        let a = doc.find_by_id("a").unwrap();
        let class = Marker::class("x");
        let attr = Marker::attribute("data-bound");

        assert!(doc.has_marker(a, &class));
        assert!(!doc.has_marker(a, &attr));

        assert!(doc.set_marker(a, &attr).unwrap());
        assert!(!doc.set_marker(a, &attr).unwrap());
        assert!(doc.has_marker(a, &attr));

        assert!(doc.clear_marker(a, &class).unwrap());
        assert!(!doc.clear_marker(a, &class).unwrap());
        assert!(doc.clear_marker(a, &attr).unwrap());
        assert!(!doc.has_marker(a, &attr));
    }
}
