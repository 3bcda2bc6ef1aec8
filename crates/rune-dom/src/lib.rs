//! Mutable DOM and animation style resolution for headless pages.
//!
//! HTML is parsed with `scraper` and copied into an owned `ego_tree` arena so
//! classes and attributes can change after parsing. The [`css`] module
//! resolves the CSS animation longhands for an element the way a browser's
//! computed style reports them.

pub mod css;
pub mod document;
pub mod error;

pub use css::{ComputedAnimation, SelectorList, StyleSheet, parse_time_ms};
pub use document::{Document, ElementData, NodeData};
pub use ego_tree::NodeId;
pub use error::{DomError, Result};
