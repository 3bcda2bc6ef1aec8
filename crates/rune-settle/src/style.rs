//! The style capability the coordinator reads animations through.

use rune_dom::{ComputedAnimation, Document, NodeId, StyleSheet};

use crate::error::StyleError;

/// "Given an element, return its animation longhands."
///
/// Keeps the coordination logic independent of a rendering engine: the
/// headless runtime resolves styles from the page's `<style>` elements, tests
/// can hand in synthetic values through [`style_fn`].
pub trait AnimationStyleSource {
    /// Resolved `animation-name`, `-duration`, `-delay` and
    /// `-iteration-count` lists for `node`.
    fn animation_style(
        &self,
        document: &Document,
        node: NodeId,
    ) -> Result<ComputedAnimation, StyleError>;

    /// Whether an animation with this name would actually run. Used only by
    /// the simulated playback; the coordinator trusts the computed style.
    fn keyframes_defined(&self, _name: &str) -> bool {
        true
    }

    /// Take in style sheet text that arrived with inserted content. Sources
    /// not backed by a style sheet ignore it.
    fn add_style_source(&mut self, _css: &str) {}
}

impl AnimationStyleSource for StyleSheet {
    fn animation_style(
        &self,
        document: &Document,
        node: NodeId,
    ) -> Result<ComputedAnimation, StyleError> {
        Ok(self.compute_animation(document, node)?)
    }

    fn keyframes_defined(&self, name: &str) -> bool {
        self.has_keyframes(name)
    }

    fn add_style_source(&mut self, css: &str) {
        self.add_source(css);
    }
}

/// Style source backed by a closure.
pub struct StyleFn<F>(F);

/// Wrap a closure as an [`AnimationStyleSource`].
pub fn style_fn<F>(f: F) -> StyleFn<F>
where
    F: Fn(&Document, NodeId) -> Result<ComputedAnimation, StyleError>,
{
    StyleFn(f)
}

impl<F> AnimationStyleSource for StyleFn<F>
where
    F: Fn(&Document, NodeId) -> Result<ComputedAnimation, StyleError>,
{
    fn animation_style(
        &self,
        document: &Document,
        node: NodeId,
    ) -> Result<ComputedAnimation, StyleError> {
        (self.0)(document, node)
    }
}

impl<F> std::fmt::Debug for StyleFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StyleFn")
    }
}
