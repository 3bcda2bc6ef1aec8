//! Claims roots and collects their participants.

use rune_config::MarkerConfig;
use rune_dom::{Document, NodeId};
use tracing::{debug, trace};

use crate::markers::MarkerExt;

/// Claim `root` for coordination and list its participants: the root itself
/// followed by every descendant carrying the nested marker, in document
/// order.
///
/// Returns `None` without touching the document when `root` is not an
/// element, lacks the animating marker, or is already bound.
pub fn claim_participants(
    document: &mut Document,
    root: NodeId,
    markers: &MarkerConfig,
) -> Option<Vec<NodeId>> {
    if document.element(root).is_none() || !document.has_marker(root, &markers.animating) {
        trace!(root = %document.describe(root), "not an animating root");
        return None;
    }
    if document.has_marker(root, &markers.bound) {
        trace!(root = %document.describe(root), "root already bound");
        return None;
    }
    if let Err(err) = document.set_marker(root, &markers.bound) {
        debug!(error = %err, "could not mark root as bound");
        return None;
    }

    let mut participants = vec![root];
    participants.extend(
        document
            .element_descendants(root)
            .filter(|&node| document.has_marker(node, &markers.nested)),
    );
    Some(participants)
}
