//! Finds animating roots and hands them to the coordinator.
//!
//! A scan runs once when the page becomes ready, again on every lifecycle
//! event, and on demand for content inserted after load. Scanning is
//! idempotent: roots that are already bound are skipped by the coordinator's
//! bound guard.

use rune_dom::{Document, NodeId};
use tracing::{debug, info};

use crate::coordinator::Coordinator;
use crate::finalizer::Completion;
use crate::markers::MarkerExt;
use crate::style::AnimationStyleSource;

/// Where a scan looks for roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Every element in the document.
    #[default]
    Document,
    /// Descendants of the given node, the node itself excluded.
    Subtree(NodeId),
}

/// Document loading state, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    Loading,
    Interactive,
    Complete,
}

/// What started a scan. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    Ready,
    Lifecycle,
    OnDemand,
}

/// Observable scanner state. `Scanning` only holds for the duration of one
/// [`Scanner::scan`] call; overlapping scans cannot happen because a scan
/// needs `&mut Scanner`, and shared callers go through
/// [`SettleHandle`](crate::SettleHandle), which refuses re-entrant use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    #[default]
    Idle,
    Scanning,
}

/// Roots a scan found and which of them it newly bound.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Every element in scope carrying the animating marker.
    pub found: Vec<NodeId>,
    /// Roots bound by this scan, with their completions.
    pub bound: Vec<(NodeId, Completion)>,
}

impl ScanReport {
    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    /// Roots that were found but already bound.
    pub fn skipped(&self) -> usize {
        self.found.len() - self.bound.len()
    }

    pub fn completion(&self, root: NodeId) -> Option<&Completion> {
        self.bound
            .iter()
            .find(|(node, _)| *node == root)
            .map(|(_, completion)| completion)
    }
}

#[derive(Debug)]
pub struct Scanner {
    phase: ScanPhase,
    ready_scanned: bool,
    lifecycle_event: String,
    scans: u64,
}

impl Scanner {
    pub fn new(lifecycle_event: impl Into<String>) -> Self {
        Self {
            phase: ScanPhase::Idle,
            ready_scanned: false,
            lifecycle_event: lifecycle_event.into(),
            scans: 0,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Number of completed scans.
    pub fn scans(&self) -> u64 {
        self.scans
    }

    pub fn lifecycle_event(&self) -> &str {
        &self.lifecycle_event
    }

    /// Scan `scope` and bind every eligible root in document order. An
    /// unusable scope (unknown node, text node) is a no-op.
    pub fn scan<S>(
        &mut self,
        coordinator: &mut Coordinator,
        document: &mut Document,
        styles: &S,
        scope: Scope,
        trigger: ScanTrigger,
        now_ms: u64,
    ) -> ScanReport
    where
        S: AnimationStyleSource + ?Sized,
    {
        let marker = &coordinator.options().markers.animating;
        let Some(found) = candidate_roots(document, scope, marker) else {
            debug!(?scope, "scope cannot be queried; nothing to scan");
            return ScanReport::default();
        };

        self.phase = ScanPhase::Scanning;
        let mut report = ScanReport {
            found,
            bound: Vec::new(),
        };
        for &root in &report.found {
            if let Some(completion) = coordinator.bind_root(document, styles, root, now_ms) {
                report.bound.push((root, completion));
            }
        }
        self.phase = ScanPhase::Idle;
        self.scans += 1;

        info!(
            ?trigger,
            found = report.found.len(),
            bound = report.bound.len(),
            at_ms = now_ms,
            "scan finished"
        );
        report
    }

    /// Run the initial document scan the first time the page is at least
    /// interactive.
    pub fn on_ready_state<S>(
        &mut self,
        state: ReadyState,
        coordinator: &mut Coordinator,
        document: &mut Document,
        styles: &S,
        now_ms: u64,
    ) -> Option<ScanReport>
    where
        S: AnimationStyleSource + ?Sized,
    {
        if state < ReadyState::Interactive || self.ready_scanned {
            return None;
        }
        self.ready_scanned = true;
        Some(self.scan(
            coordinator,
            document,
            styles,
            Scope::Document,
            ScanTrigger::Ready,
            now_ms,
        ))
    }

    /// Rescan the whole document when `event` is the configured lifecycle
    /// event.
    pub fn on_lifecycle_event<S>(
        &mut self,
        event: &str,
        coordinator: &mut Coordinator,
        document: &mut Document,
        styles: &S,
        now_ms: u64,
    ) -> Option<ScanReport>
    where
        S: AnimationStyleSource + ?Sized,
    {
        if event != self.lifecycle_event {
            return None;
        }
        Some(self.scan(
            coordinator,
            document,
            styles,
            Scope::Document,
            ScanTrigger::Lifecycle,
            now_ms,
        ))
    }
}

/// Elements in `scope` carrying `marker`, in document order.
fn candidate_roots(
    document: &Document,
    scope: Scope,
    marker: &rune_config::Marker,
) -> Option<Vec<NodeId>> {
    let base = match scope {
        Scope::Document => document.root(),
        Scope::Subtree(node) => {
            if document.element(node).is_none() && node != document.root() {
                return None;
            }
            node
        }
    };
    Some(
        document
            .element_descendants(base)
            .filter(|&node| document.has_marker(node, marker))
            .collect(),
    )
}
