//! Root finalization and the completion future handed to callers.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use rune_config::MarkerConfig;
use rune_dom::{Document, NodeId};
use tracing::{debug, info};

use crate::error::SettleError;
use crate::markers::MarkerExt;
use crate::tracker::BindingId;

/// Outcome of a finalized root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub root: NodeId,
    pub label: String,
    /// Virtual time the markers were removed at.
    pub at_ms: u64,
    /// Root plus nested descendants found at bind time.
    pub participants: usize,
    /// Participants that had at least one active animation.
    pub tracked: usize,
    /// Finalized during binding because nothing was animating.
    pub fast_path: bool,
}

/// Resolves once the root it was returned for has been finalized.
///
/// Cloneable; every clone observes the same outcome. Resolves to
/// [`SettleError::Abandoned`] if the coordinator is dropped first.
#[derive(Clone)]
pub struct Completion {
    inner: Shared<oneshot::Receiver<Finalized>>,
}

impl Completion {
    pub(crate) fn channel() -> (oneshot::Sender<Finalized>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { inner: rx.shared() })
    }

    /// Outcome without waiting, if there already is one.
    pub fn try_get(&self) -> Option<Result<Finalized, SettleError>> {
        self.clone().now_or_never()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.try_get(), Some(Ok(_)))
    }
}

impl Future for Completion {
    type Output = Result<Finalized, SettleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner
            .poll_unpin(cx)
            .map(|result| result.map_err(|_| SettleError::Abandoned))
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

/// Finalization state of one bound root.
#[derive(Debug)]
pub(crate) struct RootState {
    pub binding: BindingId,
    pub root: NodeId,
    pub label: String,
    pub participants: usize,
    pub tracked: usize,
    /// Tracked participants not yet done.
    pub remaining: usize,
    sender: Option<oneshot::Sender<Finalized>>,
    pub completion: Completion,
}

impl RootState {
    pub fn new(root: NodeId, label: String, participants: usize) -> Self {
        let (sender, completion) = Completion::channel();
        Self {
            binding: BindingId::new(),
            root,
            label,
            participants,
            tracked: 0,
            remaining: 0,
            sender: Some(sender),
            completion,
        }
    }

    /// Remove the root's markers and resolve its completion. Consumes the
    /// state, so a root can only be finalized once per binding.
    pub fn finalize(
        mut self,
        document: &mut Document,
        markers: &MarkerConfig,
        now_ms: u64,
        fast_path: bool,
    ) -> Finalized {
        for marker in [&markers.animating, &markers.bound] {
            if let Err(err) = document.clear_marker(self.root, marker) {
                debug!(root = %self.label, %marker, error = %err, "marker already gone");
            }
        }

        let outcome = Finalized {
            root: self.root,
            label: self.label.clone(),
            at_ms: now_ms,
            participants: self.participants,
            tracked: self.tracked,
            fast_path,
        };
        info!(
            root = %self.label,
            at_ms = now_ms,
            tracked = self.tracked,
            fast_path,
            "root finalized"
        );
        if let Some(sender) = self.sender.take() {
            // Nobody awaiting is fine.
            let _ = sender.send(outcome.clone());
        }
        outcome
    }
}
