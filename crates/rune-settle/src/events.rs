//! Events emitted while coordinating and while simulating playback.
//!
//! The coordinator records what it did (roots bound, participants done,
//! roots finalized) and the headless playback records which finished-signals
//! it scheduled, delivered or dropped. Both end up in one ordered queue so a
//! run can be replayed as a timeline.
//!
//! ```ignore
//! for event in runtime.drain_events() {
//!     match event {
//!         RuntimeEvent::Settle(SettleEvent::RootFinalized { label, at_ms, .. }) => {
//!             println!("{label} settled at {at_ms}ms");
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Node handles are not serialized; every event carries a `label` built from
//! the element's tag, id and classes instead.

use rune_dom::NodeId;
use serde::Serialize;
use std::collections::VecDeque;

/// How a participant reached "done".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneVia {
    /// Every expected finished-signal arrived.
    Signal,
    /// The fallback timer fired first.
    Timeout,
}

/// Event emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettleEvent {
    /// A root was claimed and its participants registered.
    RootBound {
        #[serde(skip)]
        root: NodeId,
        label: String,
        /// Root plus nested descendants.
        participants: usize,
        /// Participants with at least one active animation.
        tracked: usize,
        at_ms: u64,
    },
    /// A tracked participant finished.
    ParticipantDone {
        #[serde(skip)]
        root: NodeId,
        #[serde(skip)]
        node: NodeId,
        label: String,
        via: DoneVia,
        at_ms: u64,
    },
    /// The root's markers were removed.
    RootFinalized {
        #[serde(skip)]
        root: NodeId,
        label: String,
        /// Finalized during binding because nothing was animating.
        fast_path: bool,
        at_ms: u64,
    },
}

impl SettleEvent {
    /// The root this event belongs to.
    pub fn root(&self) -> NodeId {
        match self {
            Self::RootBound { root, .. }
            | Self::ParticipantDone { root, .. }
            | Self::RootFinalized { root, .. } => *root,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::RootBound { label, .. }
            | Self::ParticipantDone { label, .. }
            | Self::RootFinalized { label, .. } => label,
        }
    }

    pub fn at_ms(&self) -> u64 {
        match self {
            Self::RootBound { at_ms, .. }
            | Self::ParticipantDone { at_ms, .. }
            | Self::RootFinalized { at_ms, .. } => *at_ms,
        }
    }
}

/// Event emitted by the simulated animation playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// A finished-signal was queued.
    Scheduled {
        #[serde(skip)]
        node: NodeId,
        label: String,
        animation_name: String,
        due_ms: u64,
    },
    /// A finished-signal was delivered.
    Ended {
        #[serde(skip)]
        node: NodeId,
        label: String,
        animation_name: String,
        at_ms: u64,
    },
    /// The animation ran but its finished-signal was configured to be lost.
    Dropped {
        #[serde(skip)]
        node: NodeId,
        label: String,
        animation_name: String,
        at_ms: u64,
    },
}

impl PlaybackEvent {
    pub fn node(&self) -> NodeId {
        match self {
            Self::Scheduled { node, .. } | Self::Ended { node, .. } | Self::Dropped { node, .. } => {
                *node
            }
        }
    }

    pub fn animation_name(&self) -> &str {
        match self {
            Self::Scheduled { animation_name, .. }
            | Self::Ended { animation_name, .. }
            | Self::Dropped { animation_name, .. } => animation_name,
        }
    }
}

/// Wrapper for everything a runtime reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Playback(PlaybackEvent),
    Settle(SettleEvent),
}

impl RuntimeEvent {
    /// True for a root finalization.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Settle(SettleEvent::RootFinalized { .. }))
    }

    /// True for a delivered finished-signal.
    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Playback(PlaybackEvent::Ended { .. }))
    }
}

impl From<PlaybackEvent> for RuntimeEvent {
    fn from(event: PlaybackEvent) -> Self {
        Self::Playback(event)
    }
}

impl From<SettleEvent> for RuntimeEvent {
    fn from(event: SettleEvent) -> Self {
        Self::Settle(event)
    }
}

/// FIFO of events collected between drains.
#[derive(Debug)]
pub struct EventQueue<E> {
    events: VecDeque<E>,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: impl Into<E>) {
        self.events.push_back(event.into());
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn pop(&mut self) -> Option<E> {
        self.events.pop_front()
    }

    /// Drain all events in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = E> + '_ {
        self.events.drain(..)
    }

    pub fn peek(&self) -> Option<&E> {
        self.events.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
