//! The completion coordinator.
//!
//! Binding a root claims it (writes the bound marker), collects the root and
//! its nested-marked descendants as participants, and for every participant
//! with active animations registers outstanding animation slots plus one
//! fallback timer. Each participant becomes done exactly once, either when
//! its last slot is consumed by a finished-signal or when its timer fires,
//! whichever happens first. When the last tracked participant of a root is
//! done the root is finalized: animating and bound markers are removed and
//! its [`Completion`] resolves.
//!
//! # Architecture
//!
//! ```text
//! Coordinator
//!   ├── roots         BindingId → RootState (remaining count, completion sender)
//!   ├── participants  ParticipantId → TrackedParticipant (slots, timer key)
//!   ├── by_node       NodeId → [ParticipantId]  (finished-signal routing)
//!   └── timers        (deadline, seq) → ParticipantId
//! ```
//!
//! The coordinator never owns the clock. Callers pass `now_ms` and drive
//! [`Coordinator::run_due_timers`] themselves.

use std::collections::HashMap;

use rune_config::{MarkerConfig, SettleConfig};
use rune_dom::{Document, NodeId};
use tracing::{debug, info, trace};

use crate::events::{DoneVia, EventQueue, SettleEvent};
use crate::finalizer::{Completion, Finalized, RootState};
use crate::markers::MarkerExt;
use crate::metadata::read_completion_unit;
use crate::registry::claim_participants;
use crate::style::AnimationStyleSource;
use crate::tracker::{
    BindingId, FallbackTimers, ParticipantId, PendingSlots, TrackedParticipant, fallback_deadline,
};

/// Knobs the coordinator needs from [`SettleConfig`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub markers: MarkerConfig,
    pub safety_margin_ms: u64,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from(&SettleConfig::default())
    }
}

impl From<&SettleConfig> for CoordinatorOptions {
    fn from(config: &SettleConfig) -> Self {
        Self {
            markers: config.markers.clone(),
            safety_margin_ms: config.timing.safety_margin_ms,
        }
    }
}

#[derive(Debug, Default)]
pub struct Coordinator {
    options: CoordinatorOptions,
    roots: HashMap<BindingId, RootState>,
    participants: HashMap<ParticipantId, TrackedParticipant>,
    by_node: HashMap<NodeId, Vec<ParticipantId>>,
    timers: FallbackTimers,
    events: EventQueue<SettleEvent>,
}

impl Coordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Bind `root` and start tracking its participants.
    ///
    /// Returns `None` when the root is not eligible: it lacks the animating
    /// marker, is already bound, or is not an element. Otherwise returns the
    /// root's completion, which is already resolved when nothing was
    /// animating.
    pub fn bind_root<S>(
        &mut self,
        document: &mut Document,
        styles: &S,
        root: NodeId,
        now_ms: u64,
    ) -> Option<Completion>
    where
        S: AnimationStyleSource + ?Sized,
    {
        let participants = claim_participants(document, root, &self.options.markers)?;
        let label = document.describe(root);
        let mut state = RootState::new(root, label.clone(), participants.len());

        for node in participants {
            let unit = read_completion_unit(styles, document, node);
            if unit.is_empty() {
                trace!(node = %document.describe(node), "participant has no active animations");
                continue;
            }
            let id = ParticipantId::new();
            let due_at = fallback_deadline(now_ms, unit.max_ms(), self.options.safety_margin_ms);
            let timer = self.timers.schedule(due_at, id);
            debug!(
                node = %document.describe(node),
                expected = unit.expected_count(),
                max_ms = unit.max_ms(),
                due_at,
                "tracking participant"
            );
            self.participants.insert(
                id,
                TrackedParticipant {
                    binding: state.binding,
                    root,
                    node,
                    label: document.describe(node),
                    slots: PendingSlots::from_unit(&unit),
                    timer,
                },
            );
            self.by_node.entry(node).or_default().push(id);
            state.tracked += 1;
            state.remaining += 1;
        }

        info!(
            root = %label,
            participants = state.participants,
            tracked = state.tracked,
            at_ms = now_ms,
            "root bound"
        );
        self.events.push(SettleEvent::RootBound {
            root,
            label,
            participants: state.participants,
            tracked: state.tracked,
            at_ms: now_ms,
        });

        let completion = state.completion.clone();
        if state.remaining == 0 {
            self.finalize(document, state, now_ms, true);
        } else {
            self.roots.insert(state.binding, state);
        }
        Some(completion)
    }

    /// Route a finished-signal. Only participants whose own element is the
    /// signal's target are affected; bubbled signals from other elements
    /// never count. Returns how many participants became done.
    pub fn handle_animation_end(
        &mut self,
        document: &mut Document,
        target: NodeId,
        animation_name: &str,
        now_ms: u64,
    ) -> usize {
        let Some(ids) = self.by_node.get(&target).cloned() else {
            trace!(animation = animation_name, "finished-signal for untracked element");
            return 0;
        };

        let mut done = 0;
        for id in ids {
            let complete = match self.participants.get_mut(&id) {
                Some(participant) => {
                    participant.slots.consume(animation_name) && participant.slots.is_complete()
                }
                None => false,
            };
            if complete && self.mark_done(document, id, DoneVia::Signal, now_ms) {
                done += 1;
            }
        }
        done
    }

    /// Fire every fallback timer due at or before `now_ms`. Returns how many
    /// participants became done.
    pub fn run_due_timers(&mut self, document: &mut Document, now_ms: u64) -> usize {
        let mut done = 0;
        while let Some(id) = self.timers.pop_due(now_ms) {
            if self.mark_done(document, id, DoneVia::Timeout, now_ms) {
                done += 1;
            }
        }
        done
    }

    /// Earliest pending fallback deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    /// Mark a participant done. A second call for the same participant is a
    /// no-op and returns false.
    fn mark_done(
        &mut self,
        document: &mut Document,
        id: ParticipantId,
        via: DoneVia,
        now_ms: u64,
    ) -> bool {
        let Some(participant) = self.participants.remove(&id) else {
            return false;
        };
        self.timers.cancel(participant.timer);
        if let Some(ids) = self.by_node.get_mut(&participant.node) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_node.remove(&participant.node);
            }
        }

        debug!(node = %participant.label, ?via, at_ms = now_ms, "participant done");
        self.events.push(SettleEvent::ParticipantDone {
            root: participant.root,
            node: participant.node,
            label: participant.label,
            via,
            at_ms: now_ms,
        });

        let finished = match self.roots.get_mut(&participant.binding) {
            Some(state) => {
                state.remaining = state.remaining.saturating_sub(1);
                state.remaining == 0
            }
            None => false,
        };
        if finished {
            if let Some(state) = self.roots.remove(&participant.binding) {
                self.finalize(document, state, now_ms, false);
            }
        }
        true
    }

    fn finalize(
        &mut self,
        document: &mut Document,
        state: RootState,
        now_ms: u64,
        fast_path: bool,
    ) -> Finalized {
        let outcome = state.finalize(document, &self.options.markers, now_ms, fast_path);
        self.events.push(SettleEvent::RootFinalized {
            root: outcome.root,
            label: outcome.label.clone(),
            fast_path,
            at_ms: now_ms,
        });
        outcome
    }

    /// Completion of a root that is bound and not yet finalized.
    pub fn completion(&self, root: NodeId) -> Option<Completion> {
        self.roots
            .values()
            .find(|state| state.root == root)
            .map(|state| state.completion.clone())
    }

    /// Roots bound but not yet finalized.
    pub fn pending_roots(&self) -> Vec<NodeId> {
        let mut states: Vec<_> = self.roots.values().collect();
        states.sort_by_key(|state| state.binding);
        states.into_iter().map(|state| state.root).collect()
    }

    /// Outstanding participant count for a pending root.
    pub fn remaining(&self, root: NodeId) -> Option<usize> {
        self.roots
            .values()
            .find(|state| state.root == root)
            .map(|state| state.remaining)
    }

    pub fn pending_participants(&self) -> usize {
        self.participants.len()
    }

    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_idle(&self) -> bool {
        self.roots.is_empty()
    }

    /// Whether `node` currently carries the bound marker.
    pub fn is_bound(&self, document: &Document, node: NodeId) -> bool {
        document.has_marker(node, &self.options.markers.bound)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SettleEvent> + '_ {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rune_dom::StyleSheet;

    fn setup(html: &str) -> (Document, StyleSheet, Coordinator) {
        let doc = Document::parse_html(html);
        let sheet = StyleSheet::from_document(&doc);
        (doc, sheet, Coordinator::default())
    }

    #[test]
    fn signals_finalize_after_last_participant() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<main id="root" class="is-animating" style="animation: fade 200ms">
                 <div id="b" class="animate-nested"
                      style="animation: a 100ms, b 300ms"></div>
               </main>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let b = doc.find_by_id("b").unwrap();

        let completion = coordinator.bind_root(&mut doc, &sheet, root, 0).unwrap();
        assert_eq!(coordinator.pending_participants(), 2);
        assert_eq!(coordinator.live_timers(), 2);
        assert_eq!(coordinator.next_deadline(), Some(250));
        assert!(coordinator.is_bound(&doc, root));

        assert_eq!(coordinator.handle_animation_end(&mut doc, b, "a", 100), 0);
        assert_eq!(coordinator.handle_animation_end(&mut doc, root, "fade", 200), 1);
        assert_eq!(coordinator.live_timers(), 1);
        assert!(doc.has_class(root, "is-animating"));
        assert_eq!(coordinator.remaining(root), Some(1));

        assert_eq!(coordinator.handle_animation_end(&mut doc, b, "b", 300), 1);
        assert!(!doc.has_class(root, "is-animating"));
        assert!(!coordinator.is_bound(&doc, root));
        assert_eq!(coordinator.live_timers(), 0);
        assert!(coordinator.is_idle());

        let outcome = completion.try_get().unwrap().unwrap();
        assert_eq!(outcome.at_ms, 300);
        assert_eq!(outcome.tracked, 2);
        assert!(!outcome.fast_path);
    }

    #[test]
    fn fallback_timers_cover_lost_signals() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<main id="root" class="is-animating" style="animation: fade 200ms">
                 <div id="b" class="animate-nested"
                      style="animation: a 100ms, b 300ms"></div>
               </main>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let completion = coordinator.bind_root(&mut doc, &sheet, root, 0).unwrap();

        assert_eq!(coordinator.run_due_timers(&mut doc, 249), 0);
        assert_eq!(coordinator.run_due_timers(&mut doc, 250), 1);
        assert!(!completion.is_finalized());
        assert_eq!(coordinator.run_due_timers(&mut doc, 350), 1);
        assert_eq!(completion.try_get().unwrap().unwrap().at_ms, 350);

        let vias: Vec<_> = coordinator
            .drain_events()
            .filter_map(|event| match event {
                SettleEvent::ParticipantDone { via, .. } => Some(via),
                _ => None,
            })
            .collect();
        assert_eq!(vias, vec![DoneVia::Timeout, DoneVia::Timeout]);
    }

    #[test]
    fn late_signals_after_timeout_are_ignored() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<div id="root" class="is-animating" style="animation: fade 100ms"></div>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let completion = coordinator.bind_root(&mut doc, &sheet, root, 0).unwrap();

        assert_eq!(coordinator.run_due_timers(&mut doc, 150), 1);
        assert!(completion.is_finalized());
        assert_eq!(coordinator.handle_animation_end(&mut doc, root, "fade", 160), 0);

        let finalized = coordinator
            .drain_events()
            .filter(|event| matches!(event, SettleEvent::RootFinalized { .. }))
            .count();
        assert_eq!(finalized, 1);
    }

    #[test]
    fn fast_path_when_nothing_animates() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<div id="root" class="is-animating">
                 <span class="animate-nested"></span>
               </div>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let completion = coordinator.bind_root(&mut doc, &sheet, root, 5).unwrap();

        let outcome = completion.try_get().unwrap().unwrap();
        assert!(outcome.fast_path);
        assert_eq!(outcome.at_ms, 5);
        assert_eq!(outcome.participants, 2);
        assert_eq!(outcome.tracked, 0);
        assert!(!doc.has_class(root, "is-animating"));
        assert_eq!(coordinator.live_timers(), 0);
    }

    #[test]
    fn bubbled_and_unexpected_signals_do_not_count() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<div id="root" class="is-animating" style="animation: fade 200ms">
                 <p id="child" style="animation: fade 50ms"></p>
               </div>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let child = doc.find_by_id("child").unwrap();
        let completion = coordinator.bind_root(&mut doc, &sheet, root, 0).unwrap();

        // The child is not marked nested, so its signal is not the root's.
        assert_eq!(coordinator.handle_animation_end(&mut doc, child, "fade", 50), 0);
        assert_eq!(coordinator.handle_animation_end(&mut doc, root, "slide", 60), 0);
        assert!(!completion.is_finalized());
        assert_eq!(coordinator.handle_animation_end(&mut doc, root, "fade", 200), 1);
        assert!(completion.is_finalized());
    }

    #[test]
    fn duplicate_signals_cannot_finish_early() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<div id="root" class="is-animating" style="animation: a 100ms, b 300ms"></div>"#,
        );
        let root = doc.find_by_id("root").unwrap();
        let completion = coordinator.bind_root(&mut doc, &sheet, root, 0).unwrap();

        coordinator.handle_animation_end(&mut doc, root, "a", 100);
        coordinator.handle_animation_end(&mut doc, root, "a", 100);
        assert!(!completion.is_finalized());
        coordinator.handle_animation_end(&mut doc, root, "b", 300);
        assert!(completion.is_finalized());
    }

    #[test]
    fn ineligible_roots_are_not_bound() {
        let (mut doc, sheet, mut coordinator) = setup(
            r#"<div id="plain"></div>
               <div id="root" class="is-animating" style="animation: fade 1s"></div>"#,
        );
        let plain = doc.find_by_id("plain").unwrap();
        let root = doc.find_by_id("root").unwrap();

        assert!(coordinator.bind_root(&mut doc, &sheet, plain, 0).is_none());
        assert!(coordinator.bind_root(&mut doc, &sheet, root, 0).is_some());
        assert!(coordinator.bind_root(&mut doc, &sheet, root, 10).is_none());
        assert_eq!(coordinator.pending_roots(), vec![root]);
        assert!(coordinator.completion(root).is_some());
    }
}
