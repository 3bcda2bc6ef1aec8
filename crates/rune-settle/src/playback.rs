//! Headless stand-in for the browser's animation playback.
//!
//! When an element's animations start, one finished-signal per animation is
//! queued for `start + max(delay + duration * iterations, 0)`. Animations
//! without a matching `@keyframes` rule, or that iterate forever, never
//! finish and queue nothing. Signals can be configured to be lost or
//! delivered twice so the fallback and slot-counting paths can be exercised.

use std::collections::{BTreeMap, HashSet};

use rune_config::PlaybackConfig;
use rune_dom::{Document, NodeId, parse_time_ms};
use tracing::{debug, trace};

use crate::events::PlaybackEvent;
use crate::style::AnimationStyleSource;

/// A finished-signal waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSignal {
    pub node: NodeId,
    pub animation_name: String,
    pub due_at: u64,
}

#[derive(Debug, Default)]
pub struct Playback {
    queue: BTreeMap<(u64, u64), PendingSignal>,
    next_seq: u64,
    dropped: HashSet<String>,
    duplicate: bool,
}

impl Playback {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self {
            dropped: config.drop_animations.iter().cloned().collect(),
            duplicate: config.duplicate_events,
            ..Self::default()
        }
    }

    /// Start the animations of `node` and all its element descendants.
    pub fn start_subtree<S>(
        &mut self,
        document: &Document,
        styles: &S,
        node: NodeId,
        now_ms: u64,
    ) -> Vec<PlaybackEvent>
    where
        S: AnimationStyleSource + ?Sized,
    {
        let mut events = Vec::new();
        if document.element(node).is_some() {
            events.extend(self.start_element(document, styles, node, now_ms));
        }
        for descendant in document.element_descendants(node) {
            events.extend(self.start_element(document, styles, descendant, now_ms));
        }
        events
    }

    /// (Re)start the animations of one element. Signals still pending for it
    /// from an earlier start are cancelled.
    pub fn start_element<S>(
        &mut self,
        document: &Document,
        styles: &S,
        node: NodeId,
        now_ms: u64,
    ) -> Vec<PlaybackEvent>
    where
        S: AnimationStyleSource + ?Sized,
    {
        self.cancel_node(node);
        let Ok(style) = styles.animation_style(document, node) else {
            return Vec::new();
        };

        let names = style.names();
        let durations = style.durations();
        let delays = style.delays();
        let counts = style.iteration_counts();
        let label = document.describe(node);
        let mut events = Vec::new();

        for (i, name) in names.into_iter().enumerate() {
            if name.is_empty() || name.eq_ignore_ascii_case("none") {
                continue;
            }
            if !styles.keyframes_defined(name) {
                trace!(node = %label, animation = name, "no @keyframes; animation does not run");
                continue;
            }
            let Some(iterations) = parse_iterations(counts.get(i).copied().unwrap_or("1")) else {
                trace!(node = %label, animation = name, "infinite animation never finishes");
                continue;
            };
            let duration = time_at(&durations, i).max(0.0);
            let delay = time_at(&delays, i);
            let active = (delay + duration * iterations).max(0.0);
            let due_at = now_ms.saturating_add(active.ceil() as u64);

            if self.dropped.contains(name) {
                debug!(node = %label, animation = name, "finished-signal will be lost");
                events.push(PlaybackEvent::Dropped {
                    node,
                    label: label.clone(),
                    animation_name: name.to_string(),
                    at_ms: now_ms,
                });
                continue;
            }

            let copies = if self.duplicate { 2 } else { 1 };
            for _ in 0..copies {
                self.push(node, name, due_at);
                events.push(PlaybackEvent::Scheduled {
                    node,
                    label: label.clone(),
                    animation_name: name.to_string(),
                    due_ms: due_at,
                });
            }
        }
        events
    }

    fn push(&mut self, node: NodeId, animation_name: &str, due_at: u64) {
        let key = (due_at, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(
            key,
            PendingSignal {
                node,
                animation_name: animation_name.to_string(),
                due_at,
            },
        );
    }

    /// Drop every pending signal for `node`. Returns how many were removed.
    pub fn cancel_node(&mut self, node: NodeId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|_, signal| signal.node != node);
        before - self.queue.len()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due_at, _)| *due_at)
    }

    /// Remove and return the earliest signal due at or before `now`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<PendingSignal> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > now_ms {
            return None;
        }
        self.queue.remove(&key)
    }

    /// Pending signals in delivery order.
    pub fn pending(&self) -> Vec<&PendingSignal> {
        self.queue.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

fn time_at(list: &[&str], i: usize) -> f64 {
    list.get(i)
        .and_then(|token| parse_time_ms(token))
        .unwrap_or(0.0)
}

/// `None` for `infinite`; unparseable or negative counts fall back to 1.
fn parse_iterations(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.eq_ignore_ascii_case("infinite") {
        return None;
    }
    match token.parse::<f64>() {
        Ok(count) if count.is_finite() && count >= 0.0 => Some(count),
        _ => Some(1.0),
    }
}
