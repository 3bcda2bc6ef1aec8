//! Per-participant bookkeeping: outstanding animation slots and fallback
//! timers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use rune_dom::NodeId;

use crate::metadata::CompletionUnit;

/// Identifies one binding of a root. A root that is re-marked and scanned
/// again after finalizing gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u64);

impl BindingId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one tracked participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outstanding finished-signals, counted per animation name.
///
/// A signal consumes one slot of its name; names that were never expected,
/// or whose slots are used up, are ignored. Duplicated signals therefore can
/// never complete a participant early.
#[derive(Debug, Clone, Default)]
pub struct PendingSlots {
    outstanding: HashMap<String, usize>,
    remaining: usize,
}

impl PendingSlots {
    pub fn from_unit(unit: &CompletionUnit) -> Self {
        let mut slots = Self::default();
        for name in unit.names() {
            *slots.outstanding.entry(name.to_string()).or_default() += 1;
            slots.remaining += 1;
        }
        slots
    }

    /// Consume one slot for `name`. Returns whether a slot was consumed.
    pub fn consume(&mut self, name: &str) -> bool {
        match self.outstanding.get_mut(name) {
            Some(count) if *count > 0 => {
                *count -= 1;
                self.remaining -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Ordering key of a fallback timer: deadline first, then scheduling order.
pub type TimerKey = (u64, u64);

/// Fallback timers for all tracked participants, kept in deadline order.
#[derive(Debug, Default)]
pub struct FallbackTimers {
    queue: BTreeMap<TimerKey, ParticipantId>,
    next_seq: u64,
}

impl FallbackTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_at: u64, participant: ParticipantId) -> TimerKey {
        let key = (due_at, self.next_seq);
        self.next_seq += 1;
        self.queue.insert(key, participant);
        key
    }

    /// Cancel a pending timer. Returns false if it already fired.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        self.queue.remove(&key).is_some()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due_at, _)| *due_at)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<ParticipantId> {
        let (&key, _) = self.queue.iter().next()?;
        if key.0 > now {
            return None;
        }
        self.queue.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A participant with at least one active animation.
#[derive(Debug)]
pub struct TrackedParticipant {
    pub binding: BindingId,
    pub root: NodeId,
    pub node: NodeId,
    pub label: String,
    pub slots: PendingSlots,
    pub timer: TimerKey,
}

/// Fallback deadline: the longest `duration + delay` rounded up, plus the
/// safety margin.
pub fn fallback_deadline(now_ms: u64, max_ms: f64, safety_margin_ms: u64) -> u64 {
    let wait = if max_ms.is_finite() && max_ms > 0.0 {
        max_ms.ceil() as u64
    } else {
        0
    };
    now_ms.saturating_add(wait).saturating_add(safety_margin_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AnimationDescriptor;

    fn unit(names: &[&str]) -> CompletionUnit {
        CompletionUnit {
            animations: names
                .iter()
                .map(|name| AnimationDescriptor {
                    name: name.to_string(),
                    duration_ms: 100.0,
                    delay_ms: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn slots_count_by_name() {
        let mut slots = PendingSlots::from_unit(&unit(&["fade", "slide"]));
        assert_eq!(slots.remaining(), 2);
        assert!(!slots.consume("spin"));
        assert!(slots.consume("fade"));
        assert!(!slots.consume("fade"));
        assert_eq!(slots.remaining(), 1);
        assert!(slots.consume("slide"));
        assert!(slots.is_complete());
    }

    #[test]
    fn repeated_names_need_repeated_signals() {
        let mut slots = PendingSlots::from_unit(&unit(&["pulse", "pulse"]));
        assert!(slots.consume("pulse"));
        assert!(!slots.is_complete());
        assert!(slots.consume("pulse"));
        assert!(slots.is_complete());
        assert!(!slots.consume("pulse"));
    }

    #[test]
    fn timers_pop_in_deadline_order() {
        let mut timers = FallbackTimers::new();
        let a = ParticipantId(1);
        let b = ParticipantId(2);
        let c = ParticipantId(3);
        timers.schedule(350, a);
        let key_b = timers.schedule(250, b);
        timers.schedule(250, c);

        assert_eq!(timers.next_due(), Some(250));
        assert_eq!(timers.pop_due(100), None);
        assert!(timers.cancel(key_b));
        assert!(!timers.cancel(key_b));
        assert_eq!(timers.pop_due(300), Some(c));
        assert_eq!(timers.pop_due(300), None);
        assert_eq!(timers.pop_due(350), Some(a));
        assert!(timers.is_empty());
    }

    #[test]
    fn deadline_adds_margin_to_rounded_max() {
        assert_eq!(fallback_deadline(0, 300.0, 50), 350);
        assert_eq!(fallback_deadline(10, 199.2, 50), 260);
        assert_eq!(fallback_deadline(5, 0.0, 50), 55);
        assert_eq!(fallback_deadline(5, f64::NAN, 0), 5);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(BindingId::new(), BindingId::new());
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }
}
