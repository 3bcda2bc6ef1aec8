//! Reads the set of active animations an element will run.
//!
//! An element's "completion unit" is the multiset of animation names it is
//! expected to finish, plus the longest `duration + delay` among them. Names of
//! `none`, empty names and zero durations are not real animations and are
//! filtered out. Any failure to read style degrades to the empty unit so a
//! participant never blocks on a style it could not read.

use rune_dom::{ComputedAnimation, Document, NodeId, parse_time_ms};
use serde::Serialize;
use tracing::warn;

use crate::style::AnimationStyleSource;

/// One entry of an element's animation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationDescriptor {
    pub name: String,
    pub duration_ms: f64,
    pub delay_ms: f64,
}

impl AnimationDescriptor {
    /// Time from start until the animation's first pass ends.
    pub fn end_ms(&self) -> f64 {
        self.duration_ms + self.delay_ms
    }
}

/// The animations an element is expected to finish.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionUnit {
    pub animations: Vec<AnimationDescriptor>,
}

impl CompletionUnit {
    /// Number of finished-signals needed to complete this unit.
    pub fn expected_count(&self) -> usize {
        self.animations.len()
    }

    /// Largest `duration + delay`, or 0 for an empty unit.
    pub fn max_ms(&self) -> f64 {
        self.animations
            .iter()
            .map(AnimationDescriptor::end_ms)
            .fold(0.0, f64::max)
    }

    /// True when there is nothing to wait for.
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.animations.iter().map(|a| a.name.as_str())
    }
}

/// Turn resolved longhands into descriptors. Entries pair up by position;
/// an unparseable duration or delay counts as 0.
pub fn active_animations(style: &ComputedAnimation) -> Vec<AnimationDescriptor> {
    let durations = style.durations();
    let delays = style.delays();
    let time_at = |list: &[&str], i: usize| {
        list.get(i)
            .and_then(|token| parse_time_ms(token))
            .unwrap_or(0.0)
    };

    style
        .names()
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            if name.is_empty() || name.eq_ignore_ascii_case("none") {
                return None;
            }
            let duration_ms = time_at(&durations, i);
            if duration_ms <= 0.0 {
                return None;
            }
            Some(AnimationDescriptor {
                name: name.to_string(),
                duration_ms,
                delay_ms: time_at(&delays, i),
            })
        })
        .collect()
}

/// Read the completion unit of `node`. Never fails.
pub fn read_completion_unit<S>(source: &S, document: &Document, node: NodeId) -> CompletionUnit
where
    S: AnimationStyleSource + ?Sized,
{
    match source.animation_style(document, node) {
        Ok(style) => CompletionUnit {
            animations: active_animations(&style),
        },
        Err(err) => {
            warn!(
                node = %document.describe(node),
                error = %err,
                "could not read animation style; treating element as not animating"
            );
            CompletionUnit::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StyleError;
    use crate::style::style_fn;

    fn descriptors(names: &str, durations: &str, delays: &str) -> Vec<AnimationDescriptor> {
        active_animations(&ComputedAnimation::new(names, durations, delays))
    }

    #[test]
    fn single_animation() {
        let list = descriptors("fade", "200ms", "0s");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "fade");
        assert_eq!(list[0].duration_ms, 200.0);
        assert_eq!(list[0].delay_ms, 0.0);
    }

    #[test]
    fn none_and_zero_durations_are_filtered() {
        assert!(descriptors("none", "1s", "0s").is_empty());
        assert!(descriptors("fade", "0s", "0s").is_empty());
        let list = descriptors("a, none, b", "0.1s, 1s, 0s", "0s");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "a");
        let list = descriptors("a, b", "0s, 250ms", "0s, 0s");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "b");
    }

    #[test]
    fn unparseable_times_count_as_zero() {
        assert!(descriptors("a", "soon", "0s").is_empty());
        let list = descriptors("a", "1s", "later");
        assert_eq!(list[0].delay_ms, 0.0);
    }

    #[test]
    fn missing_list_entries_count_as_zero() {
        let list = descriptors("a, b", "100ms", "50ms");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].delay_ms, 50.0);
    }

    #[test]
    fn max_covers_duration_plus_delay() {
        let unit = CompletionUnit {
            animations: descriptors("a, b", "100ms, 300ms", "150ms, 0s"),
        };
        assert_eq!(unit.expected_count(), 2);
        assert_eq!(unit.max_ms(), 300.0);

        let negative = CompletionUnit {
            animations: active_animations(&ComputedAnimation::new("a", "100ms", "-400ms")),
        };
        assert_eq!(negative.expected_count(), 1);
        assert_eq!(negative.max_ms(), 0.0);
        assert_eq!(CompletionUnit::default().max_ms(), 0.0);
    }

    #[test]
    fn repeated_names_stay_a_multiset() {
        let unit = CompletionUnit {
            animations: descriptors("pulse, pulse", "1s, 2s", "0s"),
        };
        assert_eq!(unit.names().collect::<Vec<_>>(), vec!["pulse", "pulse"]);
    }

    #[test]
    fn style_errors_fail_open() {
        let doc = Document::parse_html(r#"<div id="a"></div>"#);
        let a = doc.find_by_id("a").unwrap();
        let broken = style_fn(|_: &Document, _: NodeId| {
            Err::<ComputedAnimation, _>(StyleError::Unavailable("detached".into()))
        });
        assert!(read_completion_unit(&broken, &doc, a).is_empty());
    }
}
