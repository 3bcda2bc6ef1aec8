//! Minimal CSS cascade for the animation longhands.
//!
//! Only what the settle coordinator needs is resolved: `animation-name`,
//! `animation-duration`, `animation-delay`, `animation-iteration-count` and the
//! `animation` shorthand, plus the set of `@keyframes` names a page defines.
//! Style sheets are tokenized with `cssparser` and selectors are matched by
//! Servo's `selectors` engine against the [`Document`](crate::Document).

mod animation;
mod cascade;
mod selector;

pub use animation::{ComputedAnimation, parse_time_ms};
pub use cascade::StyleSheet;
pub use selector::{DomElement, SelectorList};
