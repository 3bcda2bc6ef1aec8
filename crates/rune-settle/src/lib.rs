//! Exactly-once completion coordination for concurrently started CSS
//! animations.
//!
//! A page marks an element (the *root*) with the animating marker while its
//! entrance animations play, and marks descendants whose own animations
//! must also finish with the nested marker. This crate finds those roots,
//! waits until every participant's animations have reported finished (or a
//! fallback timer derived from the longest `duration + delay` fires), and
//! then removes the root's markers exactly once.
//!
//! # Modules
//!
//! - [`coordinator`]: binding, signal routing, fallback timers, finalization
//! - [`scanner`]: finding roots on ready, on lifecycle events and on demand
//! - [`metadata`]: reading the active animation list of an element
//! - [`runtime`]: a headless page with simulated playback and a virtual clock

pub mod coordinator;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod markers;
pub mod metadata;
pub mod playback;
pub mod registry;
pub mod runtime;
pub mod scanner;
pub mod style;
pub mod tracker;

pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{Result, SettleError, StyleError};
pub use events::{DoneVia, EventQueue, PlaybackEvent, RuntimeEvent, SettleEvent};
pub use finalizer::{Completion, Finalized};
pub use markers::MarkerExt;
pub use metadata::{AnimationDescriptor, CompletionUnit, active_animations, read_completion_unit};
pub use playback::{PendingSignal, Playback};
pub use runtime::{Runtime, SettleHandle};
pub use scanner::{ReadyState, ScanPhase, ScanReport, ScanTrigger, Scanner, Scope};
pub use style::{AnimationStyleSource, StyleFn, style_fn};
pub use tracker::{BindingId, ParticipantId};

pub use rune_config::{Marker, MarkerConfig, SettleConfig};
pub use rune_dom::{ComputedAnimation, Document, NodeId, StyleSheet};
