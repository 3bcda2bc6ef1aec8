//! Headless page runtime: a document, its styles, simulated animation
//! playback and the coordinator, driven by a virtual millisecond clock.
//!
//! Nothing happens until the clock is advanced. Pending work is a single
//! ordered task list made of playback finished-signals and coordinator
//! fallback timers; at equal instants signals run before timers.
//!
//! ```ignore
//! let mut runtime = Runtime::from_html(html, &SettleConfig::default());
//! runtime.set_ready_state(ReadyState::Interactive);
//! runtime.install();
//! runtime.run_until_idle()?;
//! for event in runtime.drain_events() {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rune_config::SettleConfig;
use rune_dom::{ComputedAnimation, Document, NodeId, StyleSheet};
use tracing::{debug, trace, warn};

use crate::coordinator::{Coordinator, CoordinatorOptions};
use crate::error::{Result, SettleError};
use crate::events::{EventQueue, PlaybackEvent, RuntimeEvent};
use crate::finalizer::Completion;
use crate::playback::Playback;
use crate::scanner::{ReadyState, ScanReport, ScanTrigger, Scanner, Scope};
use crate::style::AnimationStyleSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Signal,
    Timer,
}

pub struct Runtime<S = StyleSheet> {
    document: Document,
    styles: S,
    coordinator: Coordinator,
    scanner: Scanner,
    playback: Playback,
    ready_state: ReadyState,
    installed: bool,
    now_ms: u64,
    step_limit: usize,
    events: EventQueue<RuntimeEvent>,
}

impl Runtime<StyleSheet> {
    /// Parse `html` and resolve styles from its `<style>` elements.
    pub fn from_html(html: &str, config: &SettleConfig) -> Self {
        let document = Document::parse_html(html);
        let styles = StyleSheet::from_document(&document);
        Self::new(document, styles, config)
    }
}

impl<S: AnimationStyleSource> Runtime<S> {
    /// Build a runtime at time 0 with the document still loading. Every
    /// element's animations start immediately.
    pub fn new(document: Document, styles: S, config: &SettleConfig) -> Self {
        let mut runtime = Self {
            document,
            styles,
            coordinator: Coordinator::new(CoordinatorOptions::from(config)),
            scanner: Scanner::new(config.lifecycle.event.clone()),
            playback: Playback::new(&config.playback),
            ready_state: ReadyState::Loading,
            installed: false,
            now_ms: 0,
            step_limit: config.timing.step_limit,
            events: EventQueue::new(),
        };
        let root = runtime.document.root();
        runtime.start_playback(root);
        runtime
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn styles(&self) -> &S {
        &self.styles
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Completion of a bound, not yet finalized root.
    pub fn completion(&self, root: NodeId) -> Option<Completion> {
        self.coordinator.completion(root)
    }

    /// Attach the scanner to the page. Scans right away when the document is
    /// past loading, otherwise on the first ready-state change that is.
    /// Installing twice does nothing.
    pub fn install(&mut self) -> Option<ScanReport> {
        if self.installed {
            debug!("already installed");
            return None;
        }
        self.installed = true;
        self.notify_ready_state()
    }

    pub fn set_ready_state(&mut self, state: ReadyState) -> Option<ScanReport> {
        self.ready_state = state;
        self.notify_ready_state()
    }

    fn notify_ready_state(&mut self) -> Option<ScanReport> {
        if !self.installed {
            return None;
        }
        let report = self.scanner.on_ready_state(
            self.ready_state,
            &mut self.coordinator,
            &mut self.document,
            &self.styles,
            self.now_ms,
        );
        self.collect_settle_events();
        report
    }

    /// Fire a named lifecycle event. The configured one triggers a full
    /// rescan when installed.
    pub fn dispatch_lifecycle(&mut self, event: &str) -> Option<ScanReport> {
        if !self.installed {
            trace!(event, "lifecycle event before install");
            return None;
        }
        let report = self.scanner.on_lifecycle_event(
            event,
            &mut self.coordinator,
            &mut self.document,
            &self.styles,
            self.now_ms,
        );
        self.collect_settle_events();
        report
    }

    /// On-demand scan, used after inserting content.
    pub fn scan(&mut self, scope: Scope) -> ScanReport {
        let report = self.scanner.scan(
            &mut self.coordinator,
            &mut self.document,
            &self.styles,
            scope,
            ScanTrigger::OnDemand,
            self.now_ms,
        );
        self.collect_settle_events();
        report
    }

    /// Parse `html` and append it under `parent`. Inserted elements start
    /// their animations at the current time. `<style>` elements in the
    /// fragment join the page styles, and existing elements whose animation
    /// style changes because of them restart.
    pub fn insert_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        let inserted = self.document.insert_html(parent, html)?;
        let sheets: Vec<String> = inserted
            .iter()
            .flat_map(|&node| self.document.style_sources_under(node))
            .collect();
        if !sheets.is_empty() {
            let fresh: HashSet<NodeId> = inserted
                .iter()
                .flat_map(|&node| std::iter::once(node).chain(self.document.descendants(node)))
                .collect();
            let before: Vec<_> = self
                .subtree_styles(self.document.root())
                .into_iter()
                .filter(|(element, _)| !fresh.contains(element))
                .collect();
            for css in &sheets {
                self.styles.add_style_source(css);
            }
            debug!(sheets = sheets.len(), "inserted content brought style sheets");
            self.restart_changed(before);
        }
        for &node in &inserted {
            self.start_playback(node);
        }
        Ok(inserted)
    }

    /// Add a class, restarting animations of every element in the subtree
    /// whose animation style changed.
    pub fn add_class(&mut self, node: NodeId, class: &str) -> Result<bool> {
        self.restyle(node, |document| document.add_class(node, class))
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) -> Result<bool> {
        self.restyle(node, |document| document.remove_class(node, class))
    }

    fn restyle(
        &mut self,
        node: NodeId,
        mutate: impl FnOnce(&mut Document) -> rune_dom::Result<bool>,
    ) -> Result<bool> {
        let before = self.subtree_styles(node);
        if !mutate(&mut self.document)? {
            return Ok(false);
        }
        self.restart_changed(before);
        Ok(true)
    }

    /// Restart every element whose animation style differs from `before`.
    fn restart_changed(&mut self, before: Vec<(NodeId, Option<ComputedAnimation>)>) {
        for (element, old) in before {
            let new = self.styles.animation_style(&self.document, element).ok();
            if new != old {
                let events = self.playback.start_element(
                    &self.document,
                    &self.styles,
                    element,
                    self.now_ms,
                );
                self.record_playback(events);
            }
        }
    }

    fn subtree_styles(&self, node: NodeId) -> Vec<(NodeId, Option<ComputedAnimation>)> {
        std::iter::once(node)
            .filter(|&n| self.document.element(n).is_some())
            .chain(self.document.element_descendants(node))
            .map(|n| (n, self.styles.animation_style(&self.document, n).ok()))
            .collect()
    }

    /// Deliver a finished-signal by hand, bypassing playback.
    pub fn dispatch_animation_end(&mut self, target: NodeId, animation_name: &str) -> usize {
        self.deliver_signal(target, animation_name)
    }

    /// Due time of the next pending task.
    pub fn next_task_due(&self) -> Option<u64> {
        self.next_task().map(|(due_at, _)| due_at)
    }

    /// Advance the clock by `delta_ms`, running every task due on the way.
    pub fn advance(&mut self, delta_ms: u64) -> Result<usize> {
        self.advance_to(self.now_ms.saturating_add(delta_ms))
    }

    /// Run every task due at or before `target_ms` in order, then leave the
    /// clock at `target_ms`. Returns the number of tasks run.
    pub fn advance_to(&mut self, target_ms: u64) -> Result<usize> {
        if target_ms < self.now_ms {
            return Err(SettleError::ClockBackwards {
                now: self.now_ms,
                target: target_ms,
            });
        }
        let steps = self.run_tasks(Some(target_ms))?;
        self.now_ms = target_ms;
        Ok(steps)
    }

    /// Run tasks until none are left. The clock ends at the last task.
    pub fn run_until_idle(&mut self) -> Result<usize> {
        self.run_tasks(None)
    }

    fn run_tasks(&mut self, until: Option<u64>) -> Result<usize> {
        let mut steps = 0;
        while let Some((due_at, task)) = self.next_task() {
            if until.is_some_and(|limit| due_at > limit) {
                break;
            }
            steps += 1;
            if steps > self.step_limit {
                warn!(limit = self.step_limit, now_ms = self.now_ms, "step limit exceeded");
                return Err(SettleError::StepLimit {
                    limit: self.step_limit,
                    now: self.now_ms,
                });
            }
            self.now_ms = self.now_ms.max(due_at);
            self.run_task(task);
        }
        Ok(steps)
    }

    fn next_task(&self) -> Option<(u64, Task)> {
        match (self.playback.next_due(), self.coordinator.next_deadline()) {
            (Some(signal), Some(timer)) if timer < signal => Some((timer, Task::Timer)),
            (Some(signal), _) => Some((signal, Task::Signal)),
            (None, Some(timer)) => Some((timer, Task::Timer)),
            (None, None) => None,
        }
    }

    fn run_task(&mut self, task: Task) {
        match task {
            Task::Signal => {
                if let Some(signal) = self.playback.pop_due(self.now_ms) {
                    self.deliver_signal(signal.node, &signal.animation_name);
                }
            }
            Task::Timer => {
                self.coordinator.run_due_timers(&mut self.document, self.now_ms);
                self.collect_settle_events();
            }
        }
    }

    fn deliver_signal(&mut self, target: NodeId, animation_name: &str) -> usize {
        self.events.push(PlaybackEvent::Ended {
            node: target,
            label: self.document.describe(target),
            animation_name: animation_name.to_string(),
            at_ms: self.now_ms,
        });
        let done = self.coordinator.handle_animation_end(
            &mut self.document,
            target,
            animation_name,
            self.now_ms,
        );
        self.collect_settle_events();
        done
    }

    fn start_playback(&mut self, node: NodeId) {
        let events = self
            .playback
            .start_subtree(&self.document, &self.styles, node, self.now_ms);
        self.record_playback(events);
    }

    fn record_playback(&mut self, events: Vec<PlaybackEvent>) {
        for event in events {
            self.events.push(event);
        }
    }

    fn collect_settle_events(&mut self) {
        for event in self.coordinator.drain_events() {
            self.events.push(event);
        }
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<RuntimeEvent> {
        self.events.drain().collect()
    }

    pub fn into_handle(self) -> SettleHandle<S> {
        SettleHandle::new(self)
    }
}

/// Shared handle to one runtime. Clone it into anything that inserts
/// content and needs to request a rescan afterwards.
pub struct SettleHandle<S = StyleSheet> {
    inner: Rc<RefCell<Runtime<S>>>,
}

impl<S> Clone for SettleHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: AnimationStyleSource> SettleHandle<S> {
    pub fn new(runtime: Runtime<S>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(runtime)),
        }
    }

    /// Rescan `scope`, or the whole document when `None`. A call made while
    /// the runtime is already borrowed, for example from inside [`with`],
    /// is ignored with a warning.
    ///
    /// [`with`]: SettleHandle::with
    pub fn scan(&self, scope: Option<Scope>) -> ScanReport {
        match self.inner.try_borrow_mut() {
            Ok(mut runtime) => runtime.scan(scope.unwrap_or_default()),
            Err(_) => {
                warn!("scan requested while the runtime is busy; ignoring");
                ScanReport::default()
            }
        }
    }

    /// Run `f` against the runtime. Returns `None` on re-entrant use.
    pub fn with<R>(&self, f: impl FnOnce(&mut Runtime<S>) -> R) -> Option<R> {
        match self.inner.try_borrow_mut() {
            Ok(mut runtime) => Some(f(&mut runtime)),
            Err(_) => {
                warn!("runtime is busy");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <style>
          @keyframes fade { from { opacity: 0 } to { opacity: 1 } }
          .is-animating { animation: fade 200ms }
        </style>
        <main id="root" class="is-animating"></main>"#;

    #[test]
    fn install_waits_for_ready() {
        let mut runtime = Runtime::from_html(PAGE, &SettleConfig::default());
        assert!(runtime.install().is_none());
        assert!(runtime.install().is_none());
        let report = runtime.set_ready_state(ReadyState::Interactive).unwrap();
        assert_eq!(report.bound_count(), 1);
        assert!(runtime.set_ready_state(ReadyState::Complete).is_none());
    }

    #[test]
    fn clock_cannot_go_backwards() {
        let mut runtime = Runtime::from_html(PAGE, &SettleConfig::default());
        runtime.advance_to(100).unwrap();
        assert_eq!(
            runtime.advance_to(50),
            Err(SettleError::ClockBackwards { now: 100, target: 50 })
        );
    }

    #[test]
    fn signals_run_before_timers_at_the_same_instant() {
        let mut config = SettleConfig::default();
        config.timing.safety_margin_ms = 0;
        let mut runtime = Runtime::from_html(PAGE, &config);
        runtime.set_ready_state(ReadyState::Interactive);
        runtime.install().unwrap();
        let root = runtime.document().find_by_id("root").unwrap();
        let completion = runtime.completion(root).unwrap();

        assert_eq!(runtime.next_task_due(), Some(200));
        runtime.run_until_idle().unwrap();
        assert_eq!(runtime.now_ms(), 200);
        assert!(completion.is_finalized());

        let done: Vec<_> = runtime
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                RuntimeEvent::Settle(crate::SettleEvent::ParticipantDone { via, .. }) => Some(via),
                _ => None,
            })
            .collect();
        assert_eq!(done, vec![crate::DoneVia::Signal]);
    }

    #[test]
    fn step_limit_is_enforced() {
        let mut config = SettleConfig::default();
        config.timing.step_limit = 1;
        config.playback.duplicate_events = true;
        let mut runtime = Runtime::from_html(PAGE, &config);
        assert!(matches!(
            runtime.run_until_idle(),
            Err(SettleError::StepLimit { limit: 1, .. })
        ));
    }

    #[test]
    fn inserted_style_sheets_join_the_page_styles() {
        let mut config = SettleConfig::default();
        config.timing.safety_margin_ms = 0;
        let mut runtime = Runtime::from_html(PAGE, &config);
        let root = runtime.document().find_by_id("root").unwrap();
        runtime.advance_to(10).unwrap();

        let inserted = runtime
            .insert_html(
                root,
                r#"<style>
                    @keyframes pop { to { opacity: 0 } }
                    .pop { animation: pop 60ms }
                </style>
                <div id="late" class="is-animating pop"></div>"#,
            )
            .unwrap();
        assert!(!inserted.is_empty());
        assert!(runtime.styles().has_keyframes("pop"));

        let late = runtime.document().find_by_id("late").unwrap();
        let report = runtime.scan(Scope::Subtree(root));
        let completion = report.completion(late).unwrap().clone();

        runtime.advance_to(69).unwrap();
        assert!(!completion.is_finalized());
        runtime.advance_to(70).unwrap();
        let finalized = completion.try_get().unwrap().unwrap();
        assert_eq!(finalized.at_ms, 70);
        assert!(!finalized.fast_path);
    }

    #[test]
    fn reentrant_scan_is_ignored() {
        let handle = Runtime::from_html(PAGE, &SettleConfig::default()).into_handle();
        let inner = handle.clone();
        let nested = handle.with(|_| inner.scan(None)).unwrap();
        assert!(nested.found.is_empty());
        assert_eq!(handle.scan(None).bound_count(), 1);
    }
}
