//! Reactive component instances
//!
//! A [`Reactive`] owns the state of one component instance and decides when
//! it renders. The whole protocol is one entry point, [`Reactive::set_state`]:
//!
//! 1. resolve the proposed changes and their effects to a fixpoint
//! 2. if nothing changed, stop: no new snapshot, no changelog entry, no render
//! 3. publish the new immutable snapshot
//! 4. latch the raise-change-events flag for the next render
//! 5. merge the changed keys into the changelog
//! 6. if a render is already queued, join it; otherwise, if the instance is
//!    active, queue one microtask that renders
//!
//! Because the render waits one microtask, every `set_state` call made in the
//! same synchronous turn lands in the same render:
//!
//! ```rust
//! use kite_core::{changes, MicrotaskQueue, Reactive, RenderContext};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let queue = MicrotaskQueue::new();
//! let renders = Rc::new(Cell::new(0));
//! let counter = renders.clone();
//!
//! let reactive = Reactive::builder(queue.clone())
//!     .render(move |_: &RenderContext<'_>| {
//!         counter.set(counter.get() + 1);
//!         Ok(())
//!     })
//!     .active(true)
//!     .build();
//! queue.run_until_idle();
//! assert_eq!(renders.get(), 1);
//!
//! let _ = reactive.set_state(changes! { "a" => 1 });
//! let _ = reactive.set_state(changes! { "b" => 2 });
//! queue.run_until_idle();
//! assert_eq!(renders.get(), 2);
//! ```
//!
//! Everything here is single-threaded: handles are `Rc`-based and `!Send`.
//! Snapshots themselves are `Send + Sync`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::builder::ReactiveBuilder;
use crate::completion::{RenderCompletion, RenderStatus, Waiter};
use crate::config::ReactiveConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::effects::{resolve, EffectsChain};
use crate::error::Result;
use crate::lifecycle::{Lifecycle, LifecycleFlags, RenderContext};
use crate::microtask::MicrotaskScheduler;
use crate::state::{ChangedFields, Changes, Snapshot};

pub(crate) struct ReactiveParts {
    pub(crate) config: ReactiveConfig,
    pub(crate) effects: EffectsChain,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) scheduler: Rc<dyn MicrotaskScheduler>,
    pub(crate) diagnostics: Rc<dyn DiagnosticSink>,
    pub(crate) active: bool,
}

struct ReactiveInner {
    config: ReactiveConfig,
    effects: EffectsChain,
    lifecycle: Lifecycle,
    scheduler: Rc<dyn MicrotaskScheduler>,
    diagnostics: Rc<dyn DiagnosticSink>,

    /// Current published snapshot
    state: RefCell<Snapshot>,
    /// Set by the first `set_state` call
    initialized: Cell<bool>,
    /// Keys changed since the last render
    changelog: RefCell<ChangedFields>,
    flags: LifecycleFlags,
    active: Cell<bool>,
    /// A render microtask is queued and has not run yet
    render_scheduled: Cell<bool>,
    /// Completions waiting for the next render
    waiters: RefCell<Vec<Waiter>>,
}

/// Handle to one reactive component instance
///
/// Cloning gives another strong handle to the same instance.
#[derive(Clone)]
pub struct Reactive {
    inner: Rc<ReactiveInner>,
}

/// Non-owning handle; see [`Reactive::downgrade`]
#[derive(Clone)]
pub struct WeakReactive {
    inner: Weak<ReactiveInner>,
}

impl WeakReactive {
    pub fn upgrade(&self) -> Option<Reactive> {
        self.inner.upgrade().map(|inner| Reactive { inner })
    }
}

impl Reactive {
    /// Start assembling an instance that renders through `scheduler`
    pub fn builder(scheduler: impl MicrotaskScheduler + 'static) -> ReactiveBuilder {
        ReactiveBuilder::new(scheduler)
    }

    pub(crate) fn from_parts(parts: ReactiveParts) -> Self {
        Self {
            inner: Rc::new(ReactiveInner {
                config: parts.config,
                effects: parts.effects,
                lifecycle: parts.lifecycle,
                scheduler: parts.scheduler,
                diagnostics: parts.diagnostics,
                state: RefCell::new(Snapshot::default()),
                initialized: Cell::new(false),
                changelog: RefCell::new(ChangedFields::new()),
                flags: LifecycleFlags::default(),
                active: Cell::new(parts.active),
                render_scheduled: Cell::new(false),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakReactive {
        WeakReactive {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same instance
    pub fn ptr_eq(a: &Reactive, b: &Reactive) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// The current immutable snapshot
    pub fn state(&self) -> Snapshot {
        self.inner.state.borrow().clone()
    }

    /// Keys changed since the last render, not yet rendered
    pub fn pending_changes(&self) -> ChangedFields {
        self.inner.changelog.borrow().clone()
    }

    /// Apply `changes` and their effects, then schedule a render
    ///
    /// The returned completion resolves once the render showing this change
    /// has run, immediately with [`RenderStatus::Unchanged`] when the call
    /// changed nothing, and immediately with [`RenderStatus::Deferred`] when
    /// the instance is inactive.
    pub fn set_state(&self, changes: impl Into<Changes>) -> RenderCompletion {
        let inner = &self.inner;
        let changes = changes.into();

        if inner.flags.rendering.get() && inner.config.warn_on_render_mutation {
            inner.diagnostics.report(&Diagnostic::MutationDuringRender {
                keys: changes.iter().map(|(key, _)| key.clone()).collect(),
            });
        }

        let current = self.state();
        let resolution = resolve(
            &current,
            changes,
            &inner.effects,
            &inner.config,
            inner.diagnostics.as_ref(),
        );

        let first_call = !inner.initialized.replace(true);
        if !first_call && resolution.is_unchanged() {
            tracing::trace!("set_state changed nothing");
            return RenderCompletion::ready(Ok(RenderStatus::Unchanged));
        }

        *inner.state.borrow_mut() = resolution.state;

        if inner.flags.raise_change_events.get() {
            inner.flags.raise_in_next_render.set(true);
        }

        inner.changelog.borrow_mut().extend(&resolution.changed);

        if inner.render_scheduled.get() {
            tracing::trace!(changed = ?resolution.changed, "joining scheduled render");
            return self.wait_for_render();
        }

        if !inner.active.get() {
            tracing::trace!(changed = ?resolution.changed, "inactive, render deferred");
            return RenderCompletion::ready(Ok(RenderStatus::Deferred));
        }

        self.schedule_render();
        self.wait_for_render()
    }

    // =========================================================================
    // ACTIVITY
    // =========================================================================

    /// Whether the instance is attached to its host and may render
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Attach or detach the instance
    ///
    /// Activating an instance that has never rendered, or has unrendered
    /// changes, queues a render. Mutations made in the same turn join it.
    pub fn set_active(&self, active: bool) {
        let inner = &self.inner;
        let was_active = inner.active.replace(active);
        if !active || was_active {
            return;
        }

        let never_rendered = inner.flags.first_render.get() != Some(false);
        let has_changes = !inner.changelog.borrow().is_empty();
        if (never_rendered || has_changes) && !inner.render_scheduled.get() {
            self.schedule_render();
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// `None` before the first render, `Some(true)` during it, then `Some(false)`
    pub fn first_render(&self) -> Option<bool> {
        self.inner.flags.first_render.get()
    }

    /// True while the render phase runs
    pub fn is_rendering(&self) -> bool {
        self.inner.flags.rendering.get()
    }

    /// True if a render microtask is queued and has not run yet
    pub fn is_render_scheduled(&self) -> bool {
        self.inner.render_scheduled.get()
    }

    /// Render pending changes now, synchronously
    ///
    /// This is the body of every scheduled render; hosts may also call it to
    /// paint immediately (for instance when attaching). Completions waiting
    /// for a render are settled by whichever render runs first.
    pub fn render_changes(&self) -> Result<RenderStatus> {
        self.render_and_settle().0
    }

    fn schedule_render(&self) {
        let inner = &self.inner;
        inner.render_scheduled.set(true);

        let weak = Rc::downgrade(&self.inner);
        inner.scheduler.queue_microtask(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Reactive { inner }.run_scheduled_render();
            }
        }));
        tracing::trace!("render scheduled");
    }

    fn wait_for_render(&self) -> RenderCompletion {
        let (completion, waiter) = RenderCompletion::waiting();
        self.inner.waiters.borrow_mut().push(waiter);
        completion
    }

    /// Microtask body
    fn run_scheduled_render(&self) {
        let inner = &self.inner;
        inner.render_scheduled.set(false);

        let (outcome, delivered) =
            if inner.config.recheck_active_at_render && !inner.active.get() {
                tracing::debug!("instance deactivated before its render ran");
                let waiters = self.take_waiters();
                settle(waiters, Ok(RenderStatus::Deferred))
            } else {
                self.render_and_settle()
            };

        if let Err(error) = outcome {
            if delivered == 0 {
                inner
                    .diagnostics
                    .report(&Diagnostic::UnhandledRenderError { error });
            }
        }
    }

    fn render_and_settle(&self) -> (Result<RenderStatus>, usize) {
        // Waiters registered by mutations inside this render belong to the next one.
        let waiters = self.take_waiters();
        let outcome = self.run_lifecycle();
        settle(waiters, outcome)
    }

    fn run_lifecycle(&self) -> Result<RenderStatus> {
        let inner = &self.inner;
        let flags = &inner.flags;

        if flags.first_render.get().is_none() {
            flags.first_render.set(Some(true));
        }
        let first_render = flags.first_render.get() == Some(true);

        let changed = inner.changelog.borrow_mut().take();
        if !first_render && changed.is_empty() {
            return Ok(RenderStatus::Unchanged);
        }

        let _finished = flags.finish_render();
        let _events = flags.expose_latched_events();
        tracing::debug!(
            first_render,
            raise_change_events = flags.raise_change_events.get(),
            ?changed,
            "rendering"
        );

        {
            let _rendering = flags.enter_render();
            inner.lifecycle.render(&RenderContext::new(self, &changed))?;
        }
        inner.lifecycle.rendered(&RenderContext::new(self, &changed))?;

        Ok(RenderStatus::Rendered)
    }

    fn take_waiters(&self) -> Vec<Waiter> {
        std::mem::take(&mut *self.inner.waiters.borrow_mut())
    }

    // =========================================================================
    // CHANGE EVENTS
    // =========================================================================

    /// Whether changes made now count as user-originated
    pub fn raise_change_events(&self) -> bool {
        self.inner.flags.raise_change_events.get()
    }

    /// Set the user-interaction flag directly
    ///
    /// Prefer [`Reactive::with_change_events`], which restores the flag.
    pub fn set_raise_change_events(&self, raise: bool) {
        self.inner.flags.raise_change_events.set(raise);
    }

    /// Run `f` with the user-interaction flag set, restoring it afterwards
    ///
    /// Event handlers wrap their state changes in this so the resulting
    /// render's rendered phase knows to raise change notifications.
    pub fn with_change_events<R>(&self, f: impl FnOnce() -> R) -> R {
        let _raise = self.inner.flags.raise_events(true);
        f()
    }
}

/// Send `outcome` to every live waiter; returns how many received it
fn settle(waiters: Vec<Waiter>, outcome: Result<RenderStatus>) -> (Result<RenderStatus>, usize) {
    let delivered = waiters
        .into_iter()
        .filter_map(|waiter| waiter.send(outcome.clone()).ok())
        .count();
    (outcome, delivered)
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        f.debug_struct("Reactive")
            .field("state", &*inner.state.borrow())
            .field("pending", &*inner.changelog.borrow())
            .field("active", &inner.active.get())
            .field("render_scheduled", &inner.render_scheduled.get())
            .field("flags", &inner.flags)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes;
    use crate::diagnostics::RecordingSink;
    use crate::error::RenderError;
    use crate::microtask::MicrotaskQueue;
    use crate::state::StateKey;
    use crate::value::Value;
    use futures::executor::LocalPool;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// One observed render: first-render flag, raise flag, changed keys
    #[derive(Debug, Clone, PartialEq)]
    struct Observed {
        first_render: bool,
        raise: bool,
        changed: Vec<String>,
    }

    #[derive(Default)]
    struct Recorder {
        renders: RefCell<Vec<Observed>>,
        rendered: RefCell<Vec<Observed>>,
    }

    impl Recorder {
        fn observe(ctx: &RenderContext<'_>) -> Observed {
            Observed {
                first_render: ctx.first_render(),
                raise: ctx.raise_change_events(),
                changed: ctx.changed().iter().map(|k| k.to_string()).collect(),
            }
        }

        fn render_count(&self) -> usize {
            self.renders.borrow().len()
        }

        fn last_render(&self) -> Option<Observed> {
            self.renders.borrow().last().cloned()
        }

        fn last_rendered(&self) -> Option<Observed> {
            self.rendered.borrow().last().cloned()
        }
    }

    /// Render callback that records into `recorder`
    fn record_render(
        recorder: &Rc<Recorder>,
    ) -> impl Fn(&RenderContext<'_>) -> anyhow::Result<()> + 'static {
        let recorder = recorder.clone();
        move |ctx: &RenderContext<'_>| {
            assert!(ctx.is_rendering());
            recorder.renders.borrow_mut().push(Recorder::observe(ctx));
            Ok(())
        }
    }

    fn record_rendered(
        recorder: &Rc<Recorder>,
    ) -> impl Fn(&RenderContext<'_>) -> anyhow::Result<()> + 'static {
        let recorder = recorder.clone();
        move |ctx: &RenderContext<'_>| {
            assert!(!ctx.is_rendering());
            recorder.rendered.borrow_mut().push(Recorder::observe(ctx));
            Ok(())
        }
    }

    fn recorded(queue: &MicrotaskQueue, defaults: Changes) -> (Reactive, Rc<Recorder>) {
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .default_state(defaults)
            .render(record_render(&recorder))
            .rendered(record_rendered(&recorder))
            .active(true)
            .build();
        (reactive, recorder)
    }

    fn status(completion: &mut RenderCompletion) -> Option<RenderStatus> {
        completion.try_take().and_then(|result| result.ok())
    }

    #[test]
    fn test_first_render_sequencing() {
        init_tracing();
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, changes! { "a" => 1 });

        assert_eq!(reactive.first_render(), None);
        assert_eq!(recorder.render_count(), 0);

        queue.run_until_idle();

        assert_eq!(reactive.first_render(), Some(false));
        assert_eq!(
            recorder.last_render(),
            Some(Observed {
                first_render: true,
                raise: false,
                changed: vec!["a".to_owned()],
            })
        );
        assert_eq!(recorder.last_rendered().map(|o| o.first_render), Some(true));

        let _ = reactive.set_state(changes! { "a" => 2 });
        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 2);
        assert_eq!(recorder.last_render().map(|o| o.first_render), Some(false));
    }

    #[test]
    fn test_first_render_with_no_default_state() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());

        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 1);
        assert!(recorder.last_render().is_some_and(|o| o.changed.is_empty()));
        assert_eq!(reactive.first_render(), Some(false));
    }

    #[test]
    fn test_no_op_set_state_is_idempotent() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, changes! { "a" => 1 });
        queue.run_until_idle();

        let before = reactive.state();
        let mut completion = reactive.set_state(changes! { "a" => 1 });

        assert!(completion.is_ready());
        assert_eq!(status(&mut completion), Some(RenderStatus::Unchanged));
        assert!(Snapshot::ptr_eq(&before, &reactive.state()));
        assert!(reactive.pending_changes().is_empty());
        assert!(!reactive.is_render_scheduled());
        assert!(queue.is_empty());
        assert_eq!(recorder.render_count(), 1);
    }

    #[test]
    fn test_mutations_in_one_turn_batch_into_one_render() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        let mut first = reactive.set_state(changes! { "a" => 1 });
        let mut second = reactive.set_state(changes! { "b" => 2 });
        assert_eq!(queue.len(), 1);

        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 2);
        assert_eq!(
            recorder.last_render().map(|o| o.changed),
            Some(vec!["a".to_owned(), "b".to_owned()])
        );
        assert_eq!(status(&mut first), Some(RenderStatus::Rendered));
        assert_eq!(status(&mut second), Some(RenderStatus::Rendered));
    }

    #[test]
    fn test_effects_fixpoint_rendered_as_one_batch() {
        let queue = MicrotaskQueue::new();
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .effects(|state: &Snapshot, changed: &ChangedFields| {
                let mut effects = Changes::new();
                if changed.contains("a") {
                    effects.set("b", state.value("a").as_int().unwrap_or(0) + 1);
                }
                if changed.contains("b") {
                    effects.set("c", state.value("b").as_int().unwrap_or(0) + 1);
                }
                effects
            })
            .render(record_render(&recorder))
            .active(true)
            .build();
        queue.run_until_idle();

        let _ = reactive.set_state(changes! { "a" => 1 });
        queue.run_until_idle();

        let state = reactive.state();
        assert_eq!(state.value("b"), &Value::from(2));
        assert_eq!(state.value("c"), &Value::from(3));
        assert_eq!(recorder.render_count(), 2);
        assert_eq!(
            recorder.last_render().map(|o| o.changed),
            Some(vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
        );
    }

    #[test]
    fn test_published_snapshots_never_change() {
        let queue = MicrotaskQueue::new();
        let (reactive, _recorder) = recorded(&queue, changes! { "a" => 1 });
        let old = reactive.state();

        let _ = reactive.set_state(changes! { "a" => 2, "b" => true });
        queue.run_until_idle();

        assert_eq!(old.value("a"), &Value::from(1));
        assert!(!old.contains_key("b"));
        assert_eq!(reactive.state().value("a"), &Value::from(2));
    }

    #[test]
    fn test_change_events_only_for_user_batches() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, changes! { "value" => 0 });
        queue.run_until_idle();

        reactive.with_change_events(|| {
            let _ = reactive.set_state(changes! { "value" => 1 });
        });
        assert!(!reactive.raise_change_events());
        queue.run_until_idle();
        assert_eq!(recorder.last_rendered().map(|o| o.raise), Some(true));

        let _ = reactive.set_state(changes! { "value" => 2 });
        queue.run_until_idle();
        assert_eq!(recorder.last_rendered().map(|o| o.raise), Some(false));
        assert!(!reactive.raise_change_events());
    }

    #[test]
    fn test_user_change_latches_for_whole_batch() {
        // A programmatic change joining a user batch still renders with events.
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        reactive.with_change_events(|| {
            let _ = reactive.set_state(changes! { "a" => 1 });
        });
        let _ = reactive.set_state(changes! { "b" => 1 });
        queue.run_until_idle();

        assert_eq!(recorder.last_render().map(|o| o.raise), Some(true));
    }

    #[test]
    fn test_inactive_instance_renders_once_after_activation() {
        init_tracing();
        let queue = MicrotaskQueue::new();
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .default_state(changes! { "count" => 0 })
            .render(record_render(&recorder))
            .build();

        let mut deferred = reactive.set_state(changes! { "count" => 1 });
        assert_eq!(status(&mut deferred), Some(RenderStatus::Deferred));
        assert_eq!(queue.run_until_idle(), 0);
        assert_eq!(recorder.render_count(), 0);

        reactive.set_active(true);
        let mut joined = reactive.set_state(changes! { "count" => 2 });
        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 1);
        let observed = recorder.last_render();
        assert_eq!(observed.as_ref().map(|o| o.first_render), Some(true));
        assert_eq!(observed.map(|o| o.changed), Some(vec!["count".to_owned()]));
        assert_eq!(status(&mut joined), Some(RenderStatus::Rendered));
        assert_eq!(reactive.state().value("count"), &Value::from(2));
    }

    #[test]
    fn test_reactivation_without_changes_does_not_render() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        reactive.set_active(false);
        reactive.set_active(true);

        assert!(queue.is_empty());
        assert_eq!(recorder.render_count(), 1);
    }

    #[test]
    fn test_deactivated_before_render_defers() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        let mut completion = reactive.set_state(changes! { "a" => 1 });
        reactive.set_active(false);
        queue.run_until_idle();

        assert_eq!(status(&mut completion), Some(RenderStatus::Deferred));
        assert_eq!(recorder.render_count(), 1);
        assert!(reactive.pending_changes().contains("a"));

        reactive.set_active(true);
        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 2);
        assert!(reactive.pending_changes().is_empty());
    }

    #[test]
    fn test_deactivated_render_runs_without_recheck() {
        let queue = MicrotaskQueue::new();
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .render(record_render(&recorder))
            .config(ReactiveConfig::default().recheck_active_at_render(false))
            .active(true)
            .build();
        queue.run_until_idle();

        let mut completion = reactive.set_state(changes! { "a" => 1 });
        reactive.set_active(false);
        queue.run_until_idle();

        assert_eq!(status(&mut completion), Some(RenderStatus::Rendered));
        assert_eq!(recorder.render_count(), 2);
    }

    #[test]
    fn test_mutation_during_render_is_reported_and_rendered_later() {
        let queue = MicrotaskQueue::new();
        let sink = Rc::new(RecordingSink::new());
        let renders = Rc::new(Cell::new(0));
        let counter = renders.clone();
        let reactive = Reactive::builder(queue.clone())
            .render(move |ctx: &RenderContext<'_>| {
                counter.set(counter.get() + 1);
                if ctx.first_render() {
                    let _ = ctx.reactive().set_state(changes! { "late" => true });
                }
                Ok(())
            })
            .diagnostics(sink.clone())
            .active(true)
            .build();

        queue.run_until_idle();

        assert_eq!(renders.get(), 2);
        assert_eq!(reactive.state().value("late"), &Value::from(true));
        let reports = sink.take();
        assert_eq!(reports.len(), 1);
        match &reports[0] {
            Diagnostic::MutationDuringRender { keys } => {
                assert_eq!(keys, &vec![StateKey::from("late")]);
            }
            other => panic!("unexpected diagnostic {other:?}"),
        }
    }

    #[test]
    fn test_rendered_follow_up_mutation_schedules_next_render() {
        let queue = MicrotaskQueue::new();
        let sink = Rc::new(RecordingSink::new());
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .render(record_render(&recorder))
            .rendered(|ctx: &RenderContext<'_>| {
                if ctx.changed().contains("query") {
                    let _ = ctx.reactive().set_state(changes! { "results" => 3 });
                }
                Ok(())
            })
            .diagnostics(sink.clone())
            .active(true)
            .build();
        queue.run_until_idle();

        let _ = reactive.set_state(changes! { "query" => "kite" });
        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 3);
        assert_eq!(
            recorder.last_render().map(|o| o.changed),
            Some(vec!["results".to_owned()])
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_follow_up_mutation_in_user_batch_raises_events() {
        let queue = MicrotaskQueue::new();
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(queue.clone())
            .rendered(record_rendered(&recorder))
            .rendered(|ctx: &RenderContext<'_>| {
                if ctx.changed().contains("query") {
                    let _ = ctx.reactive().set_state(changes! { "results" => 3 });
                }
                Ok(())
            })
            .active(true)
            .build();
        queue.run_until_idle();

        reactive.with_change_events(|| {
            let _ = reactive.set_state(changes! { "query" => "kite" });
        });
        queue.run_until_idle();

        let raised: Vec<bool> = recorder.rendered.borrow().iter().map(|o| o.raise).collect();
        assert_eq!(raised, vec![false, true, true]);
        assert!(!reactive.raise_change_events());
    }

    #[test]
    fn test_forced_render_inside_handler_does_not_leak_events() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        reactive.with_change_events(|| {
            let _ = reactive.set_state(changes! { "a" => 1 });
            let _ = reactive.render_changes();
        });
        queue.run_until_idle();

        let _ = reactive.set_state(changes! { "b" => 1 });
        queue.run_until_idle();

        let raised: Vec<bool> = recorder.rendered.borrow().iter().map(|o| o.raise).collect();
        assert_eq!(raised, vec![false, true, false]);
    }

    #[test]
    fn test_failed_first_render_still_ends_first_render() {
        let queue = MicrotaskQueue::new();
        let sink = Rc::new(RecordingSink::new());
        let firsts = Rc::new(RefCell::new(Vec::new()));
        let seen = firsts.clone();
        let reactive = Reactive::builder(queue.clone())
            .default_state(changes! { "fail" => true })
            .render(move |ctx: &RenderContext<'_>| {
                seen.borrow_mut().push(ctx.first_render());
                if ctx.state().value("fail").as_bool() == Some(true) {
                    anyhow::bail!("first paint failed");
                }
                Ok(())
            })
            .diagnostics(sink.clone())
            .active(true)
            .build();
        queue.run_until_idle();

        assert_eq!(reactive.first_render(), Some(false));
        assert!(!reactive.is_rendering());

        let _ = reactive.set_state(changes! { "fail" => false });
        queue.run_until_idle();

        assert_eq!(*firsts.borrow(), vec![true, false]);
        // Only the first render failed, and nobody was waiting for it.
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_null_for_new_key_is_published_and_rendered() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, changes! { "z" => 0 });
        queue.run_until_idle();

        let mut completion = reactive.set_state(changes! { "x" => Value::Null });

        assert!(reactive.state().contains_key("x"));
        assert!(reactive.pending_changes().contains("x"));
        queue.run_until_idle();
        assert_eq!(status(&mut completion), Some(RenderStatus::Rendered));
        assert_eq!(
            recorder.last_render().map(|o| o.changed),
            Some(vec!["x".to_owned()])
        );

        let mut again = reactive.set_state(changes! { "x" => Value::Null });
        assert_eq!(status(&mut again), Some(RenderStatus::Unchanged));
    }

    #[test]
    fn test_render_changes_runs_synchronously() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        queue.run_until_idle();

        let mut completion = reactive.set_state(changes! { "a" => 1 });
        let outcome = reactive.render_changes();

        assert!(matches!(outcome, Ok(RenderStatus::Rendered)));
        assert_eq!(status(&mut completion), Some(RenderStatus::Rendered));
        assert_eq!(recorder.render_count(), 2);

        // The queued microtask finds nothing left to render.
        queue.run_until_idle();
        assert_eq!(recorder.render_count(), 2);
        assert!(matches!(reactive.render_changes(), Ok(RenderStatus::Unchanged)));
    }

    #[test]
    fn test_dropped_instance_fails_pending_completion() {
        let queue = MicrotaskQueue::new();
        let (reactive, recorder) = recorded(&queue, Changes::new());
        let completion = reactive.set_state(changes! { "a" => 1 });

        drop(reactive);
        queue.run_until_idle();

        assert_eq!(recorder.render_count(), 0);
        let outcome = futures::executor::block_on(completion);
        assert!(matches!(outcome, Err(RenderError::Dropped)));
    }

    #[test]
    fn test_render_error_reaches_waiters() {
        let queue = MicrotaskQueue::new();
        let sink = Rc::new(RecordingSink::new());
        let rendered_calls = Rc::new(Cell::new(0));
        let calls = rendered_calls.clone();
        let reactive = Reactive::builder(queue.clone())
            .render(|ctx: &RenderContext<'_>| {
                if ctx.state().value("fail").as_bool() == Some(true) {
                    anyhow::bail!("cannot project state");
                }
                Ok(())
            })
            .rendered(move |_: &RenderContext<'_>| {
                calls.set(calls.get() + 1);
                Ok(())
            })
            .diagnostics(sink.clone())
            .active(true)
            .build();
        queue.run_until_idle();

        let mut first = reactive.set_state(changes! { "fail" => true });
        let mut second = reactive.set_state(changes! { "other" => 1 });
        queue.run_until_idle();

        for completion in [&mut first, &mut second] {
            match completion.try_take() {
                Some(Err(err @ RenderError::Render(_))) => {
                    let message = err.callback_error().map(|e| e.to_string());
                    assert_eq!(message.as_deref(), Some("cannot project state"));
                }
                other => panic!("expected render error, got {other:?}"),
            }
        }
        assert_eq!(rendered_calls.get(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unhandled_render_error_is_reported() {
        let queue = MicrotaskQueue::new();
        let sink = Rc::new(RecordingSink::new());
        let reactive = Reactive::builder(queue.clone())
            .rendered(|ctx: &RenderContext<'_>| {
                if ctx.changed().contains("boom") {
                    anyhow::bail!("notification handler failed");
                }
                Ok(())
            })
            .diagnostics(sink.clone())
            .active(true)
            .build();
        queue.run_until_idle();

        drop(reactive.set_state(changes! { "boom" => 1 }));
        queue.run_until_idle();

        let reports = sink.take();
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            &reports[0],
            Diagnostic::UnhandledRenderError {
                error: RenderError::Rendered(_)
            }
        ));
    }

    #[test]
    fn test_completion_with_local_pool() {
        let mut pool = LocalPool::new();
        let recorder = Rc::new(Recorder::default());
        let reactive = Reactive::builder(pool.spawner())
            .default_state(changes! { "a" => 0 })
            .render(record_render(&recorder))
            .active(true)
            .build();

        let completion = reactive.set_state(changes! { "a" => 1 });
        let outcome = pool.run_until(completion);

        assert!(matches!(outcome, Ok(RenderStatus::Rendered)));
        assert_eq!(recorder.render_count(), 1);
        assert_eq!(
            recorder.last_render().map(|o| o.first_render),
            Some(true)
        );
    }

    #[test]
    fn test_weak_handle_does_not_keep_instance_alive() {
        let queue = MicrotaskQueue::new();
        let (reactive, _recorder) = recorded(&queue, Changes::new());
        let weak = reactive.downgrade();

        assert!(weak
            .upgrade()
            .is_some_and(|strong| Reactive::ptr_eq(&strong, &reactive)));
        drop(reactive);
        assert!(weak.upgrade().is_none());
    }
}
