//! Two-phase render lifecycle
//!
//! Each batched render runs two synchronous phases:
//!
//! 1. **render**: project the current state onto whatever the component
//!    controls (a DOM node, a terminal cell grid, a test recorder). While it
//!    runs, [`RenderContext::is_rendering`] is true and state changes are
//!    reported as a design smell.
//! 2. **rendered**: post-render work. This is the only place a component
//!    should raise user-facing change notifications, because here
//!    [`RenderContext::raise_change_events`] tells whether the batch came
//!    from direct user interaction or from programmatic updates.
//!
//! ```rust
//! use kite_core::{changes, MicrotaskQueue, Reactive, RenderContext};
//!
//! let queue = MicrotaskQueue::new();
//! let reactive = Reactive::builder(queue.clone())
//!     .default_state(changes! { "opened" => false })
//!     .render(|ctx: &RenderContext<'_>| {
//!         if ctx.changed().contains("opened") {
//!             println!("opened = {:?}", ctx.state().value("opened"));
//!         }
//!         Ok(())
//!     })
//!     .rendered(|ctx: &RenderContext<'_>| {
//!         if ctx.changed().contains("opened") && ctx.raise_change_events() {
//!             println!("user toggled the popup");
//!         }
//!         Ok(())
//!     })
//!     .active(true)
//!     .build();
//!
//! reactive.with_change_events(|| {
//!     let _ = reactive.set_state(changes! { "opened" => true });
//! });
//! queue.run_until_idle();
//! ```

use std::cell::Cell;
use std::sync::Arc;

use crate::error::{RenderError, Result};
use crate::reactive::Reactive;
use crate::state::{ChangedFields, Snapshot};

/// Render-phase capability: project state onto an external surface
pub trait Render {
    fn render(&self, ctx: &RenderContext<'_>) -> anyhow::Result<()>;
}

/// Rendered-phase capability: post-render work and change notifications
pub trait Rendered {
    fn rendered(&self, ctx: &RenderContext<'_>) -> anyhow::Result<()>;
}

impl<F> Render for F
where
    F: Fn(&RenderContext<'_>) -> anyhow::Result<()>,
{
    fn render(&self, ctx: &RenderContext<'_>) -> anyhow::Result<()> {
        self(ctx)
    }
}

impl<F> Rendered for F
where
    F: Fn(&RenderContext<'_>) -> anyhow::Result<()>,
{
    fn rendered(&self, ctx: &RenderContext<'_>) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// What a render callback can see
///
/// Callbacks that need to mutate state later (from an event handler they
/// install on first render, say) should keep [`Reactive::downgrade`], not a
/// strong clone of [`RenderContext::reactive`], or the instance never drops.
pub struct RenderContext<'a> {
    reactive: &'a Reactive,
    state: Snapshot,
    changed: &'a ChangedFields,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(reactive: &'a Reactive, changed: &'a ChangedFields) -> Self {
        Self {
            reactive,
            state: reactive.state(),
            changed,
        }
    }

    /// The state this phase projects
    pub fn state(&self) -> &Snapshot {
        &self.state
    }

    /// Every key changed since the previous render
    pub fn changed(&self) -> &ChangedFields {
        self.changed
    }

    /// True during (render and rendered of) the instance's first render
    pub fn first_render(&self) -> bool {
        self.reactive.first_render() == Some(true)
    }

    /// Whether this batch came from direct user interaction
    pub fn raise_change_events(&self) -> bool {
        self.reactive.raise_change_events()
    }

    pub fn is_rendering(&self) -> bool {
        self.reactive.is_rendering()
    }

    /// The instance being rendered
    pub fn reactive(&self) -> &'a Reactive {
        self.reactive
    }
}

/// Render and rendered callbacks of one component, in registration order
#[derive(Default)]
pub(crate) struct Lifecycle {
    render: Vec<Box<dyn Render>>,
    rendered: Vec<Box<dyn Rendered>>,
}

impl Lifecycle {
    pub(crate) fn push_render(&mut self, render: Box<dyn Render>) {
        self.render.push(render);
    }

    pub(crate) fn push_rendered(&mut self, rendered: Box<dyn Rendered>) {
        self.rendered.push(rendered);
    }

    /// Run the render phase; the first failure skips the remaining callbacks
    pub(crate) fn render(&self, ctx: &RenderContext<'_>) -> Result<()> {
        for render in &self.render {
            render
                .render(ctx)
                .map_err(|err| RenderError::Render(Arc::new(err)))?;
        }
        Ok(())
    }

    /// Run the rendered phase; the first failure skips the remaining callbacks
    pub(crate) fn rendered(&self, ctx: &RenderContext<'_>) -> Result<()> {
        for rendered in &self.rendered {
            rendered
                .rendered(ctx)
                .map_err(|err| RenderError::Rendered(Arc::new(err)))?;
        }
        Ok(())
    }
}

// =============================================================================
// FLAGS
// =============================================================================

/// Per-instance render lifecycle flags
#[derive(Debug, Default)]
pub(crate) struct LifecycleFlags {
    /// `None` before the first render starts, `Some(true)` until it completes
    pub(crate) first_render: Cell<Option<bool>>,
    pub(crate) rendering: Cell<bool>,
    pub(crate) raise_change_events: Cell<bool>,
    /// Latched from `raise_change_events` at mutation time
    pub(crate) raise_in_next_render: Cell<bool>,
}

impl LifecycleFlags {
    /// Mark the render phase as running until the guard drops
    pub(crate) fn enter_render(&self) -> CellGuard<'_, bool> {
        CellGuard::set(&self.rendering, true)
    }

    /// Consume the latch and expose it as the event flag for one render.
    /// On drop only the flag is restored; a latch set by a mutation made
    /// during the render belongs to the next one.
    pub(crate) fn expose_latched_events(&self) -> LatchedEvents<'_> {
        let latched = self.raise_in_next_render.replace(false);
        let saved = self.raise_change_events.replace(latched);
        LatchedEvents { flags: self, saved }
    }

    /// Mark the first render as done when the guard drops, even if a
    /// callback failed
    pub(crate) fn finish_render(&self) -> CellGuard<'_, Option<bool>> {
        CellGuard {
            cell: &self.first_render,
            restore: Some(false),
        }
    }

    /// Set the event flag until the guard drops
    pub(crate) fn raise_events(&self, raise: bool) -> CellGuard<'_, bool> {
        CellGuard::set(&self.raise_change_events, raise)
    }
}

/// Writes `restore` back into a cell on drop, including during unwinding
pub(crate) struct CellGuard<'a, T: Copy> {
    cell: &'a Cell<T>,
    restore: T,
}

impl<'a, T: Copy> CellGuard<'a, T> {
    fn set(cell: &'a Cell<T>, value: T) -> Self {
        let restore = cell.replace(value);
        Self { cell, restore }
    }
}

impl<T: Copy> Drop for CellGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.set(self.restore);
    }
}

pub(crate) struct LatchedEvents<'a> {
    flags: &'a LifecycleFlags,
    saved: bool,
}

impl Drop for LatchedEvents<'_> {
    fn drop(&mut self) {
        self.flags.raise_change_events.set(self.saved);
    }
}
