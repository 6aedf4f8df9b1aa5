//! Capability composition for reactive instances
//!
//! A component is assembled from independent capabilities (default state,
//! effect rules, render and rendered callbacks) in registration order.
//! Mixin-style layering becomes repeated builder calls: a base capability
//! registers first, the concrete component registers after it and wins on
//! conflicting effect keys.

use std::rc::Rc;

use crate::config::ReactiveConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::effects::{EffectsChain, StateEffects};
use crate::lifecycle::{Lifecycle, Render, RenderContext, Rendered};
use crate::microtask::MicrotaskScheduler;
use crate::reactive::{Reactive, ReactiveParts};
use crate::state::{ChangedFields, Changes, Snapshot};

/// Builder for [`Reactive`]
pub struct ReactiveBuilder {
    scheduler: Rc<dyn MicrotaskScheduler>,
    default_state: Changes,
    effects: EffectsChain,
    lifecycle: Lifecycle,
    diagnostics: Rc<dyn DiagnosticSink>,
    config: ReactiveConfig,
    active: bool,
}

impl ReactiveBuilder {
    pub(crate) fn new(scheduler: impl MicrotaskScheduler + 'static) -> Self {
        Self {
            scheduler: Rc::new(scheduler),
            default_state: Changes::new(),
            effects: EffectsChain::new(),
            lifecycle: Lifecycle::default(),
            diagnostics: Rc::new(TracingSink),
            config: ReactiveConfig::default(),
            active: false,
        }
    }

    /// Merge defaults into the initial state; later calls override earlier ones
    pub fn default_state(mut self, defaults: impl Into<Changes>) -> Self {
        self.default_state.merge(defaults.into());
        self
    }

    /// Register an effect rule
    pub fn effects<F>(self, effects: F) -> Self
    where
        F: Fn(&Snapshot, &ChangedFields) -> Changes + 'static,
    {
        self.add_effects(effects)
    }

    pub fn add_effects(mut self, effects: impl StateEffects + 'static) -> Self {
        self.effects.push(effects);
        self
    }

    /// Register a render-phase callback
    pub fn render<F>(self, render: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.add_render(render)
    }

    pub fn add_render(mut self, render: impl Render + 'static) -> Self {
        self.lifecycle.push_render(Box::new(render));
        self
    }

    /// Register a rendered-phase callback
    pub fn rendered<F>(self, rendered: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> anyhow::Result<()> + 'static,
    {
        self.add_rendered(rendered)
    }

    pub fn add_rendered(mut self, rendered: impl Rendered + 'static) -> Self {
        self.lifecycle.push_rendered(Box::new(rendered));
        self
    }

    /// Where diagnostics go; defaults to [`TracingSink`]
    pub fn diagnostics(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostics = Rc::new(sink);
        self
    }

    pub fn config(mut self, config: ReactiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Start attached to the host (default: detached)
    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Build the instance and apply the default state as its first change
    ///
    /// An active instance has its first render queued on return; an
    /// inactive one renders after [`Reactive::set_active`].
    pub fn build(self) -> Reactive {
        let reactive = Reactive::from_parts(ReactiveParts {
            config: self.config,
            effects: self.effects,
            lifecycle: self.lifecycle,
            scheduler: self.scheduler,
            diagnostics: self.diagnostics,
            active: self.active,
        });
        // The first call always publishes and schedules, even with no defaults.
        drop(reactive.set_state(self.default_state));
        reactive
    }
}
