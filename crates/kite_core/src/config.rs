//! Reactive instance configuration

/// Default number of effect rounds after which a non-convergence warning is raised
pub const DEFAULT_EFFECTS_WARNING_THRESHOLD: usize = 1000;

/// Tuning for one reactive component instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Effect rounds within one mutation call after which an
    /// `EffectsNotConverging` diagnostic is reported. The loop is never cut
    /// short; this only makes a runaway loop visible.
    pub effects_warning_threshold: usize,
    /// Re-check activity when the deferred render actually runs. When false,
    /// an instance deactivated after scheduling still renders that batch.
    pub recheck_active_at_render: bool,
    /// Report mutation calls made from inside the render phase
    pub warn_on_render_mutation: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            effects_warning_threshold: DEFAULT_EFFECTS_WARNING_THRESHOLD,
            recheck_active_at_render: true,
            warn_on_render_mutation: true,
        }
    }
}

impl ReactiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the effect round count that triggers a non-convergence warning
    pub fn effects_warning_threshold(mut self, rounds: usize) -> Self {
        self.effects_warning_threshold = rounds.max(1);
        self
    }

    /// Choose whether the deferred render re-checks activity
    pub fn recheck_active_at_render(mut self, recheck: bool) -> Self {
        self.recheck_active_at_render = recheck;
        self
    }

    /// Enable or silence the mutation-during-render warning
    pub fn warn_on_render_mutation(mut self, warn: bool) -> Self {
        self.warn_on_render_mutation = warn;
        self
    }
}
