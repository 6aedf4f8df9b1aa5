//! State effects and fixpoint resolution
//!
//! A state effect is a second-order change implied by a first-order one:
//! when `items` shrinks, a `selected_index` past the end must be clamped.
//! Components describe these rules declaratively through [`StateEffects`];
//! [`resolve`] applies a proposed change, asks for its effects, applies those,
//! and repeats until a round proposes nothing new.
//!
//! ```rust
//! use kite_core::effects::{resolve, EffectsChain};
//! use kite_core::{changes, ChangedFields, Changes, ReactiveConfig, Snapshot, TracingSink};
//!
//! let mut chain = EffectsChain::new();
//! chain.push(|state: &Snapshot, changed: &ChangedFields| {
//!     let mut effects = Changes::new();
//!     if changed.contains("celsius") {
//!         let c = state.value("celsius").as_float().unwrap_or(0.0);
//!         effects.set("fahrenheit", c * 9.0 / 5.0 + 32.0);
//!     }
//!     effects
//! });
//!
//! let state = Snapshot::default();
//! let resolved = resolve(&state, changes! { "celsius" => 100.0 }, &chain, &ReactiveConfig::default(), &TracingSink);
//!
//! assert_eq!(resolved.state.value("fahrenheit").as_float(), Some(212.0));
//! assert_eq!(resolved.changed.len(), 2);
//! ```
//!
//! There is no iteration cap. Effect logic must converge; a rule that keeps
//! proposing new values hangs the caller. Past
//! [`ReactiveConfig::effects_warning_threshold`] rounds a single
//! [`Diagnostic::EffectsNotConverging`] is reported so the hang is visible.

use crate::config::ReactiveConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::state::{fields_changed, ChangedFields, Changes, Snapshot};

/// Computes second-order changes implied by the fields that just changed
///
/// `state` is the working snapshot with the round's changes already applied;
/// `changed` holds only the keys changed in that round. Return an empty
/// [`Changes`] when nothing follows.
pub trait StateEffects {
    fn state_effects(&self, state: &Snapshot, changed: &ChangedFields) -> Changes;
}

impl<F> StateEffects for F
where
    F: Fn(&Snapshot, &ChangedFields) -> Changes,
{
    fn state_effects(&self, state: &Snapshot, changed: &ChangedFields) -> Changes {
        self(state, changed)
    }
}

/// Effect providers of one component, in registration order
///
/// Every provider sees the same working snapshot; outputs are merged in
/// order, so a later provider overrides an earlier one on the same key.
#[derive(Default)]
pub struct EffectsChain {
    providers: Vec<Box<dyn StateEffects>>,
}

impl EffectsChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, provider: impl StateEffects + 'static) {
        self.providers.push(Box::new(provider));
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl StateEffects for EffectsChain {
    fn state_effects(&self, state: &Snapshot, changed: &ChangedFields) -> Changes {
        let mut effects = Changes::new();
        for provider in &self.providers {
            effects.merge(provider.state_effects(state, changed));
        }
        effects
    }
}

/// Result of running a proposal to its fixpoint
#[derive(Debug, Clone)]
pub struct Resolution {
    /// The final snapshot; the original reference when nothing changed
    pub state: Snapshot,
    /// Union of the keys changed across all rounds
    pub changed: ChangedFields,
    /// Rounds that applied a change
    pub rounds: usize,
}

impl Resolution {
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Apply `proposed` to `state` and follow its effects to a fixpoint
///
/// `state` itself is never modified. Intermediate snapshots live only inside
/// this call.
pub fn resolve(
    state: &Snapshot,
    proposed: Changes,
    effects: &dyn StateEffects,
    config: &ReactiveConfig,
    diagnostics: &dyn DiagnosticSink,
) -> Resolution {
    let mut working = state.clone();
    let mut changed = ChangedFields::new();
    let mut proposal = proposed;
    let mut rounds = 0;
    let mut warned = false;

    loop {
        let round_changed = fields_changed(&working, &proposal);
        if round_changed.is_empty() {
            break;
        }

        working.apply(&proposal);
        changed.extend(&round_changed);
        rounds += 1;

        if rounds >= config.effects_warning_threshold && !warned {
            warned = true;
            diagnostics.report(&Diagnostic::EffectsNotConverging {
                rounds,
                pending: round_changed.to_vec(),
            });
        }

        proposal = effects.state_effects(&working, &round_changed);
        tracing::trace!(round = rounds, ?round_changed, next = ?proposal, "effects round");
    }

    Resolution {
        state: working,
        changed,
        rounds,
    }
}
