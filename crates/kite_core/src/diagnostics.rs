//! Developer diagnostics
//!
//! The core never fails on well-typed input, but some consumer mistakes are
//! worth surfacing: state mutation from inside render, an effects loop that
//! does not settle, and a failed deferred render nobody was waiting for.
//! These go to a [`DiagnosticSink`]; the default [`TracingSink`] logs them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::RenderError;
use crate::state::StateKey;

/// A reportable anomaly
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// `set_state` was called while the render phase was running. The change
    /// is still applied and rendered in a later batch.
    MutationDuringRender { keys: Vec<StateKey> },
    /// One mutation call has run this many effect rounds without settling
    EffectsNotConverging { rounds: usize, pending: Vec<StateKey> },
    /// A deferred render failed and no completion was left to receive it
    UnhandledRenderError { error: RenderError },
}

/// Receives diagnostics from reactive instances
pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Rc<S> {
    fn report(&self, diagnostic: &Diagnostic) {
        (**self).report(diagnostic)
    }
}

/// Writes diagnostics to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::MutationDuringRender { keys } => {
                tracing::warn!(
                    ?keys,
                    "state changed during render; render should only project state"
                );
            }
            Diagnostic::EffectsNotConverging { rounds, pending } => {
                tracing::warn!(
                    rounds,
                    ?pending,
                    "state effects have not converged; check effect logic for cycles"
                );
            }
            Diagnostic::UnhandledRenderError { error } => {
                tracing::error!(%error, "deferred render failed with no waiting completion");
            }
        }
    }
}

/// Keeps every diagnostic in memory, for tests and debug overlays
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: RefCell<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.records.borrow_mut().push(diagnostic.clone());
    }
}
