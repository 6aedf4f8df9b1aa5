//! Kite Widget Library
//!
//! Components built on the `kite_core` reactive engine.
//!
//! # Architecture
//!
//! Every widget is a thin wrapper over a [`kite_core::Reactive`] instance:
//!
//! 1. **State Effects**: selection rules and other invariants are state
//!    effects, so the published state is always valid.
//!
//! 2. **Surfaces**: rendering goes through a small trait per widget
//!    ([`ListSurface`]), implemented by the host toolkit or by a test
//!    recorder.
//!
//! 3. **User vs Programmatic Changes**: input handlers run inside
//!    `with_change_events`, so change callbacks fire only for user
//!    interaction.

pub mod keyboard;
pub mod list_box;

pub use keyboard::{Key, KeyboardActivity};
pub use list_box::{ListBox, ListBoxConfig, ListSurface, NO_SELECTION};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::keyboard::{Key, KeyboardActivity};
    pub use crate::list_box::{ListBox, ListBoxConfig, ListSurface};
    pub use kite_core::{MicrotaskQueue, RenderCompletion, RenderStatus};
}
