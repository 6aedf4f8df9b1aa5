//! Kite Core Runtime
//!
//! This crate provides the state-and-render engine behind Kite components:
//!
//! - **Immutable State**: each instance publishes [`Snapshot`]s that never
//!   change once handed out
//! - **State Effects**: declarative second-order changes, resolved to a
//!   fixpoint before anything is published
//! - **Batched Rendering**: every mutation in one synchronous turn lands in a
//!   single render, one microtask later
//! - **Render Lifecycle**: render and rendered phases with first-render,
//!   rendering and raise-change-events flags
//!
//! # Example
//!
//! ```rust
//! use kite_core::{changes, ChangedFields, Changes, MicrotaskQueue, Reactive, RenderContext, Snapshot};
//!
//! let queue = MicrotaskQueue::new();
//!
//! let counter = Reactive::builder(queue.clone())
//!     .default_state(changes! { "count" => 0 })
//!     .effects(|state: &Snapshot, changed: &ChangedFields| {
//!         if changed.contains("count") {
//!             let count = state.value("count").as_int().unwrap_or(0);
//!             changes! { "label" => format!("Clicked {count} times") }
//!         } else {
//!             Changes::new()
//!         }
//!     })
//!     .render(|ctx: &RenderContext<'_>| {
//!         println!("{:?}", ctx.state().value("label"));
//!         Ok(())
//!     })
//!     .active(true)
//!     .build();
//!
//! let _ = counter.set_state(changes! { "count" => 5 });
//! queue.run_until_idle();
//!
//! assert_eq!(counter.state().value("label").as_str(), Some("Clicked 5 times"));
//! ```

pub mod builder;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod effects;
pub mod error;
pub mod lifecycle;
pub mod microtask;
pub mod reactive;
pub mod state;
pub mod value;

pub use builder::ReactiveBuilder;
pub use completion::{RenderCompletion, RenderStatus};
pub use config::{ReactiveConfig, DEFAULT_EFFECTS_WARNING_THRESHOLD};
pub use diagnostics::{Diagnostic, DiagnosticSink, RecordingSink, TracingSink};
pub use effects::{resolve, EffectsChain, Resolution, StateEffects};
pub use error::{RenderError, Result, SharedError};
pub use lifecycle::{Render, RenderContext, Rendered};
pub use microtask::{Microtask, MicrotaskQueue, MicrotaskScheduler};
pub use reactive::{Reactive, WeakReactive};
pub use state::{fields_changed, ChangedFields, Changes, Snapshot, StateKey};
pub use value::Value;
