//! Single-selection list box
//!
//! The ListBox widget provides:
//! - A list of text items with at most one selected
//! - Optional required selection (the first item is selected whenever any exist)
//! - Arrow/Home/End keyboard navigation with a keyboard-only focus ring
//! - Selection change notifications for user interaction only
//!
//! Selection rules live in state effects, so every path that changes the
//! items or the index (programmatic or user) ends on a valid selection before
//! anything renders.
//!
//! ```rust
//! use kite_core::MicrotaskQueue;
//! use kite_widgets::keyboard::{Key, KeyboardActivity};
//! use kite_widgets::list_box::{ListBox, ListBoxConfig, ListSurface};
//!
//! struct Stdout;
//!
//! impl ListSurface for Stdout {
//!     fn set_items(&self, items: &[&str]) -> anyhow::Result<()> {
//!         println!("items: {items:?}");
//!         Ok(())
//!     }
//!     fn set_selected(&self, index: Option<usize>) -> anyhow::Result<()> {
//!         println!("selected: {index:?}");
//!         Ok(())
//!     }
//!     fn set_focus_visible(&self, visible: bool) -> anyhow::Result<()> {
//!         println!("focus ring: {visible}");
//!         Ok(())
//!     }
//! }
//!
//! let queue = MicrotaskQueue::new();
//! let list = ListBox::with_config(
//!     queue.clone(),
//!     KeyboardActivity::new(),
//!     Stdout,
//!     ListBoxConfig::new().items(["red", "green", "blue"]).selection_required(true),
//! )
//! .on_selection_change(|index| println!("user picked {index:?}"));
//!
//! list.set_active(true);
//! let _ = list.key_down(Key::ArrowDown);
//! queue.run_until_idle();
//!
//! assert_eq!(list.selected_index(), Some(1));
//! assert!(list.is_focus_visible());
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use kite_core::{
    changes, ChangedFields, Changes, MicrotaskScheduler, Reactive, RenderCompletion,
    RenderContext, Snapshot, StateEffects, Value,
};

use crate::keyboard::{Key, KeyboardActivity};

/// ListBox state keys
pub mod keys {
    /// List of item labels
    pub const ITEMS: &str = "items";
    /// Selected item index, [`NO_SELECTION`](super::NO_SELECTION) when none
    pub const SELECTED_INDEX: &str = "selected_index";
    pub const SELECTION_REQUIRED: &str = "selection_required";
    /// Whether the keyboard focus ring is shown
    pub const FOCUS_VISIBLE: &str = "focus_visible";
}

use keys::{FOCUS_VISIBLE, ITEMS, SELECTED_INDEX, SELECTION_REQUIRED};

/// `selected_index` value meaning nothing is selected
pub const NO_SELECTION: i64 = -1;

/// Whatever a list box renders onto
pub trait ListSurface {
    fn set_items(&self, items: &[&str]) -> anyhow::Result<()>;
    fn set_selected(&self, index: Option<usize>) -> anyhow::Result<()>;
    fn set_focus_visible(&self, visible: bool) -> anyhow::Result<()>;
}

impl<S: ListSurface + ?Sized> ListSurface for Rc<S> {
    fn set_items(&self, items: &[&str]) -> anyhow::Result<()> {
        (**self).set_items(items)
    }

    fn set_selected(&self, index: Option<usize>) -> anyhow::Result<()> {
        (**self).set_selected(index)
    }

    fn set_focus_visible(&self, visible: bool) -> anyhow::Result<()> {
        (**self).set_focus_visible(visible)
    }
}

/// ListBox configuration
#[derive(Debug, Clone, Default)]
pub struct ListBoxConfig {
    /// Initial item labels
    pub items: Vec<String>,
    /// Initially selected index
    pub selected: Option<usize>,
    /// Keep an item selected whenever the list is non-empty
    pub selection_required: bool,
}

impl ListBoxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial items
    pub fn items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    /// Set the initially selected index
    pub fn selected(mut self, index: usize) -> Self {
        self.selected = Some(index);
        self
    }

    pub fn selection_required(mut self, required: bool) -> Self {
        self.selection_required = required;
        self
    }
}

type SelectionCallback = Box<dyn Fn(Option<usize>)>;

/// Keeps the selection valid and mirrors keyboard activity
struct SelectionEffects {
    keyboard: KeyboardActivity,
}

impl StateEffects for SelectionEffects {
    fn state_effects(&self, state: &Snapshot, changed: &ChangedFields) -> Changes {
        let mut effects = Changes::new();

        if changed.contains_any(&[ITEMS, SELECTED_INDEX, SELECTION_REQUIRED]) {
            let len = item_count(state);
            let index = state.value(SELECTED_INDEX).as_int().unwrap_or(NO_SELECTION);
            let mut valid = index.clamp(NO_SELECTION, len - 1);
            if valid == NO_SELECTION && len > 0 && is_selection_required(state) {
                valid = 0;
            }
            if valid != index || state.value(SELECTED_INDEX).is_null() {
                effects.set(SELECTED_INDEX, valid);
            }
        }

        let keyboard_active = self.keyboard.is_keyboard_active();
        if state.value(FOCUS_VISIBLE).as_bool() != Some(keyboard_active) {
            effects.set(FOCUS_VISIBLE, keyboard_active);
        }

        effects
    }
}

/// Single-selection list box widget
pub struct ListBox {
    reactive: Reactive,
    keyboard: KeyboardActivity,
    on_selection_change: Rc<RefCell<Option<SelectionCallback>>>,
}

impl ListBox {
    /// Create an empty list box
    pub fn new(
        scheduler: impl MicrotaskScheduler + 'static,
        keyboard: KeyboardActivity,
        surface: impl ListSurface + 'static,
    ) -> Self {
        Self::with_config(scheduler, keyboard, surface, ListBoxConfig::default())
    }

    /// Create a list box with custom config
    ///
    /// The list box starts detached; call [`ListBox::set_active`] once its
    /// surface is attached to the host.
    pub fn with_config(
        scheduler: impl MicrotaskScheduler + 'static,
        keyboard: KeyboardActivity,
        surface: impl ListSurface + 'static,
        config: ListBoxConfig,
    ) -> Self {
        let on_selection_change: Rc<RefCell<Option<SelectionCallback>>> = Rc::default();
        let callback = on_selection_change.clone();

        let reactive = Reactive::builder(scheduler)
            .default_state(changes! {
                ITEMS => items_value(config.items),
                SELECTED_INDEX => index_value(config.selected),
                SELECTION_REQUIRED => config.selection_required,
                FOCUS_VISIBLE => false,
            })
            .add_effects(SelectionEffects {
                keyboard: keyboard.clone(),
            })
            .render(move |ctx: &RenderContext<'_>| render_surface(&surface, ctx))
            .rendered(move |ctx: &RenderContext<'_>| {
                if ctx.changed().contains(SELECTED_INDEX) && ctx.raise_change_events() {
                    let selected = selected_index(ctx.state());
                    tracing::debug!(?selected, "list box selection changed");
                    if let Some(callback) = callback.borrow().as_ref() {
                        callback(selected);
                    }
                }
                Ok(())
            })
            .build();

        Self {
            reactive,
            keyboard,
            on_selection_change,
        }
    }

    /// Set the callback for user-initiated selection changes
    pub fn on_selection_change<F: Fn(Option<usize>) + 'static>(self, callback: F) -> Self {
        *self.on_selection_change.borrow_mut() = Some(Box::new(callback));
        self
    }

    /// The underlying reactive instance
    pub fn reactive(&self) -> &Reactive {
        &self.reactive
    }

    /// Attach to or detach from the host
    pub fn set_active(&self, active: bool) {
        self.reactive.set_active(active);
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn items(&self) -> Vec<String> {
        item_labels(&self.reactive.state())
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub fn selected_index(&self) -> Option<usize> {
        selected_index(&self.reactive.state())
    }

    pub fn is_focus_visible(&self) -> bool {
        self.reactive.state().value(FOCUS_VISIBLE).as_bool() == Some(true)
    }

    pub fn selection_required(&self) -> bool {
        is_selection_required(&self.reactive.state())
    }

    // =========================================================================
    // Programmatic updates (no change notification)
    // =========================================================================

    /// Replace the items; the selection is clamped to the new length
    pub fn set_items<I, S>(&self, items: I) -> RenderCompletion
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        self.reactive.set_state(changes! { ITEMS => items_value(items) })
    }

    /// Select `index`, or clear the selection with `None`
    pub fn select(&self, index: Option<usize>) -> RenderCompletion {
        self.reactive
            .set_state(changes! { SELECTED_INDEX => index_value(index) })
    }

    pub fn select_next(&self) -> RenderCompletion {
        let index = self.next_index();
        self.reactive.set_state(changes! { SELECTED_INDEX => index })
    }

    pub fn select_previous(&self) -> RenderCompletion {
        let index = self.previous_index();
        self.reactive.set_state(changes! { SELECTED_INDEX => index })
    }

    pub fn set_selection_required(&self, required: bool) -> RenderCompletion {
        self.reactive
            .set_state(changes! { SELECTION_REQUIRED => required })
    }

    // =========================================================================
    // User input (raises change notifications)
    // =========================================================================

    /// Handle a key press while the list has focus
    ///
    /// Any key shows the focus ring; navigation keys also move the selection.
    pub fn key_down(&self, key: Key) -> RenderCompletion {
        self.keyboard.keyboard_used();

        let mut changes = changes! { FOCUS_VISIBLE => true };
        let last = self.item_count() - 1;
        match key {
            Key::ArrowDown => {
                changes.set(SELECTED_INDEX, self.next_index());
            }
            Key::ArrowUp => {
                changes.set(SELECTED_INDEX, self.previous_index());
            }
            Key::Home if last >= 0 => {
                changes.set(SELECTED_INDEX, 0);
            }
            Key::End if last >= 0 => {
                changes.set(SELECTED_INDEX, last);
            }
            _ => {}
        }

        self.reactive
            .with_change_events(|| self.reactive.set_state(changes))
    }

    /// Handle a click or tap on the item at `index`
    pub fn pointer_select(&self, index: usize) -> RenderCompletion {
        self.keyboard.pointer_used();
        self.reactive.with_change_events(|| {
            self.reactive.set_state(changes! {
                SELECTED_INDEX => index_value(Some(index)),
                FOCUS_VISIBLE => false,
            })
        })
    }

    fn item_count(&self) -> i64 {
        item_count(&self.reactive.state())
    }

    fn current_index(&self) -> i64 {
        self.reactive
            .state()
            .value(SELECTED_INDEX)
            .as_int()
            .unwrap_or(NO_SELECTION)
    }

    fn next_index(&self) -> i64 {
        let last = self.item_count() - 1;
        match self.current_index() {
            NO_SELECTION if last >= 0 => 0,
            NO_SELECTION => NO_SELECTION,
            index => (index + 1).min(last),
        }
    }

    fn previous_index(&self) -> i64 {
        match self.current_index() {
            NO_SELECTION => self.item_count() - 1,
            index => (index - 1).max(0),
        }
    }
}

impl std::fmt::Debug for ListBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListBox")
            .field("items", &self.items())
            .field("selected_index", &self.selected_index())
            .field("focus_visible", &self.is_focus_visible())
            .finish()
    }
}

fn render_surface(surface: &dyn ListSurface, ctx: &RenderContext<'_>) -> anyhow::Result<()> {
    let state = ctx.state();
    let changed = ctx.changed();
    let everything = ctx.first_render();

    if everything || changed.contains(ITEMS) {
        surface.set_items(&item_labels(state))?;
    }
    if everything || changed.contains(SELECTED_INDEX) {
        surface.set_selected(selected_index(state))?;
    }
    if everything || changed.contains(FOCUS_VISIBLE) {
        surface.set_focus_visible(state.value(FOCUS_VISIBLE).as_bool() == Some(true))?;
    }
    Ok(())
}

fn items_value(items: Vec<String>) -> Value {
    Value::list(items)
}

fn index_value(index: Option<usize>) -> i64 {
    index.map_or(NO_SELECTION, |index| {
        i64::try_from(index).unwrap_or(i64::MAX)
    })
}

fn item_labels(state: &Snapshot) -> Vec<&str> {
    state
        .value(ITEMS)
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .collect()
}

fn item_count(state: &Snapshot) -> i64 {
    let len = state.value(ITEMS).as_list().map_or(0, <[Value]>::len);
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn selected_index(state: &Snapshot) -> Option<usize> {
    state
        .value(SELECTED_INDEX)
        .as_int()
        .and_then(|index| usize::try_from(index).ok())
}

fn is_selection_required(state: &Snapshot) -> bool {
    state.value(SELECTION_REQUIRED).as_bool() == Some(true)
}
