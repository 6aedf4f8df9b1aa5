//! Keyboard activity tracking
//!
//! Focus rings should show when the user navigates with the keyboard and hide
//! once they go back to the pointer. [`KeyboardActivity`] is the shared
//! record of which input was used last; widgets read it from their state
//! effects.

use std::cell::Cell;
use std::rc::Rc;

/// Keys the widgets in this crate react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Home,
    End,
    Char(char),
}

/// Last-used input device, shared by every widget in a window
///
/// Cheap to clone; clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct KeyboardActivity {
    keyboard_active: Rc<Cell<bool>>,
}

impl KeyboardActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key press
    pub fn keyboard_used(&self) {
        if !self.keyboard_active.replace(true) {
            tracing::trace!("keyboard navigation active");
        }
    }

    /// Record a pointer press
    pub fn pointer_used(&self) {
        if self.keyboard_active.replace(false) {
            tracing::trace!("pointer navigation active");
        }
    }

    /// Whether the keyboard was used more recently than the pointer
    pub fn is_keyboard_active(&self) -> bool {
        self.keyboard_active.get()
    }
}
