//! Immutable component state
//!
//! - [`Snapshot`]: the complete state of one component instance at one point
//!   in time. Shared and read-only; "changing" a snapshot produces a new one.
//! - [`Changes`]: a proposed partial state, applied as a shallow overlay.
//! - [`ChangedFields`]: the keys whose values differ between two snapshots.
//!
//! ```rust
//! use kite_core::{changes, Snapshot, Value};
//!
//! let before = Snapshot::default().with_changes(&changes! { "count" => 0, "label" => "A" });
//! let after = before.with_changes(&changes! { "count" => 1 });
//!
//! assert_eq!(before.get("count"), Some(&Value::from(0)));
//! assert_eq!(after.get("count"), Some(&Value::from(1)));
//! assert_eq!(after.get("label"), Some(&Value::from("A")));
//! ```
//!
//! A published snapshot cannot be written to:
//!
//! ```compile_fail
//! use kite_core::{changes, Snapshot};
//!
//! let snapshot = Snapshot::default().with_changes(&changes! { "count" => 0 });
//! snapshot.insert("count", 1.into());
//! ```

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

static NULL_VALUE: Value = Value::Null;

/// Name of a state field
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(Arc<str>);

impl StateKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateKey {
    fn from(key: &str) -> Self {
        StateKey(key.into())
    }
}

impl From<String> for StateKey {
    fn from(key: String) -> Self {
        StateKey(key.into())
    }
}

impl From<&StateKey> for StateKey {
    fn from(key: &StateKey) -> Self {
        key.clone()
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// An immutable state snapshot
///
/// Cloning is cheap (one reference count). No method mutates a snapshot that
/// anyone else can observe: [`Snapshot::with_changes`] always returns a new
/// object and leaves `self` untouched.
#[derive(Clone, Default)]
pub struct Snapshot {
    fields: Arc<FxHashMap<StateKey, Value>>,
}

impl Snapshot {
    /// Get a field's value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a field, treating a missing key as `Value::Null`
    pub fn value(&self, key: &str) -> &Value {
        self.fields.get(key).unwrap_or(&NULL_VALUE)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Value)> {
        self.fields.iter()
    }

    /// Whether two handles refer to the very same snapshot object
    pub fn ptr_eq(a: &Snapshot, b: &Snapshot) -> bool {
        Arc::ptr_eq(&a.fields, &b.fields)
    }

    /// Shallow overlay: a new snapshot with `changes` replacing the named keys
    pub fn with_changes(&self, changes: &Changes) -> Snapshot {
        let mut next = self.clone();
        next.apply(changes);
        next
    }

    /// Overlay in place, copying the map first if it is shared.
    ///
    /// Only ever called on a working copy nobody else can observe yet.
    pub(crate) fn apply(&mut self, changes: &Changes) {
        if changes.is_empty() {
            return;
        }
        let fields = Arc::make_mut(&mut self.fields);
        for (key, value) in changes.iter() {
            fields.insert(key.clone(), value.clone());
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Snapshot::ptr_eq(self, other) || self.fields == other.fields
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.fields.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        f.debug_map().entries(entries).finish()
    }
}

// =============================================================================
// CHANGES
// =============================================================================

/// A proposed partial state
///
/// Keeps insertion order; setting a key twice keeps the later value in the
/// original position.
#[derive(Clone, Default, PartialEq)]
pub struct Changes {
    entries: SmallVec<[(StateKey, Value); 4]>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any earlier proposal for the same key
    pub fn set(&mut self, key: impl Into<StateKey>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Chaining form of [`Changes::set`]
    pub fn with(mut self, key: impl Into<StateKey>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Overlay `other` onto these changes; `other` wins on shared keys
    pub fn merge(&mut self, other: Changes) {
        for (key, value) in other.entries {
            self.set(key, value);
        }
    }
}

impl<K: Into<StateKey>, V: Into<Value>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut changes = Changes::new();
        for (key, value) in iter {
            changes.set(key, value);
        }
        changes
    }
}

impl<K: Into<StateKey>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Changes {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl fmt::Debug for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Build [`Changes`] from `key => value` pairs
///
/// ```rust
/// use kite_core::changes;
///
/// let changes = changes! { "selected_index" => 2, "opened" => true };
/// assert_eq!(changes.len(), 2);
/// assert!(changes! {}.is_empty());
/// ```
#[macro_export]
macro_rules! changes {
    () => {
        $crate::Changes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut changes = $crate::Changes::new();
        $(changes.set($key, $value);)+
        changes
    }};
}

// =============================================================================
// CHANGED FIELDS
// =============================================================================

/// The set of keys whose values changed, in first-changed order
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChangedFields {
    keys: IndexSet<StateKey, FxBuildHasher>,
}

impl ChangedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<StateKey>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// True if any of `keys` changed
    pub fn contains_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|key| self.contains(key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateKey> {
        self.keys.iter()
    }

    /// Union `other` into this set
    pub fn extend(&mut self, other: &ChangedFields) {
        self.keys.extend(other.keys.iter().cloned());
    }

    /// Take the contents, leaving this set empty
    pub fn take(&mut self) -> ChangedFields {
        std::mem::take(self)
    }

    pub fn to_vec(&self) -> Vec<StateKey> {
        self.keys.iter().cloned().collect()
    }
}

impl<K: Into<StateKey>> FromIterator<K> for ChangedFields {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        ChangedFields {
            keys: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for ChangedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys.iter()).finish()
    }
}

/// Keys in `changes` whose proposed value differs from the one in `state`
///
/// A missing key is distinct from one holding `Value::Null`: proposing `Null`
/// for an absent field adds the field, so it counts as a change.
pub fn fields_changed(state: &Snapshot, changes: &Changes) -> ChangedFields {
    changes
        .iter()
        .filter(|(key, value)| state.get(key.as_str()) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect()
}
