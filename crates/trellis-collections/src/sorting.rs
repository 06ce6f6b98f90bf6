//! Property-based sort descriptions and the live sorting list.
//!
//! [`SortingProperties`] is an ordered, shared list of (property name,
//! direction) pairs. Its [`comparer`](SortingProperties::comparer) reads
//! the named properties through [`CollectionItem::property`] and compares
//! them with [`compare_values`]; the first property that does not compare
//! equal decides, and `Descending` reverses that property's result.
//!
//! The comparer never breaks ties itself. Items comparing equal keep
//! their relative source order; the collection enforces that with its own
//! admission sequence numbers.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use trellis_core::{CollectionItem, Signal, compare_values};

/// Sort direction for one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key: a property name and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortingProperty {
    property: String,
    direction: SortDirection,
}

impl SortingProperty {
    /// Creates a sort key for the given property.
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            property: property.into(),
            direction,
        }
    }

    /// Ascending sort key.
    pub fn ascending(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Ascending)
    }

    /// Descending sort key.
    pub fn descending(property: impl Into<String>) -> Self {
        Self::new(property, SortDirection::Descending)
    }

    /// The sorted property name.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The sort direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Boxed item comparer.
pub type CompareFn<T> = Arc<dyn Fn(&T, &T) -> CmpOrdering + Send + Sync>;

struct SortingInner {
    properties: Mutex<Vec<SortingProperty>>,
    generation: AtomicU64,
    changed: Signal<()>,
}

/// An ordered, live, shared list of sort keys.
#[derive(Clone)]
pub struct SortingProperties {
    inner: Arc<SortingInner>,
}

impl Default for SortingProperties {
    fn default() -> Self {
        Self::new()
    }
}

impl SortingProperties {
    /// Creates an empty sorting list (unsorted collection).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SortingInner {
                properties: Mutex::new(Vec::new()),
                generation: AtomicU64::new(1),
                changed: Signal::new(),
            }),
        }
    }

    /// Emitted after every mutation of the list.
    pub fn changed(&self) -> &Signal<()> {
        &self.inner.changed
    }

    /// Number of sort keys.
    pub fn len(&self) -> usize {
        self.inner.properties.lock().len()
    }

    /// Returns `true` if no sort keys are set.
    pub fn is_empty(&self) -> bool {
        self.inner.properties.lock().is_empty()
    }

    /// Monotonic counter bumped on every mutation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Snapshot of the sort keys in priority order.
    pub fn snapshot(&self) -> Vec<SortingProperty> {
        self.inner.properties.lock().clone()
    }

    fn mutated(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(
            target: "trellis_collections::sorting",
            generation = self.generation(),
            "sorting properties changed"
        );
        self.inner.changed.emit(());
    }

    /// Appends a sort key with the lowest priority.
    pub fn add(&self, property: SortingProperty) {
        self.inner.properties.lock().push(property);
        self.mutated();
    }

    /// Inserts a sort key at the given priority.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, property: SortingProperty) {
        self.inner.properties.lock().insert(index, property);
        self.mutated();
    }

    /// Removes the sort key at the given priority.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove_at(&self, index: usize) -> SortingProperty {
        let removed = self.inner.properties.lock().remove(index);
        self.mutated();
        removed
    }

    /// Removes every key for the given property name.
    ///
    /// Returns the number of keys removed.
    pub fn remove_property(&self, property: &str) -> usize {
        let removed = {
            let mut properties = self.inner.properties.lock();
            let before = properties.len();
            properties.retain(|p| p.property() != property);
            before - properties.len()
        };
        if removed > 0 {
            self.mutated();
        }
        removed
    }

    /// Replaces all sort keys at once, emitting one change.
    pub fn set(&self, properties: Vec<SortingProperty>) {
        *self.inner.properties.lock() = properties;
        self.mutated();
    }

    /// Removes all sort keys.
    pub fn clear(&self) {
        let was_empty = {
            let mut properties = self.inner.properties.lock();
            let was_empty = properties.is_empty();
            properties.clear();
            was_empty
        };
        if !was_empty {
            self.mutated();
        }
    }

    /// Set of sorted property names.
    pub fn watched_properties(&self) -> std::collections::HashSet<String> {
        self.inner
            .properties
            .lock()
            .iter()
            .map(|p| p.property().to_string())
            .collect()
    }

    /// Builds a comparer for the current sort keys, or `None` when the
    /// list is empty (collection stays in source order).
    pub fn comparer<T: CollectionItem>(&self) -> Option<CompareFn<T>> {
        let keys = self.snapshot();
        if keys.is_empty() {
            return None;
        }
        Some(Arc::new(move |a: &T, b: &T| {
            for key in &keys {
                let ordering = compare_values(&a.property(key.property()), &b.property(key.property()));
                let ordering = match key.direction() {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != CmpOrdering::Equal {
                    return ordering;
                }
            }
            CmpOrdering::Equal
        }))
    }
}
