//! Composite filters and the live filter set.
//!
//! A [`FilterSet`] is an ordered, shared collection of named predicates.
//! The set compiles its filters into one combined predicate by
//! left-folding with each filter's own [`FilterOp`] tag; the first
//! filter seeds the accumulator, so its tag never participates. With
//! filters `[f1(And), f2(Or), f3(And)]` the combined predicate is
//! `(f1 || f2) && f3`.
//!
//! Handles are cheap `Arc` clones over shared state, so a filter set can
//! be mutated from view-model code while a collection holds the same set
//! and reacts through [`FilterSet::changed`].

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use trellis_core::Signal;

/// How a filter combines with the predicate accumulated so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterOp {
    /// Logical AND with the accumulated predicate.
    #[default]
    And,
    /// Logical OR with the accumulated predicate.
    Or,
}

/// Boxed predicate over items.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A named predicate with a combination tag.
///
/// The property name is advisory: it tells the collection which item
/// property this filter depends on, so a property-changed notification
/// for that name triggers a re-filter. An empty name means the filter
/// depends on no single property and is never re-run by property
/// notifications alone.
#[derive(Clone)]
pub struct CompositeFilter<T> {
    property: String,
    op: FilterOp,
    predicate: FilterFn<T>,
}

impl<T> CompositeFilter<T> {
    /// Creates a filter watching the given property name.
    pub fn new(
        property: impl Into<String>,
        op: FilterOp,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            property: property.into(),
            op,
            predicate: Arc::new(predicate),
        }
    }

    /// Creates a filter not tied to any property.
    pub fn unnamed(op: FilterOp, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self::new("", op, predicate)
    }

    /// The watched property name; empty when untied.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// The combination tag.
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Evaluates the filter's own predicate, ignoring the tag.
    pub fn accepts(&self, item: &T) -> bool {
        (self.predicate)(item)
    }
}

struct FilterSetState<T> {
    filters: Vec<CompositeFilter<T>>,
    // Combined predicate compiled for `compiled_generation`.
    compiled: Option<FilterFn<T>>,
    compiled_generation: u64,
}

struct FilterSetInner<T> {
    state: Mutex<FilterSetState<T>>,
    generation: AtomicU64,
    changed: Signal<()>,
}

/// An ordered, live, shared set of composite filters.
pub struct FilterSet<T> {
    inner: Arc<FilterSetInner<T>>,
}

impl<T> Clone for FilterSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for FilterSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> FilterSet<T> {
    /// Creates an empty filter set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FilterSetInner {
                state: Mutex::new(FilterSetState {
                    filters: Vec::new(),
                    compiled: None,
                    compiled_generation: 0,
                }),
                generation: AtomicU64::new(1),
                changed: Signal::new(),
            }),
        }
    }

    /// Emitted after every structural mutation of the set.
    pub fn changed(&self) -> &Signal<()> {
        &self.inner.changed
    }

    /// Number of filters in the set.
    pub fn len(&self) -> usize {
        self.inner.state.lock().filters.len()
    }

    /// Returns `true` if the set holds no filters.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().filters.is_empty()
    }

    /// Monotonic counter bumped on every mutation. Observers compare
    /// generations to detect staleness without holding the lock.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    fn mutated(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(
            target: "trellis_collections::filter",
            generation = self.generation(),
            "filter set changed"
        );
        self.inner.changed.emit(());
    }

    /// Appends a filter to the end of the set.
    pub fn add(&self, filter: CompositeFilter<T>) {
        self.inner.state.lock().filters.push(filter);
        self.mutated();
    }

    /// Inserts a filter at the given position.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, filter: CompositeFilter<T>) {
        self.inner.state.lock().filters.insert(index, filter);
        self.mutated();
    }

    /// Removes the filter at the given position.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove_at(&self, index: usize) -> CompositeFilter<T> {
        let filter = self.inner.state.lock().filters.remove(index);
        self.mutated();
        filter
    }

    /// Removes every filter watching the given property.
    ///
    /// Returns the number of filters removed.
    pub fn remove_property(&self, property: &str) -> usize {
        let removed = {
            let mut state = self.inner.state.lock();
            let before = state.filters.len();
            state.filters.retain(|f| f.property() != property);
            before - state.filters.len()
        };
        if removed > 0 {
            self.mutated();
        }
        removed
    }

    /// Removes all filters.
    pub fn clear(&self) {
        let was_empty = {
            let mut state = self.inner.state.lock();
            let was_empty = state.filters.is_empty();
            state.filters.clear();
            was_empty
        };
        if !was_empty {
            self.mutated();
        }
    }

    /// Set of non-empty watched property names.
    pub fn watched_properties(&self) -> HashSet<String> {
        self.inner
            .state
            .lock()
            .filters
            .iter()
            .filter(|f| !f.property().is_empty())
            .map(|f| f.property().to_string())
            .collect()
    }

    /// The combined predicate for the current set contents.
    ///
    /// Compiled lazily and cached against the generation counter; repeat
    /// calls without intervening mutation return the same `Arc`.
    pub fn predicate(&self) -> FilterFn<T> {
        let generation = self.generation();
        let mut state = self.inner.state.lock();
        if state.compiled_generation == generation {
            if let Some(compiled) = &state.compiled {
                return compiled.clone();
            }
        }
        let compiled = Self::compile(&state.filters);
        state.compiled = Some(compiled.clone());
        state.compiled_generation = generation;
        compiled
    }

    fn compile(filters: &[CompositeFilter<T>]) -> FilterFn<T> {
        match filters {
            [] => Arc::new(|_| true),
            [only] => only.predicate.clone(),
            [seed, rest @ ..] => {
                let mut acc = seed.predicate.clone();
                for filter in rest {
                    let lhs = acc;
                    let rhs = filter.predicate.clone();
                    acc = match filter.op {
                        FilterOp::And => Arc::new(move |item: &T| lhs(item) && rhs(item)),
                        FilterOp::Or => Arc::new(move |item: &T| lhs(item) || rhs(item)),
                    };
                }
                acc
            }
        }
    }
}
