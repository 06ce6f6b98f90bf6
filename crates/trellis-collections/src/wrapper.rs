//! Wrapper collection: a derived-object cache over a live collection.
//!
//! View-model layers rarely bind UI to domain items directly; they bind
//! to per-item wrapper objects (row view-models). An
//! [`ExtendedWrapperCollection`] owns an [`ExtendedCollection`] and a
//! cache of wrappers keyed by item identity, guaranteeing at most one
//! wrapper per item even under concurrent lookups.
//!
//! A wrapper lives exactly as long as its item is in the collection:
//! items hidden by a filter keep their wrappers (re-admission to the
//! items view is cheap), while an item leaving the source view evicts
//! and detaches its wrapper. Teardown detaches every cached wrapper.
//!
//! The collection's change streams are re-emitted 1:1 in wrapper terms
//! through [`connect_wrappers`](ExtendedWrapperCollection::connect_wrappers)
//! and friends, so binding layers can mirror the wrapper views with the
//! same patches they would use for items.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use trellis_core::{CollectionItem, ConnectionId, ItemKey, Signal};

use crate::change::{Change, ChangeSet};
use crate::collection::{CollectionChanges, ExtendedCollection};

/// A wrapper type constructible from the item it wraps.
///
/// `detach` is the teardown hook: it runs when the wrapper is evicted
/// from the cache, which happens when its item leaves the collection or
/// the wrapper collection is dropped. The default is a no-op.
pub trait WrapItem<T>: Clone + Send + Sync + 'static {
    /// Builds the wrapper for an item.
    fn wrap(item: T) -> Self;

    /// Releases resources held against the item.
    fn detach(&self) {}
}

struct WrapperInner<T, W> {
    cache: RwLock<HashMap<ItemKey, W>>,
    factory: Box<dyn Fn(T) -> W + Send + Sync>,
    detach: Box<dyn Fn(&W) + Send + Sync>,
    changed: Signal<CollectionChanges<W>>,
}

impl<T: CollectionItem, W: Clone + Send + Sync + 'static> WrapperInner<T, W> {
    /// Cache hit on the read lock, double-checked construction under the
    /// write lock. At most one wrapper is ever built per key.
    fn get_or_create(&self, item: &T) -> W {
        let key = item.key();
        if let Some(wrapper) = self.cache.read().get(&key) {
            return wrapper.clone();
        }
        let mut cache = self.cache.write();
        if let Some(wrapper) = cache.get(&key) {
            return wrapper.clone();
        }
        tracing::trace!(
            target: "trellis_collections::wrapper",
            "creating wrapper"
        );
        let wrapper = (self.factory)(item.clone());
        cache.insert(key, wrapper.clone());
        wrapper
    }

    fn evict(&self, key: ItemKey) {
        let wrapper = self.cache.write().remove(&key);
        if let Some(wrapper) = wrapper {
            (self.detach)(&wrapper);
        }
    }

    fn evict_all(&self) {
        let drained: Vec<W> = {
            let mut cache = self.cache.write();
            cache.drain().map(|(_, w)| w).collect()
        };
        for wrapper in &drained {
            (self.detach)(wrapper);
        }
    }

    fn map_changeset(&self, changes: &ChangeSet<T>) -> ChangeSet<W> {
        let mut mapped = ChangeSet::new();
        for change in changes {
            match change {
                Change::Insert { index, item } => mapped.push(Change::Insert {
                    index: *index,
                    item: self.get_or_create(item),
                }),
                Change::Remove { index, item } => mapped.push(Change::Remove {
                    index: *index,
                    item: self.get_or_create(item),
                }),
                Change::Replace { index, old, new } => mapped.push(Change::Replace {
                    index: *index,
                    old: self.get_or_create(old),
                    new: self.get_or_create(new),
                }),
                Change::Move { from, to, item } => mapped.push(Change::Move {
                    from: *from,
                    to: *to,
                    item: self.get_or_create(item),
                }),
                Change::Clear => mapped.push(Change::Clear),
                Change::Refresh { index, item } => mapped.push(Change::Refresh {
                    index: *index,
                    item: self.get_or_create(item),
                }),
            }
        }
        mapped
    }

    /// Maps one combined emission, then evicts wrappers whose items left
    /// the source view. Mapping runs first so removal payloads still
    /// resolve to the cached wrapper.
    fn apply(&self, changes: &CollectionChanges<T>) {
        let wrapped = CollectionChanges {
            source: self.map_changeset(&changes.source),
            items: self.map_changeset(&changes.items),
        };

        for change in &changes.source {
            match change {
                Change::Remove { item, .. } => self.evict(item.key()),
                Change::Replace { old, .. } => self.evict(old.key()),
                Change::Clear => self.evict_all(),
                _ => {}
            }
        }

        if !wrapped.is_empty() {
            self.changed.emit(wrapped);
        }
    }
}

/// A live collection paired with a per-item wrapper cache.
///
/// Dereferences to its inner [`ExtendedCollection`], so mutation,
/// filtering, sorting, and deferral are used exactly as on the item
/// collection.
pub struct ExtendedWrapperCollection<T: CollectionItem, W: Clone + Send + Sync + 'static> {
    collection: ExtendedCollection<T>,
    inner: Arc<WrapperInner<T, W>>,
    conn: ConnectionId,
}

impl<T: CollectionItem, W: WrapItem<T>> ExtendedWrapperCollection<T, W> {
    /// Wraps a collection, building wrappers through [`WrapItem::wrap`].
    pub fn new(collection: ExtendedCollection<T>) -> Self {
        Self::with_factory_and_detach(collection, W::wrap, |w: &W| w.detach())
    }
}

impl<T: CollectionItem, W: Clone + Send + Sync + 'static> ExtendedWrapperCollection<T, W> {
    /// Wraps a collection with a closure factory, for wrapper types that
    /// need construction context beyond the item itself.
    pub fn with_factory<F>(collection: ExtendedCollection<T>, factory: F) -> Self
    where
        F: Fn(T) -> W + Send + Sync + 'static,
    {
        Self::with_factory_and_detach(collection, factory, |_| {})
    }

    /// Wraps a collection with a closure factory and an eviction hook.
    pub fn with_factory_and_detach<F, D>(
        collection: ExtendedCollection<T>,
        factory: F,
        detach: D,
    ) -> Self
    where
        F: Fn(T) -> W + Send + Sync + 'static,
        D: Fn(&W) + Send + Sync + 'static,
    {
        let inner = Arc::new(WrapperInner {
            cache: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
            detach: Box::new(detach),
            changed: Signal::new(),
        });

        // Pre-populate for the collection's current contents.
        for item in collection.source_items() {
            let _ = inner.get_or_create(&item);
        }

        let weak: Weak<WrapperInner<T, W>> = Arc::downgrade(&inner);
        let conn = collection.changed().connect(move |changes| {
            if let Some(inner) = weak.upgrade() {
                inner.apply(changes);
            }
        });

        Self {
            collection,
            inner,
            conn,
        }
    }

    /// Snapshot of the filtered items view, as wrappers.
    pub fn wrappers(&self) -> Vec<W> {
        self.collection
            .items()
            .iter()
            .map(|item| self.inner.get_or_create(item))
            .collect()
    }

    /// Snapshot of the sorted-only source view, as wrappers.
    pub fn wrappers_source(&self) -> Vec<W> {
        self.collection
            .source_items()
            .iter()
            .map(|item| self.inner.get_or_create(item))
            .collect()
    }

    /// The wrapper for the item with the given key, creating it if the
    /// item is in the collection and not yet wrapped.
    pub fn wrapper_of(&self, key: ItemKey) -> Option<W> {
        self.collection
            .get(key)
            .map(|item| self.inner.get_or_create(&item))
    }

    /// Number of cached wrappers. Filtered-out items stay cached, so this
    /// tracks the source view, not the items view.
    pub fn cached_len(&self) -> usize {
        self.inner.cache.read().len()
    }

    /// The combined wrapper change stream.
    pub fn wrapped_changed(&self) -> &Signal<CollectionChanges<W>> {
        &self.inner.changed
    }

    /// Connects a slot to the wrapper items-view change stream.
    pub fn connect_wrappers<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&ChangeSet<W>) + Send + Sync + 'static,
    {
        self.inner.changed.connect(move |changes| {
            if !changes.items.is_empty() {
                slot(&changes.items);
            }
        })
    }

    /// Connects a slot to the wrapper source-view change stream.
    pub fn connect_wrappers_source<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&ChangeSet<W>) + Send + Sync + 'static,
    {
        self.inner.changed.connect(move |changes| {
            if !changes.source.is_empty() {
                slot(&changes.source);
            }
        })
    }

    /// The wrapped item collection.
    pub fn collection(&self) -> &ExtendedCollection<T> {
        &self.collection
    }
}

impl<T: CollectionItem, W: Clone + Send + Sync + 'static> Deref
    for ExtendedWrapperCollection<T, W>
{
    type Target = ExtendedCollection<T>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

impl<T: CollectionItem, W: Clone + Send + Sync + 'static> Drop
    for ExtendedWrapperCollection<T, W>
{
    fn drop(&mut self) {
        self.collection.disconnect(self.conn);
        self.inner.evict_all();
    }
}
