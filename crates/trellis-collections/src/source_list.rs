//! The canonical mutable backing store behind a collection.
//!
//! `SourceList<T>` owns the ordered sequence of items. Every mutation is
//! atomic per call and emits exactly one [`ChangeSet`] on
//! [`changed`](SourceList::changed), reflecting the precise index-level
//! transformation applied, so downstream pipelines patch incrementally
//! instead of rebuilding. Mutations from different threads are serialized
//! with their emissions, so observers always receive change-sets in the
//! order the edits took effect.
//!
//! A list constructed with [`SourceList::read_only`] turns every mutator
//! into a silent no-op: intentional behavior for collections bound over
//! data the consumer must not edit, not an error.

use parking_lot::{Mutex, RwLock};
use trellis_core::{CollectionItem, ItemKey, Signal};

use crate::change::{Change, ChangeSet};

/// The raw mutable backing store emitting an ordered change stream.
pub struct SourceList<T> {
    items: RwLock<Vec<T>>,
    /// Held across each mutation and its emission, so concurrent callers
    /// publish change-sets in the same order the edits were applied.
    /// Reads go straight to `items` and never take this lock.
    mutation: Mutex<()>,
    changed: Signal<ChangeSet<T>>,
    read_only: bool,
}

impl<T: CollectionItem> Default for SourceList<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: CollectionItem> SourceList<T> {
    /// Creates a list owning the given items. No change is emitted for
    /// the initial contents.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            mutation: Mutex::new(()),
            changed: Signal::new(),
            read_only: false,
        }
    }

    /// Creates a read-only list: every mutator is a silent no-op.
    pub fn read_only(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            mutation: Mutex::new(()),
            changed: Signal::new(),
            read_only: true,
        }
    }

    /// The change stream. One [`ChangeSet`] per mutation, in call order.
    pub fn changed(&self) -> &Signal<ChangeSet<T>> {
        &self.changed
    }

    /// Whether this list rejects mutation.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Clone of the item at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// Clone of the whole sequence in source order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Position of the item with the given key, if present.
    pub fn position_of(&self, key: ItemKey) -> Option<usize> {
        self.items.read().iter().position(|item| item.key() == key)
    }

    /// Returns `true` if an item with the given key is present.
    pub fn contains_key(&self, key: ItemKey) -> bool {
        self.position_of(key).is_some()
    }

    fn rejected(&self, op: &'static str) -> bool {
        if self.read_only {
            tracing::debug!(
                target: "trellis_collections::source_list",
                op,
                "mutation ignored on read-only source list"
            );
        }
        self.read_only
    }

    /// Appends an item to the end of the list.
    pub fn push(&self, item: T) {
        if self.rejected("push") {
            return;
        }
        let _order = self.mutation.lock();
        let index = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.changed.emit(ChangeSet::single(Change::Insert { index, item }));
    }

    /// Inserts an item at the given position.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, item: T) {
        if self.rejected("insert") {
            return;
        }
        let _order = self.mutation.lock();
        self.items.write().insert(index, item.clone());
        self.changed.emit(ChangeSet::single(Change::Insert { index, item }));
    }

    /// Appends every item from the iterator as one change-set.
    pub fn extend<I>(&self, new_items: I)
    where
        I: IntoIterator<Item = T>,
    {
        if self.rejected("extend") {
            return;
        }
        let _order = self.mutation.lock();
        let mut patch = ChangeSet::new();
        {
            let mut items = self.items.write();
            for item in new_items {
                let index = items.len();
                items.push(item.clone());
                patch.push(Change::Insert { index, item });
            }
        }
        if !patch.is_empty() {
            self.changed.emit(patch);
        }
    }

    /// Removes the item with the given key.
    ///
    /// Returns the removed item, or `None` if the key is absent or the
    /// list is read-only.
    pub fn remove_key(&self, key: ItemKey) -> Option<T> {
        if self.rejected("remove_key") {
            return None;
        }
        let _order = self.mutation.lock();
        let (index, item) = {
            let mut items = self.items.write();
            let index = items.iter().position(|item| item.key() == key)?;
            (index, items.remove(index))
        };
        self.changed.emit(ChangeSet::single(Change::Remove {
            index,
            item: item.clone(),
        }));
        Some(item)
    }

    /// Removes the item at the given position.
    ///
    /// Returns `None` if the list is read-only.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        if self.rejected("remove_at") {
            return None;
        }
        let _order = self.mutation.lock();
        let item = self.items.write().remove(index);
        self.changed.emit(ChangeSet::single(Change::Remove {
            index,
            item: item.clone(),
        }));
        Some(item)
    }

    /// Removes every item whose key is in the iterator, as one change-set.
    ///
    /// Returns the number of items removed.
    pub fn remove_many<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = ItemKey>,
    {
        if self.rejected("remove_many") {
            return 0;
        }
        let _order = self.mutation.lock();
        let mut patch = ChangeSet::new();
        {
            let mut items = self.items.write();
            for key in keys {
                if let Some(index) = items.iter().position(|item| item.key() == key) {
                    let item = items.remove(index);
                    patch.push(Change::Remove { index, item });
                }
            }
        }
        let removed = patch.len();
        if removed > 0 {
            self.changed.emit(patch);
        }
        removed
    }

    /// Replaces the item at the given position, returning the old item.
    ///
    /// Returns `None` if the list is read-only.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn replace_at(&self, index: usize, item: T) -> Option<T> {
        if self.rejected("replace_at") {
            return None;
        }
        let _order = self.mutation.lock();
        let old = {
            let mut items = self.items.write();
            std::mem::replace(&mut items[index], item.clone())
        };
        self.changed.emit(ChangeSet::single(Change::Replace {
            index,
            old: old.clone(),
            new: item,
        }));
        Some(old)
    }

    /// Moves the item at `from` so it ends up at `to`.
    ///
    /// # Panics
    ///
    /// Panics if `from` or `to` is out of bounds.
    pub fn move_item(&self, from: usize, to: usize) {
        if self.rejected("move_item") || from == to {
            return;
        }
        let _order = self.mutation.lock();
        let item = {
            let mut items = self.items.write();
            let item = items.remove(from);
            items.insert(to, item.clone());
            item
        };
        self.changed.emit(ChangeSet::single(Change::Move { from, to, item }));
    }

    /// Removes all items.
    pub fn clear(&self) {
        if self.rejected("clear") {
            return;
        }
        let _order = self.mutation.lock();
        let was_empty = {
            let mut items = self.items.write();
            let was_empty = items.is_empty();
            items.clear();
            was_empty
        };
        if !was_empty {
            self.changed.emit(ChangeSet::single(Change::Clear));
        }
    }

    /// Replaces the entire contents.
    ///
    /// Emits a single change-set: `Clear` followed by one `Insert` per
    /// new item, so observers can apply it as an exact patch.
    pub fn set(&self, new_items: Vec<T>) {
        if self.rejected("set") {
            return;
        }
        let _order = self.mutation.lock();
        let mut patch = ChangeSet::new();
        {
            let mut items = self.items.write();
            if !items.is_empty() {
                patch.push(Change::Clear);
            }
            items.clear();
            for item in new_items {
                let index = items.len();
                items.push(item.clone());
                patch.push(Change::Insert { index, item });
            }
        }
        if !patch.is_empty() {
            self.changed.emit(patch);
        }
    }

    /// Announces that the item at `index` changed in place.
    ///
    /// Emits a `Refresh` change without touching the sequence; pipelines
    /// react by re-evaluating the item's filter and sort placement.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn refresh_at(&self, index: usize) {
        let _order = self.mutation.lock();
        let item = self.items.read()[index].clone();
        self.changed
            .emit(ChangeSet::single(Change::Refresh { index, item }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use trellis_core::PropertyValue;

    #[derive(Clone)]
    struct Entry {
        key: ItemKey,
        name: &'static str,
    }

    impl Entry {
        fn new(name: &'static str) -> Self {
            Self {
                key: ItemKey::next(),
                name,
            }
        }
    }

    impl CollectionItem for Entry {
        fn key(&self) -> ItemKey {
            self.key
        }

        fn property(&self, name: &str) -> PropertyValue {
            match name {
                "name" => PropertyValue::from(self.name),
                _ => PropertyValue::None,
            }
        }
    }

    fn record_changes(list: &SourceList<Entry>) -> Arc<Mutex<Vec<ChangeSet<Entry>>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let recv = received.clone();
        list.changed().connect(move |patch| {
            recv.lock().push(patch.clone());
        });
        received
    }

    fn names(list: &SourceList<Entry>) -> Vec<&'static str> {
        list.snapshot().iter().map(|e| e.name).collect()
    }

    #[test]
    fn push_emits_insert() {
        let list = SourceList::new(vec![]);
        let changes = record_changes(&list);

        list.push(Entry::new("a"));

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            changes[0].iter().next(),
            Some(Change::Insert { index: 0, .. })
        ));
    }

    #[test]
    fn extend_emits_one_changeset() {
        let list = SourceList::new(vec![Entry::new("a")]);
        let changes = record_changes(&list);

        list.extend(vec![Entry::new("b"), Entry::new("c")]);

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].len(), 2);
        assert_eq!(names(&list), vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_key_emits_remove() {
        let target = Entry::new("b");
        let list = SourceList::new(vec![Entry::new("a"), target.clone()]);
        let changes = record_changes(&list);

        let removed = list.remove_key(target.key()).unwrap();
        assert_eq!(removed.name, "b");
        assert_eq!(names(&list), vec!["a"]);

        let changes = changes.lock();
        assert!(matches!(
            changes[0].iter().next(),
            Some(Change::Remove { index: 1, .. })
        ));
    }

    #[test]
    fn remove_key_absent_is_none() {
        let list = SourceList::new(vec![Entry::new("a")]);
        assert!(list.remove_key(ItemKey::next()).is_none());
    }

    #[test]
    fn set_emits_clear_then_inserts() {
        let list = SourceList::new(vec![Entry::new("a")]);
        let changes = record_changes(&list);

        list.set(vec![Entry::new("x"), Entry::new("y")]);

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        let ops: Vec<_> = changes[0].iter().collect();
        assert!(matches!(ops[0], Change::Clear));
        assert!(matches!(ops[1], Change::Insert { index: 0, .. }));
        assert!(matches!(ops[2], Change::Insert { index: 1, .. }));
    }

    #[test]
    fn changesets_reconstruct_state() {
        let list = SourceList::new(vec![]);
        let mirror = Arc::new(Mutex::new(Vec::<Entry>::new()));
        let mirror_clone = mirror.clone();
        list.changed().connect(move |patch| {
            patch.apply_to(&mut mirror_clone.lock());
        });

        list.push(Entry::new("a"));
        list.extend(vec![Entry::new("b"), Entry::new("c")]);
        list.insert(1, Entry::new("d"));
        list.move_item(0, 2);
        list.remove_at(1);
        list.set(vec![Entry::new("z")]);

        let mirrored: Vec<_> = mirror.lock().iter().map(|e| e.name).collect();
        assert_eq!(mirrored, names(&list));
    }

    #[test]
    fn concurrent_mutations_emit_in_application_order() {
        // A mirror kept purely by applying emitted patches must match the
        // list exactly, even with several threads mutating at once. Out of
        // order emission would desynchronize the mirror or make a patch
        // index land out of bounds.
        let list = Arc::new(SourceList::new(vec![]));
        let mirror = Arc::new(Mutex::new(Vec::<Entry>::new()));
        let mirror_clone = mirror.clone();
        list.changed().connect(move |patch| {
            patch.apply_to(&mut mirror_clone.lock());
        });

        let mut handles = vec![];
        for _ in 0..4 {
            let list = list.clone();
            handles.push(std::thread::spawn(move || {
                for round in 0..50 {
                    let entry = Entry::new("w");
                    let key = entry.key();
                    list.push(entry);
                    if round % 3 == 0 {
                        list.remove_key(key);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mirrored: Vec<ItemKey> = mirror.lock().iter().map(|e| e.key()).collect();
        let actual: Vec<ItemKey> = list.snapshot().iter().map(|e| e.key()).collect();
        assert_eq!(mirrored, actual);
    }

    #[test]
    fn read_only_mutators_are_silent_noops() {
        let list = SourceList::read_only(vec![Entry::new("a")]);
        let changes = record_changes(&list);

        list.push(Entry::new("b"));
        list.extend(vec![Entry::new("c")]);
        assert!(list.remove_at(0).is_none());
        assert_eq!(list.remove_many(vec![ItemKey::next()]), 0);
        list.clear();
        list.set(vec![]);

        assert_eq!(list.len(), 1);
        assert!(changes.lock().is_empty());
    }

    #[test]
    fn refresh_at_emits_refresh() {
        let list = SourceList::new(vec![Entry::new("a")]);
        let changes = record_changes(&list);

        list.refresh_at(0);

        let changes = changes.lock();
        assert!(matches!(
            changes[0].iter().next(),
            Some(Change::Refresh { index: 0, .. })
        ));
        assert_eq!(list.len(), 1);
    }
}
