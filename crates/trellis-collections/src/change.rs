//! Change-set model: ordered, index-level collection patches.
//!
//! Every mutation of a collection produces exactly one [`ChangeSet`]: an
//! ordered batch of [`Change`] operations that, applied sequentially to
//! the old state, reconstructs the new state exactly. Downstream
//! observers apply the patch incrementally instead of recomputing from
//! scratch, and data-binding layers translate the same operations into
//! their own insert/remove/move notifications.

/// A single index-level operation in a change-set.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// `item` was inserted at `index`.
    Insert {
        /// Position of the new item after insertion.
        index: usize,
        /// The inserted item.
        item: T,
    },
    /// The item at `index` was removed.
    Remove {
        /// Position of the item before removal.
        index: usize,
        /// The removed item.
        item: T,
    },
    /// The item at `index` was replaced.
    Replace {
        /// Position of the replaced item.
        index: usize,
        /// The previous item.
        old: T,
        /// The new item.
        new: T,
    },
    /// The item moved from `from` to `to`.
    Move {
        /// Position before the move.
        from: usize,
        /// Position after the move.
        to: usize,
        /// The moved item.
        item: T,
    },
    /// All items were removed.
    Clear,
    /// The item at `index` changed in place and should be re-read.
    Refresh {
        /// Position of the refreshed item.
        index: usize,
        /// The refreshed item.
        item: T,
    },
}

/// An ordered batch of changes describing one collection transition.
///
/// # Example
///
/// ```
/// use trellis_collections::{Change, ChangeSet};
///
/// let mut state = vec!["a", "c"];
/// let patch = ChangeSet::from(vec![
///     Change::Insert { index: 1, item: "b" },
///     Change::Remove { index: 2, item: "c" },
/// ]);
/// patch.apply_to(&mut state);
/// assert_eq!(state, vec!["a", "b"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<T> {
    changes: Vec<Change<T>>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChangeSet<T> {
    /// Creates an empty change-set.
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Creates a change-set holding a single operation.
    pub fn single(change: Change<T>) -> Self {
        Self {
            changes: vec![change],
        }
    }

    /// Appends an operation to the batch.
    pub fn push(&mut self, change: Change<T>) {
        self.changes.push(change);
    }

    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates the operations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Change<T>> {
        self.changes.iter()
    }
}

impl<T> From<Vec<Change<T>>> for ChangeSet<T> {
    fn from(changes: Vec<Change<T>>) -> Self {
        Self { changes }
    }
}

impl<T> IntoIterator for ChangeSet<T> {
    type Item = Change<T>;
    type IntoIter = std::vec::IntoIter<Change<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ChangeSet<T> {
    type Item = &'a Change<T>;
    type IntoIter = std::slice::Iter<'a, Change<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

impl<T: Clone> ChangeSet<T> {
    /// Applies the batch to a mirror of the old state.
    ///
    /// After this call `target` equals the new state the change-set
    /// describes. Used by tests and by consumers that keep their own copy
    /// of a view.
    ///
    /// # Panics
    ///
    /// Panics if an operation's index is out of bounds for `target`,
    /// which means the patch is being applied to the wrong base state.
    pub fn apply_to(&self, target: &mut Vec<T>) {
        for change in &self.changes {
            match change {
                Change::Insert { index, item } => target.insert(*index, item.clone()),
                Change::Remove { index, .. } => {
                    target.remove(*index);
                }
                Change::Replace { index, new, .. } => target[*index] = new.clone(),
                Change::Move { from, to, .. } => {
                    let item = target.remove(*from);
                    target.insert(*to, item);
                }
                Change::Clear => target.clear(),
                Change::Refresh { index, item } => target[*index] = item.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_insert_remove() {
        let mut state = vec![1, 3];
        let patch = ChangeSet::from(vec![
            Change::Insert { index: 1, item: 2 },
            Change::Remove { index: 0, item: 1 },
        ]);
        patch.apply_to(&mut state);
        assert_eq!(state, vec![2, 3]);
    }

    #[test]
    fn apply_replace_and_refresh() {
        let mut state = vec![10, 20];
        let patch = ChangeSet::from(vec![
            Change::Replace {
                index: 0,
                old: 10,
                new: 11,
            },
            Change::Refresh {
                index: 1,
                item: 21,
            },
        ]);
        patch.apply_to(&mut state);
        assert_eq!(state, vec![11, 21]);
    }

    #[test]
    fn apply_move() {
        let mut state = vec!['a', 'b', 'c'];
        let patch = ChangeSet::single(Change::Move {
            from: 2,
            to: 0,
            item: 'c',
        });
        patch.apply_to(&mut state);
        assert_eq!(state, vec!['c', 'a', 'b']);
    }

    #[test]
    fn apply_clear_then_insert() {
        let mut state = vec![1, 2, 3];
        let patch = ChangeSet::from(vec![
            Change::Clear,
            Change::Insert { index: 0, item: 9 },
        ]);
        patch.apply_to(&mut state);
        assert_eq!(state, vec![9]);
    }

    #[test]
    fn empty_batch_is_noop() {
        let mut state = vec![1];
        ChangeSet::<i32>::new().apply_to(&mut state);
        assert_eq!(state, vec![1]);
    }
}
