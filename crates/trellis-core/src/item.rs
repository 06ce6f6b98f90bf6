//! Item capability model for collection elements.
//!
//! The collection pipeline treats elements as opaque values with three
//! explicit capabilities instead of runtime type inspection:
//!
//! - **Identity**: every item carries a stable [`ItemKey`]; derived caches
//!   and the diff engine key on it.
//! - **Named properties**: [`CollectionItem::property`] exposes values by
//!   name as [`PropertyValue`], which is what the sort comparer (and any
//!   property-based filter) reads.
//! - **Observability**: items that notify about property changes return a
//!   `Signal<String>` carrying the changed property's name from
//!   [`CollectionItem::property_changed`]. Plain items return `None`; the
//!   capability is checked once at subscribe time, not per event.
//!
//! Items are expected to be cheap-clone handles (`Arc`-backed) so views
//! and change-sets can carry them by value.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::signal::Signal;

/// Global key counter for [`ItemKey::next`].
static NEXT_ITEM_KEY: AtomicU64 = AtomicU64::new(1);

/// A stable identity for a collection item.
///
/// Keys are opaque; equality is the only meaningful operation. Use
/// [`ItemKey::next`] to allocate a process-unique key when constructing
/// an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(u64);

impl ItemKey {
    /// Allocate a fresh, process-unique key.
    pub fn next() -> Self {
        Self(NEXT_ITEM_KEY.fetch_add(1, AtomicOrdering::SeqCst))
    }
}

/// A tagged property value, the unit of named property access.
///
/// Cross-variant comparisons are considered equal rather than an error:
/// a heterogeneous column simply does not impose an order.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// No value for the requested property.
    None,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl PropertyValue {
    /// Returns the text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns `true` if there is no value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Compares two property values for sorting.
///
/// Same-variant values compare naturally; mixed variants (and `None`
/// against anything) compare equal, leaving the tie-break to the
/// collection's stable ordering.
pub fn compare_values(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    match (a, b) {
        (PropertyValue::Text(sa), PropertyValue::Text(sb)) => sa.cmp(sb),
        (PropertyValue::Int(ia), PropertyValue::Int(ib)) => ia.cmp(ib),
        (PropertyValue::Float(fa), PropertyValue::Float(fb)) => {
            fa.partial_cmp(fb).unwrap_or(Ordering::Equal)
        }
        (PropertyValue::Bool(ba), PropertyValue::Bool(bb)) => ba.cmp(bb),
        _ => Ordering::Equal,
    }
}

/// The capability contract collection elements implement.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use parking_lot::RwLock;
/// use trellis_core::{CollectionItem, ItemKey, PropertyValue, Signal};
///
/// #[derive(Clone)]
/// struct Task {
///     inner: Arc<TaskInner>,
/// }
///
/// struct TaskInner {
///     key: ItemKey,
///     title: RwLock<String>,
///     property_changed: Signal<String>,
/// }
///
/// impl Task {
///     fn new(title: &str) -> Self {
///         Self {
///             inner: Arc::new(TaskInner {
///                 key: ItemKey::next(),
///                 title: RwLock::new(title.to_string()),
///                 property_changed: Signal::new(),
///             }),
///         }
///     }
///
///     fn set_title(&self, title: &str) {
///         *self.inner.title.write() = title.to_string();
///         self.inner.property_changed.emit("title".to_string());
///     }
/// }
///
/// impl CollectionItem for Task {
///     fn key(&self) -> ItemKey {
///         self.inner.key
///     }
///
///     fn property(&self, name: &str) -> PropertyValue {
///         match name {
///             "title" => PropertyValue::from(self.inner.title.read().clone()),
///             _ => PropertyValue::None,
///         }
///     }
///
///     fn property_changed(&self) -> Option<&Signal<String>> {
///         Some(&self.inner.property_changed)
///     }
/// }
///
/// let task = Task::new("write docs");
/// assert_eq!(task.property("title").as_text(), Some("write docs"));
/// task.set_title("ship docs");
/// ```
pub trait CollectionItem: Clone + Send + Sync + 'static {
    /// Stable identity of this item. Clones of the same logical item must
    /// return the same key.
    fn key(&self) -> ItemKey;

    /// Value of the named property, or [`PropertyValue::None`] when the
    /// item has no such property.
    fn property(&self, name: &str) -> PropertyValue;

    /// Optional change notification: a signal carrying the name of the
    /// property that changed. The default is `None` (plain item).
    ///
    /// All clones of one logical item must share the same signal, which
    /// is why observable items are typically `Arc`-backed handles.
    fn property_changed(&self) -> Option<&Signal<String>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_keys_are_unique() {
        let keys: Vec<ItemKey> = (0..100).map(|_| ItemKey::next()).collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn item_keys_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..50).map(|_| ItemKey::next()).collect::<Vec<_>>()))
            .collect();

        let mut all: Vec<ItemKey> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn compare_same_variants() {
        assert_eq!(
            compare_values(&PropertyValue::from("a"), &PropertyValue::from("b")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&PropertyValue::from(3i64), &PropertyValue::from(3i64)),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&PropertyValue::from(2.5), &PropertyValue::from(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&PropertyValue::from(true), &PropertyValue::from(false)),
            Ordering::Greater
        );
    }

    #[test]
    fn mixed_variants_compare_equal() {
        assert_eq!(
            compare_values(&PropertyValue::from("a"), &PropertyValue::from(1i64)),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&PropertyValue::None, &PropertyValue::from("x")),
            Ordering::Equal
        );
    }

    #[test]
    fn nan_compares_equal() {
        assert_eq!(
            compare_values(
                &PropertyValue::Float(f64::NAN),
                &PropertyValue::Float(1.0)
            ),
            Ordering::Equal
        );
    }

    #[test]
    fn accessors() {
        assert_eq!(PropertyValue::from("x").as_text(), Some("x"));
        assert_eq!(PropertyValue::from(7i64).as_int(), Some(7));
        assert!(PropertyValue::None.is_none());
        assert_eq!(PropertyValue::from(7i64).as_text(), None);
    }
}
