//! Reactive collections for Trellis.
//!
//! This crate builds the observable collection pipeline on top of
//! [`trellis-core`](trellis_core): a mutable [`SourceList`] emitting
//! index-level [`ChangeSet`] patches, live [`FilterSet`] and
//! [`SortingProperties`] descriptions, and the [`ExtendedCollection`]
//! that composes them into filtered-and-sorted views with deferred,
//! dispatcher-marshaled change notification. The
//! [`ExtendedWrapperCollection`] adds a per-item wrapper cache for
//! view-model layers.
//!
//! # Example
//!
//! ```
//! use trellis_collections::{
//!     CompositeFilter, ExtendedCollection, FilterOp, SortingProperty,
//! };
//! # use std::sync::Arc;
//! # use trellis_core::{CollectionItem, ItemKey, PropertyValue};
//! # #[derive(Clone)]
//! # struct Note { inner: Arc<(ItemKey, String, i64)> }
//! # impl Note {
//! #     fn new(title: &str, stars: i64) -> Self {
//! #         Self { inner: Arc::new((ItemKey::next(), title.to_string(), stars)) }
//! #     }
//! # }
//! # impl CollectionItem for Note {
//! #     fn key(&self) -> ItemKey { self.inner.0 }
//! #     fn property(&self, name: &str) -> PropertyValue {
//! #         match name {
//! #             "title" => PropertyValue::from(self.inner.1.clone()),
//! #             "stars" => PropertyValue::from(self.inner.2),
//! #             _ => PropertyValue::None,
//! #         }
//! #     }
//! # }
//!
//! let notes = ExtendedCollection::<Note>::new();
//! notes.sorting().add(SortingProperty::ascending("title"));
//! notes.filters().add(CompositeFilter::new("stars", FilterOp::And, |n: &Note| {
//!     n.inner.2 >= 3
//! }));
//!
//! notes.add(Note::new("beta", 5));
//! notes.add(Note::new("alpha", 4));
//! notes.add(Note::new("gamma", 1));
//!
//! let titles: Vec<String> = notes
//!     .items()
//!     .iter()
//!     .map(|n| n.inner.1.clone())
//!     .collect();
//! assert_eq!(titles, vec!["alpha", "beta"]);
//! ```

mod change;
mod collection;
mod filter;
mod sorting;
mod source_list;
mod wrapper;

pub use change::{Change, ChangeSet};
pub use collection::{
    CollectionChanges, ExtendedCollection, ExtendedCollectionBuilder, RefreshGuard,
};
pub use filter::{CompositeFilter, FilterFn, FilterOp, FilterSet};
pub use sorting::{CompareFn, SortDirection, SortingProperties, SortingProperty};
pub use source_list::SourceList;
pub use wrapper::{ExtendedWrapperCollection, WrapItem};
