//! Core systems for Trellis.
//!
//! This crate provides the foundational components of the Trellis reactive
//! collection framework:
//!
//! - **Signal/Slot System**: Type-safe change notification
//! - **Dispatcher**: Marshaling work onto a designated (UI) thread
//! - **Deferrer**: Reference-counted batching of recomputation
//! - **Item Model**: Identity, named properties, and optional observability
//!   for collection elements
//!
//! # Signal Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! let count_changed = Signal::<usize>::new();
//!
//! let conn_id = count_changed.connect(|count| {
//!     println!("count is now {}", count);
//! });
//!
//! count_changed.emit(3);
//! count_changed.disconnect(conn_id);
//! ```
//!
//! # Dispatcher Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{Dispatcher, QueueDispatcher, Signal};
//!
//! // The toolkit owns the dispatcher and drains it once per loop turn.
//! let ui = Arc::new(QueueDispatcher::new());
//!
//! let changed = Signal::<String>::new();
//! changed.connect_via(ui.clone(), |text| {
//!     println!("on the UI thread: {}", text);
//! });
//!
//! // Emitting from a worker thread only enqueues; nothing runs inline.
//! changed.emit("hello".to_string());
//! assert_eq!(ui.run_pending(), 1);
//! ```

mod deferrer;
mod dispatch;
mod error;
mod item;
pub mod signal;

pub use deferrer::{DeferGuard, Deferrer};
pub use dispatch::{Dispatcher, DispatcherHandle, QueueDispatcher, Task};
pub use error::{DispatchError, Result, TrellisError};
pub use item::{CollectionItem, ItemKey, PropertyValue, compare_values};
pub use signal::{ConnectionGuard, ConnectionId, Signal};
