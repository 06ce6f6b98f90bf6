//! Signal/slot system for Trellis.
//!
//! This module provides a type-safe signal/slot mechanism for change
//! notification. Signals are emitted by collections and items when their
//! state changes, and connected slots (callbacks) are invoked in response.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The main signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//! - [`ConnectionGuard`] - RAII guard that disconnects when dropped
//!
//! # Thread Safety
//!
//! `Signal<Args>` is `Send + Sync` and may be emitted from any thread. A
//! slot connected with [`Signal::connect`] runs on the emitting thread; a
//! slot connected with [`Signal::connect_via`] is scheduled onto the given
//! [`Dispatcher`](crate::Dispatcher) instead, which is how view change
//! notifications are marshaled onto the UI thread.
//!
//! # Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! let name_changed = Signal::<String>::new();
//!
//! let conn_id = name_changed.connect(|name| {
//!     println!("name changed to: {}", name);
//! });
//!
//! name_changed.emit("tasks".to_string());
//! name_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatch::Dispatcher;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via
    /// [`Signal::disconnect`]. The ID remains valid until the connection is
    /// explicitly disconnected or the signal is dropped.
    pub struct ConnectionId;
}

/// Internal storage for a single connection.
struct Connection<Args> {
    /// The slot function to invoke (Arc-wrapped for safe cross-thread capture).
    slot: Arc<dyn Fn(&Args) + Send + Sync>,
    /// Dispatcher the slot is marshaled onto, if any.
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

/// A type-safe signal that can have multiple connected slots.
///
/// Signals are the core of change notification in Trellis. When a signal is
/// emitted, all connected slots are invoked with the provided arguments,
/// either directly on the emitting thread or scheduled onto a dispatcher.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for
///   signals with no arguments.
pub struct Signal<Args> {
    /// All active connections.
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    /// Whether signal emission is temporarily blocked.
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// The slot is invoked directly on whichever thread emits the signal.
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
            dispatcher: None,
        };
        self.connections.lock().insert(connection)
    }

    /// Connect a slot whose invocations are scheduled onto `dispatcher`.
    ///
    /// This is the observe-on boundary: the emitting thread never runs the
    /// slot itself, it only enqueues the invocation and continues.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use trellis_core::{QueueDispatcher, Signal};
    ///
    /// let ui = Arc::new(QueueDispatcher::new());
    /// let signal = Signal::<i32>::new();
    /// signal.connect_via(ui.clone(), |n| println!("{n}"));
    ///
    /// signal.emit(42);       // nothing runs yet
    /// ui.run_pending();      // slot runs here, on the draining thread
    /// ```
    pub fn connect_via<F>(&self, dispatcher: Arc<dyn Dispatcher>, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
            dispatcher: Some(dispatcher),
        };
        self.connections.lock().insert(connection)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing. This is useful during
    /// initialization or bulk edits to prevent cascading notifications.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// If the signal is blocked, this does nothing. Slots connected with
    /// [`connect`](Self::connect) run immediately on the current thread;
    /// slots connected with [`connect_via`](Self::connect_via) are scheduled
    /// onto their dispatcher with a clone of `args` and the emitter continues
    /// without waiting.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "trellis_core::signal", "signal blocked, skipping emit");
            return;
        }

        // Snapshot the connections so slots can connect or disconnect on
        // this same signal while the emission is in flight.
        let snapshot: Vec<_> = {
            let connections = self.connections.lock();
            tracing::trace!(
                target: "trellis_core::signal",
                connection_count = connections.len(),
                "emitting signal"
            );
            connections
                .iter()
                .map(|(_, conn)| (conn.slot.clone(), conn.dispatcher.clone()))
                .collect()
        };

        for (slot, dispatcher) in snapshot {
            match dispatcher {
                None => slot(&args),
                Some(dispatcher) => {
                    let args = args.clone();
                    dispatcher.schedule(Box::new(move || slot(&args)));
                }
            }
        }
    }
}

// Signal is Send + Sync when Args is Send
unsafe impl<Args: Send> Send for Signal<Args> {}
unsafe impl<Args: Send> Sync for Signal<Args> {}

static_assertions::assert_impl_all!(Signal<i32>: Send, Sync);

/// A connection guard that automatically disconnects when dropped.
///
/// This is useful for RAII-style connection management, ensuring connections
/// are cleaned up when the receiver goes out of scope. Created via
/// [`Signal::connect_scoped`].
///
/// # Example
///
/// ```
/// use trellis_core::Signal;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let signal = Signal::<i32>::new();
/// let counter = Arc::new(AtomicI32::new(0));
/// {
///     let counter_clone = counter.clone();
///     let _guard = signal.connect_scoped(move |&n| {
///         counter_clone.fetch_add(n, Ordering::SeqCst);
///     });
///     signal.emit(42);  // counter = 42
/// }
/// signal.emit(43);  // Nothing happens - connection was dropped
/// assert_eq!(counter.load(Ordering::SeqCst), 42);
/// ```
pub struct ConnectionGuard<Args: Clone + Send + 'static> {
    signal: *const Signal<Args>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Connect a slot with automatic disconnection when the guard is dropped.
    ///
    /// # Safety
    ///
    /// The returned guard holds a raw pointer to this signal. The signal must
    /// outlive the guard. Using `Arc<Signal<Args>>` is recommended for shared
    /// ownership.
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: self as *const Signal<Args>,
            id,
        }
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        // SAFETY: The signal pointer is valid if the guard is used correctly.
        // The caller must ensure the signal outlives the guard.
        unsafe {
            if !self.signal.is_null() {
                let _ = (*self.signal).disconnect(self.id);
            }
        }
    }
}

// SAFETY: the raw pointer is only dereferenced in `drop()`, Signal<Args> is
// itself Send + Sync, and the guard's contract requires the signal to outlive
// it.
unsafe impl<Args: Clone + Send + 'static> Send for ConnectionGuard<Args> {}
unsafe impl<Args: Clone + Send + 'static> Sync for ConnectionGuard<Args> {}
