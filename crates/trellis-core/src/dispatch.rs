//! Dispatcher abstraction for marshaling work onto the UI thread.
//!
//! Collections mutate on arbitrary threads, but toolkits require view
//! change notifications to arrive on one designated thread. The
//! [`Dispatcher`] trait is that boundary: anything with a
//! `schedule(task)` operation. Producers enqueue and continue; nothing
//! blocks waiting for the scheduled task to run.
//!
//! [`QueueDispatcher`] is the stock implementation: a FIFO task queue the
//! toolkit's event loop drains once per iteration with
//! [`run_pending`](QueueDispatcher::run_pending). Tasks run in the order
//! they were scheduled, which is what preserves the change-notification
//! ordering guarantee end to end.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::DispatchError;

/// A unit of work scheduled onto a dispatcher.
pub type Task = Box<dyn FnOnce() + Send>;

/// A scheduler that runs tasks on its own designated thread.
///
/// Implementations must be safe to call from any thread. `schedule` must
/// never run the task inline on the calling thread and must never block.
pub trait Dispatcher: Send + Sync {
    /// Enqueue a task for later execution on the dispatcher's thread.
    fn schedule(&self, task: Task);
}

/// A FIFO dispatcher backed by an unbounded channel.
///
/// The owning side (typically the toolkit event loop) calls
/// [`run_pending`](Self::run_pending) to drain and execute queued tasks.
/// Cheap sender-only handles for producers are available via
/// [`handle`](Self::handle).
///
/// # Example
///
/// ```
/// use trellis_core::{Dispatcher, QueueDispatcher};
///
/// let dispatcher = QueueDispatcher::new();
/// dispatcher.schedule(Box::new(|| println!("on the UI thread")));
/// assert_eq!(dispatcher.run_pending(), 1);
/// ```
pub struct QueueDispatcher {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl Default for QueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueDispatcher {
    /// Create a new, empty dispatcher.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Returns a cheap, cloneable producer handle.
    ///
    /// Handles may outlive the dispatcher; scheduling through a handle
    /// whose dispatcher is gone fails with [`DispatchError::Closed`].
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run every task queued so far, in scheduling order.
    ///
    /// Returns the number of tasks executed. Tasks scheduled while
    /// draining are picked up in the same call.
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            executed += 1;
        }
        if executed > 0 {
            tracing::trace!(target: "trellis_core::dispatch", executed, "drained dispatcher queue");
        }
        executed
    }

    /// Number of tasks currently queued.
    pub fn pending_count(&self) -> usize {
        self.rx.len()
    }
}

impl Dispatcher for QueueDispatcher {
    fn schedule(&self, task: Task) {
        // Both ends live in self, so sending cannot fail here.
        let _ = self.tx.send(task);
    }
}

/// A sender-only handle onto a [`QueueDispatcher`].
///
/// Useful for handing producers a scheduling capability without sharing
/// the queue itself.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: Sender<Task>,
}

impl DispatcherHandle {
    /// Enqueue a task, reporting failure if the dispatcher is gone.
    pub fn try_schedule(&self, task: Task) -> Result<(), DispatchError> {
        self.tx.send(task).map_err(|_| DispatchError::Closed)
    }
}

impl Dispatcher for DispatcherHandle {
    fn schedule(&self, task: Task) {
        if self.try_schedule(task).is_err() {
            tracing::warn!(
                target: "trellis_core::dispatch",
                "dispatcher gone, dropping scheduled task"
            );
        }
    }
}

static_assertions::assert_impl_all!(QueueDispatcher: Send, Sync);
static_assertions::assert_impl_all!(DispatcherHandle: Send, Sync);
