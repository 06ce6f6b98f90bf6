//! Reference-counted batching gate for coalescing recomputation.
//!
//! Filter and sort invalidations arrive one per mutation, but during bulk
//! edits recomputing the view after every single change thrashes the UI.
//! A [`Deferrer`] wraps the recompute action: while one or more
//! [`DeferGuard`] scopes are outstanding, invalidation requests are only
//! recorded; when the last scope is released, the action runs exactly
//! once if anything was requested in the meantime.
//!
//! Scopes are reentrant (nested `defer()` calls stack) and a guard may be
//! released on a different thread than the one that acquired it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use trellis_core::Deferrer;
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let runs_clone = runs.clone();
//! let deferrer = Deferrer::new(move || {
//!     runs_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! {
//!     let _outer = deferrer.defer();
//!     let _inner = deferrer.defer();
//!     deferrer.defer_or_execute();
//!     deferrer.defer_or_execute();
//!     assert_eq!(runs.load(Ordering::SeqCst), 0);
//! }
//! // Both requests coalesced into a single run on release.
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct DeferrerInner {
    /// Number of outstanding guard scopes.
    depth: AtomicUsize,
    /// Whether a request arrived while deferred.
    pending: AtomicBool,
    /// The coalesced action. Fixed at construction, so no lock is needed
    /// and the action may re-enter the deferrer without deadlocking.
    action: Box<dyn Fn() + Send + Sync>,
}

impl DeferrerInner {
    fn run(&self) {
        tracing::trace!(target: "trellis_core::deferrer", "running deferred action");
        (self.action)();
    }
}

/// A reentrant batching gate that coalesces repeated requests into one
/// execution of a fixed action.
#[derive(Clone)]
pub struct Deferrer {
    inner: Arc<DeferrerInner>,
}

impl Deferrer {
    /// Create a deferrer owning the given action.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DeferrerInner {
                depth: AtomicUsize::new(0),
                pending: AtomicBool::new(false),
                action: Box::new(action),
            }),
        }
    }

    /// Open a deferral scope.
    ///
    /// While any guard is alive, [`defer_or_execute`](Self::defer_or_execute)
    /// only records the request. Dropping the last guard runs the action
    /// once if any request was recorded. Guards stack; they may be dropped
    /// in any order and on any thread.
    pub fn defer(&self) -> DeferGuard {
        self.inner.depth.fetch_add(1, Ordering::SeqCst);
        DeferGuard {
            inner: self.inner.clone(),
        }
    }

    /// Run the action now, or record the request if a scope is open.
    pub fn defer_or_execute(&self) {
        if self.is_deferred() {
            self.inner.pending.store(true, Ordering::SeqCst);
            // The last guard may have dropped between the depth check and
            // the store, in which case its flush saw pending still false.
            // Reclaim the request here; the swap keeps the run unique.
            if self.inner.depth.load(Ordering::SeqCst) == 0
                && self.inner.pending.swap(false, Ordering::SeqCst)
            {
                self.inner.run();
            }
        } else {
            self.inner.run();
        }
    }

    /// Run the action immediately, regardless of deferral state.
    ///
    /// This is the explicit manual trigger; it does not clear a pending
    /// deferred request.
    pub fn execute(&self) {
        self.inner.run();
    }

    /// Whether at least one deferral scope is currently open.
    pub fn is_deferred(&self) -> bool {
        self.inner.depth.load(Ordering::SeqCst) > 0
    }
}

impl std::fmt::Debug for Deferrer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferrer")
            .field("depth", &self.inner.depth.load(Ordering::SeqCst))
            .field("pending", &self.inner.pending.load(Ordering::SeqCst))
            .finish()
    }
}

/// Scoped acquisition token returned by [`Deferrer::defer`].
///
/// Releasing the last outstanding guard flushes the deferrer: the action
/// runs exactly once if any request was recorded while deferred. Release
/// happens on all exit paths, including panics, via `Drop`.
#[must_use = "dropping the guard immediately ends the deferral scope"]
pub struct DeferGuard {
    inner: Arc<DeferrerInner>,
}

impl Drop for DeferGuard {
    fn drop(&mut self) {
        if self.inner.depth.fetch_sub(1, Ordering::SeqCst) == 1
            && self.inner.pending.swap(false, Ordering::SeqCst)
        {
            self.inner.run();
        }
    }
}

static_assertions::assert_impl_all!(Deferrer: Send, Sync);
static_assertions::assert_impl_all!(DeferGuard: Send);

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_deferrer() -> (Deferrer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let deferrer = Deferrer::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        (deferrer, runs)
    }

    #[test]
    fn executes_immediately_when_not_deferred() {
        let (deferrer, runs) = counting_deferrer();
        deferrer.defer_or_execute();
        deferrer.defer_or_execute();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn coalesces_requests_within_scope() {
        let (deferrer, runs) = counting_deferrer();
        {
            let _guard = deferrer.defer();
            for _ in 0..5 {
                deferrer.defer_or_execute();
            }
            assert_eq!(runs.load(Ordering::SeqCst), 0);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_scopes_flush_only_on_last_release() {
        let (deferrer, runs) = counting_deferrer();
        let outer = deferrer.defer();
        {
            let _inner = deferrer.defer();
            deferrer.defer_or_execute();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drop(outer);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_request_means_no_run() {
        let (deferrer, runs) = counting_deferrer();
        {
            let _guard = deferrer.defer();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_execute_ignores_deferral() {
        let (deferrer, runs) = counting_deferrer();
        let _guard = deferrer.defer();
        deferrer.execute();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_released_on_other_thread() {
        let (deferrer, runs) = counting_deferrer();
        let guard = deferrer.defer();
        deferrer.defer_or_execute();

        let handle = std::thread::spawn(move || {
            drop(guard);
        });
        handle.join().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_racing_last_guard_release_is_not_lost() {
        // Whichever side wins the race, the action must run exactly once
        // per round: either the releasing guard flushes the request, or
        // the requester notices the scope closed and runs it itself.
        for _ in 0..200 {
            let (deferrer, runs) = counting_deferrer();
            let guard = deferrer.defer();

            let requester = {
                let deferrer = deferrer.clone();
                std::thread::spawn(move || {
                    deferrer.defer_or_execute();
                })
            };
            let releaser = std::thread::spawn(move || {
                drop(guard);
            });

            requester.join().unwrap();
            releaser.join().unwrap();
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn scope_after_flush_starts_clean() {
        let (deferrer, runs) = counting_deferrer();
        {
            let _guard = deferrer.defer();
            deferrer.defer_or_execute();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // A fresh scope without requests must not re-run the action.
        {
            let _guard = deferrer.defer();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
