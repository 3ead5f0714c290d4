//! Resettable single-fire completion
//!
//! A [`Deferred`] holds one completion slot. The slot settles at most once,
//! either resolved or rejected; later attempts are ignored. `reset()` drops the
//! slot and installs a fresh one, so the same owner can be reused across
//! retries. Futures obtained before a reset settle with [`Error::Superseded`]
//! instead of hanging.

use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Future returned by [`Deferred::pending`]
pub type Pending<T> = BoxFuture<'static, Result<T>>;

/// Settled value of one completion cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Resolved(T),
    Rejected(Error),
}

impl<T> Completion<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            Completion::Resolved(value) => Ok(value),
            Completion::Rejected(error) => Err(error),
        }
    }
}

/// Externally completable, resettable future
pub struct Deferred<T> {
    slot: Mutex<watch::Sender<Option<Completion<T>>>>,
    generation: AtomicU64,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            slot: Mutex::new(tx),
            generation: AtomicU64::new(0),
        }
    }

    /// Future for the current cycle. Any number of waiters may hold one.
    pub fn pending(&self) -> Pending<T> {
        let mut rx = self.slot.lock().subscribe();
        async move {
            let settled = rx
                .wait_for(Option::is_some)
                .await
                .map(|value| (*value).clone());
            match settled {
                Ok(Some(completion)) => completion.into_result(),
                Ok(None) => Err(Error::Internal("completion slot observed empty".into())),
                Err(_) => Err(Error::Superseded),
            }
        }
        .boxed()
    }

    /// Resolve the current cycle. Returns false if it was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Completion::Resolved(value))
    }

    /// Reject the current cycle. Returns false if it was already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Completion::Rejected(error))
    }

    /// Discard the current cycle and start a new, unsettled one
    pub fn reset(&self) {
        let (tx, _) = watch::channel(None);
        // The old sender drops here, closing every outstanding waiter.
        *self.slot.lock() = tx;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().borrow().is_some()
    }

    /// Settled value of the current cycle, if any
    pub fn peek(&self) -> Option<Completion<T>> {
        self.slot.lock().borrow().clone()
    }

    /// Number of resets performed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn settle(&self, completion: Completion<T>) -> bool {
        self.slot.lock().send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(completion);
            true
        })
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.slot.lock().borrow().is_some())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

/// Owner of a [`Deferred`] used as its external completion mechanism
pub trait DeferredHolder<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn deferred(&self) -> &Deferred<T>;

    fn pending(&self) -> Pending<T> {
        self.deferred().pending()
    }

    fn resolve(&self, value: T) -> bool {
        self.deferred().resolve(value)
    }

    fn reject(&self, error: Error) -> bool {
        self.deferred().reject(error)
    }

    fn reset_pending(&self) {
        self.deferred().reset()
    }
}
