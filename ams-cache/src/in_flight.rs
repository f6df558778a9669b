//! Request coalescing.
//!
//! At most one operation per [`CacheKey`] is pending at a time. The first
//! caller's future is spawned onto the runtime and its outcome is published
//! through a [`Shared`] handle; later callers for the same key receive a
//! clone of that handle and observe the identical outcome.
//!
//! The registration is removed from inside the spawned task, after the
//! operation settles and before its output becomes visible to any waiter.
//! A caller retrying right after a failure therefore starts a new call
//! instead of joining the failed one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ams_core::{AbortReason, AmsError, AmsResult, CacheKey};
use futures_util::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;
use tracing::debug;

/// Cloneable handle to a pending operation.
pub type SharedOperation<T> = Shared<BoxFuture<'static, AmsResult<T>>>;

/// How a caller came to hold a [`SharedOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The caller's factory ran and its future is the shared operation.
    Created,
    /// An operation was already pending; the factory was not called.
    Joined,
}

impl Registration {
    pub fn joined(self) -> bool {
        matches!(self, Registration::Joined)
    }
}

struct Slot<T: Clone> {
    id: u64,
    operation: SharedOperation<T>,
    abort: AbortHandle,
}

type Slots<T> = Arc<Mutex<HashMap<CacheKey, Slot<T>>>>;

/// The map holds no invariant a panicking holder could break.
fn lock_slots<T: Clone>(slots: &Mutex<HashMap<CacheKey, Slot<T>>>) -> MutexGuard<'_, HashMap<CacheKey, Slot<T>>> {
    match slots.lock() {
        Ok(slots) => slots,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Owned by the spawned task. Removes the registration, then publishes the outcome.
///
/// Only the slot with a matching id is removed, so a settled operation
/// never evicts a newer registration for the same key. If the task panics
/// or is dropped by the runtime, the sender is dropped after the removal
/// and waiters observe an internal error.
struct Settle<T: Clone> {
    slots: Slots<T>,
    key: CacheKey,
    id: u64,
    outcome: Option<oneshot::Sender<AmsResult<T>>>,
}

impl<T: Clone> Settle<T> {
    fn publish(mut self, result: AmsResult<T>) {
        let outcome = self.outcome.take();
        drop(self);
        if let Some(outcome) = outcome {
            let _ = outcome.send(result);
        }
    }
}

impl<T: Clone> Drop for Settle<T> {
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        if slots.get(&self.key).map(|slot| slot.id) == Some(self.id) {
            slots.remove(&self.key);
        }
    }
}

/// Map from cache key to the operation currently fetching it.
pub struct InFlightRegistry<T: Clone> {
    slots: Slots<T>,
    next_id: AtomicU64,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the operation pending for `key`, or start one with `factory`.
    ///
    /// Must be called from within a tokio runtime. The operation runs to
    /// completion even if every caller drops its handle.
    pub fn register<F, Fut>(&self, key: &CacheKey, factory: F) -> (SharedOperation<T>, Registration)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AmsResult<T>> + Send + 'static,
    {
        let (future, settle, operation) = {
            let mut slots = lock_slots(&self.slots);

            if let Some(slot) = slots.get(key) {
                debug!(key = %key, "joining in-flight request");
                return (slot.operation.clone(), Registration::Joined);
            }

            // Nothing is registered yet, so a panicking factory leaves no trace.
            let future = factory();

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (abort, abort_registration) = AbortHandle::new_pair();
            let (outcome_tx, outcome_rx) = oneshot::channel();
            let operation = async move {
                outcome_rx
                    .await
                    .unwrap_or_else(|_| Err(AmsError::internal("in-flight operation ended without an outcome")))
            }
            .boxed()
            .shared();

            slots.insert(
                key.clone(),
                Slot {
                    id,
                    operation: operation.clone(),
                    abort,
                },
            );
            let settle = Settle {
                slots: Arc::clone(&self.slots),
                key: key.clone(),
                id,
                outcome: Some(outcome_tx),
            };
            (Abortable::new(future, abort_registration), settle, operation)
        };

        tokio::spawn(async move {
            let result = match future.await {
                Ok(result) => result,
                Err(_) => Err(AmsError::Aborted {
                    reason: AbortReason::Cancelled,
                }),
            };
            settle.publish(result);
        });

        (operation, Registration::Created)
    }

    /// Abort the operation pending for `key`.
    ///
    /// Every holder of its handle observes `Aborted { reason: Cancelled }`
    /// and the registration is released. Returns whether anything was pending.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        match lock_slots(&self.slots).get(key) {
            Some(slot) => {
                debug!(key = %key, "cancelling in-flight request");
                slot.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock_slots(&self.slots).contains_key(key)
    }
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> std::fmt::Debug for InFlightRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("pending", &lock_slots(&self.slots).len())
            .finish()
    }
}
