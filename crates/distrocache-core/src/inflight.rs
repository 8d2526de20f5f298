//! Process-local registry of work that is currently running, keyed so that
//! concurrent callers asking for the same thing share one execution.

use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::watch;
use tracing::trace;

use crate::error::DistroError;

/// Outcome shared with every waiter of one execution.
pub type Shared<V> = Result<V, Arc<DistroError>>;

type Slot<V> = watch::Receiver<Option<Shared<V>>>;

/// At most one execution per key runs at a time; later callers for the same
/// key wait for that execution's outcome instead of starting their own.
///
/// Work is spawned onto the runtime, so dropping a waiting caller never
/// cancels it. An entry exists only while its work runs. Errors are handed to
/// the waiters present at the time and then forgotten.
pub struct InFlight<K, V> {
    pending: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with running work.
    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Runs the future built by `work` for `key`, or joins the execution
    /// already running for it. `work` is only called when this caller leads.
    pub async fn run<F, Fut>(self: &Arc<Self>, key: K, work: F) -> Shared<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Shared<V>> + Send + 'static,
    {
        let mut slot = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.get(&key) {
                Some(slot) => {
                    trace!("joining in-flight work");
                    slot.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(key.clone(), rx.clone());

                    let registration = Registration {
                        registry: Arc::clone(self),
                        key: Some(key),
                    };
                    let fut = work();
                    tokio::spawn(async move {
                        let outcome = fut.await;
                        // Unregister before publishing so a caller that sees the
                        // outcome never finds the finished entry.
                        drop(registration);
                        let _ = tx.send(Some(outcome));
                    });
                    rx
                }
            }
        };

        let outcome = match slot.wait_for(Option::is_some).await {
            Ok(outcome) => {
                outcome
                    .clone()
                    .unwrap_or_else(|| Err(Arc::new(aborted())))
            }
            Err(_) => Err(Arc::new(aborted())),
        };
        outcome
    }
}

fn aborted() -> DistroError {
    DistroError::Task("in-flight work ended without a result".to_string())
}

/// Removes the key when the work finishes or its task unwinds.
struct Registration<K: Eq + Hash, V> {
    registry: Arc<InFlight<K, V>>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> Drop for Registration<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}
