//! Collapse concurrent identical calls into one
//!
//! Callers that ask for the same key while a call is in flight wait for it
//! and receive a clone of its result, error included. The entry is dropped
//! as soon as the call completes, so a later request starts a fresh call.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

type Call<V, E> = Arc<OnceCell<Result<V, E>>>;

/// In-flight calls keyed by `K`, each resolving to `Result<V, E>`
pub struct SingleFlight<K, V, E> {
    calls: Mutex<HashMap<K, Call<V, E>>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone + From<Cancelled>,
{
    /// Create a group with nothing in flight
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` for `key` unless a call for it is already in flight
    ///
    /// A cancelled caller returns `Cancelled` immediately. If that caller was
    /// the one driving `f`, one of the remaining waiters takes over.
    pub async fn work<F, Fut>(&self, key: K, cancel: &CancellationToken, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let call = self
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            result = call.get_or_init(f) => result.clone(),
        };

        let mut calls = self.lock();
        if calls.get(&key).is_some_and(|current| Arc::ptr_eq(current, &call)) {
            calls.remove(&key);
        }
        result
    }

    /// Number of calls currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Call<V, E>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone + From<Cancelled>,
{
    fn default() -> Self {
        Self::new()
    }
}
