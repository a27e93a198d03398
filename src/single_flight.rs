//! Per-key coalescing of concurrent fetches
//!
//! Callers asking for the same key while a fetch is in flight wait on that fetch
//! instead of starting their own. The entry is removed as soon as the fetch
//! completes or every caller waiting on it has been dropped, so later callers
//! start fresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use crate::error::ApiError;

type Flight<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

struct InFlight<T: Clone> {
    flight: Flight<T>,
    waiters: usize,
}

/// Map from key to the in-progress shared fetch for that key
pub struct SingleFlight<T: Clone> {
    in_flight: Mutex<HashMap<String, InFlight<T>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.lock().len())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a fetch in progress
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Runs `fetch` for `key` unless a fetch for `key` is already running, in
    /// which case its result is shared and `fetch` is dropped unpolled.
    ///
    /// Dropping the returned future before it resolves gives up this caller's
    /// place; the fetch itself is dropped once no caller is left waiting.
    pub async fn run<F>(&self, key: &str, fetch: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self.lock();
            match in_flight.get_mut(key) {
                Some(existing) => {
                    tracing::debug!(key, "Joining in-flight fetch");
                    existing.waiters += 1;
                    existing.flight.clone()
                }
                None => {
                    let flight = fetch.boxed().shared();
                    in_flight.insert(
                        key.to_string(),
                        InFlight {
                            flight: flight.clone(),
                            waiters: 1,
                        },
                    );
                    flight
                }
            }
        };

        let mut waiter = Waiter {
            owner: self,
            key,
            flight: flight.clone(),
            completed: false,
        };
        let result = flight.await;
        waiter.completed = true;
        result
    }
}

impl<T: Clone> SingleFlight<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, InFlight<T>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One caller's claim on a flight, released on completion or drop
struct Waiter<'a, T: Clone> {
    owner: &'a SingleFlight<T>,
    key: &'a str,
    // Never polled; `ptr_eq` only holds for clones that have not completed.
    flight: Flight<T>,
    completed: bool,
}

impl<T: Clone> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        let mut in_flight = self.owner.lock();
        let Some(entry) = in_flight.get_mut(self.key) else {
            return;
        };
        if !entry.flight.ptr_eq(&self.flight) {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if self.completed || entry.waiters == 0 {
            if !self.completed {
                tracing::debug!(key = self.key, "Abandoning fetch with no callers left");
            }
            in_flight.remove(self.key);
        }
    }
}
