//! Keyed single-flight execution.
//!
//! The first caller for a key starts the work; callers arriving while it is in
//! flight await the same shared future and receive a clone of its output. The
//! entry is dropped as soon as the work completes, so a later call starts a
//! fresh execution. Results are never cached here.
//!
//! The work runs on its own task. Dropping every caller does not cancel it,
//! and the entry is still released when it finishes or panics.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// How a caller took part in a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started the work.
    Leader,
    /// Awaited work someone else started.
    Joined,
}

/// The spawned work ended without producing a value (panic or runtime
/// shutdown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("in-flight work aborted: {0}")]
pub struct Aborted(pub String);

type FlightFuture<V> = Shared<BoxFuture<'static, Result<V, Aborted>>>;

struct Flight<V> {
    generation: u64,
    joined: usize,
    fut: FlightFuture<V>,
}

type Registry<K, V> = Arc<Mutex<HashMap<K, Flight<V>>>>;

pub struct SingleFlight<K, V> {
    inflight: Registry<K, V>,
    generation: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` for `key` unless a flight for it is already running, in
    /// which case join that one. `make` is only invoked by the leader.
    /// Must be called from within a Tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> (Result<V, Aborted>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (fut, role) = {
            let mut map = lock(&self.inflight);
            match map.get_mut(&key) {
                Some(flight) => {
                    flight.joined += 1;
                    (flight.fut.clone(), Role::Joined)
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let fut = self.wrap(key.clone(), generation, make());
                    map.insert(
                        key,
                        Flight {
                            generation,
                            joined: 0,
                            fut: fut.clone(),
                        },
                    );
                    (fut, Role::Leader)
                }
            }
        };
        (fut.await, role)
    }

    /// Number of callers that joined the running flight for `key`, or `None`
    /// when nothing is in flight.
    pub fn joined<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        lock(&self.inflight).get(key).map(|f| f.joined)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    fn wrap<Fut>(&self, key: K, generation: u64, work: Fut) -> FlightFuture<V>
    where
        Fut: Future<Output = V> + Send + 'static,
    {
        let release = Release {
            registry: Arc::clone(&self.inflight),
            key,
            generation,
        };
        let handle = tokio::spawn(async move {
            let _release = release;
            work.await
        });
        handle
            .map(|joined| joined.map_err(|e| Aborted(e.to_string())))
            .boxed()
            .shared()
    }
}

/// Removes the flight's registry entry when the spawned work ends, however
/// it ends. A newer flight under the same key is left alone.
struct Release<K: Eq + Hash, V> {
    registry: Registry<K, V>,
    key: K,
    generation: u64,
}

impl<K: Eq + Hash, V> Drop for Release<K, V> {
    fn drop(&mut self) {
        let mut map = lock(&self.registry);
        if map.get(&self.key).is_some_and(|f| f.generation == self.generation) {
            map.remove(&self.key);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
