use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compare::Comparer;
use crate::config::TtlConfig;
use crate::entry::TimedEntry;
use crate::error::TtlError;
use crate::scheduler::{ExpiryScheduler, SchedulerStats};

/// Iterator over a point-in-time copy of a [`TtlMap`]
pub type MapIter<K, V> = std::vec::IntoIter<(K, V)>;

/// Entry store and lifespan, guarded together by one lock
struct MapState<K, V> {
    entries: HashMap<K, TimedEntry<V>>,
    lifespan: Duration,
}

impl<K: Eq + Hash, V> MapState<K, V> {
    /// Removes every entry whose age has reached the lifespan, judged
    /// against a single `now` so the whole pass sees the same clock.
    fn purge(&mut self) -> usize {
        let now = Instant::now();
        let lifespan = self.lifespan;
        let before = self.entries.len();

        self.entries.retain(|_, entry| !entry.is_expired_at(lifespan, now));

        before - self.entries.len()
    }
}

/// Thread-safe map whose entries are evicted by a background sweep once
/// they outlive the configured lifespan.
///
/// Reads never refresh an entry; only [`insert`](Self::insert) and
/// [`try_insert`](Self::try_insert) stamp it. Expiry is physical: an entry
/// past its lifespan stays visible until the next sweep removes it, so it
/// can linger for up to one interval.
///
/// Every operation, and the sweep, takes the same per-map lock for the
/// length of its critical section. Iteration and [`snapshot`](Self::snapshot)
/// copy the live pairs under that lock, so they never observe a sweep in
/// progress.
///
/// # Example
///
/// ```rust
/// use lifespan_core::{TtlConfig, TtlMap};
/// use std::time::Duration;
///
/// let config = TtlConfig::default()
///     .with_interval(Duration::from_millis(50))
///     .with_lifespan(Duration::from_secs(300));
/// let map = TtlMap::new(config).unwrap();
///
/// map.insert("user:123", "John Doe");
/// assert_eq!(map.try_get("user:123"), Some("John Doe"));
/// assert!(map.remove("user:123"));
/// ```
pub struct TtlMap<K, V> {
    scheduler: ExpiryScheduler,
    state: Arc<Mutex<MapState<K, V>>>,
    comparer: Comparer<V>,
}

impl<K, V> TtlMap<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates an empty map and starts its sweep thread
    pub fn new(config: TtlConfig) -> Result<Self, TtlError>
    where
        V: PartialEq,
    {
        Self::build(config, Comparer::default(), std::iter::empty())
    }

    /// Creates a map seeded with `data`, every pair stamped with the
    /// construction time
    pub fn with_data<I>(config: TtlConfig, data: I) -> Result<Self, TtlError>
    where
        I: IntoIterator<Item = (K, V)>,
        V: PartialEq,
    {
        Self::build(config, Comparer::default(), data)
    }

    /// Creates an empty map that compares values with `comparer`
    pub fn with_comparer(config: TtlConfig, comparer: Comparer<V>) -> Result<Self, TtlError> {
        Self::build(config, comparer, std::iter::empty())
    }

    fn build<I>(config: TtlConfig, comparer: Comparer<V>, data: I) -> Result<Self, TtlError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        config.validate()?;

        let now = Instant::now();
        let entries = data
            .into_iter()
            .map(|(key, value)| (key, TimedEntry::stamped(value, now)))
            .collect();

        let state = Arc::new(Mutex::new(MapState {
            entries,
            lifespan: config.lifespan,
        }));

        let sweep_state = Arc::clone(&state);
        let scheduler = ExpiryScheduler::new("ttl-map", config.interval, move || {
            Ok(sweep_state.lock().purge())
        })?;
        scheduler.start()?;

        Ok(Self {
            scheduler,
            state,
            comparer,
        })
    }

    /// Inserts or overwrites `key`, stamping it with the current time.
    ///
    /// Returns the value previously stored under `key`, if any.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.state
            .lock()
            .entries
            .insert(key, TimedEntry::new(value))
            .map(TimedEntry::into_value)
    }

    /// Inserts `key` only if it is not already present.
    ///
    /// An entry past its lifespan but not yet swept still counts as present.
    pub fn try_insert(&self, key: K, value: V) -> Result<(), TtlError> {
        match self.state.lock().entries.entry(key) {
            Entry::Occupied(_) => Err(TtlError::DuplicateKey),
            Entry::Vacant(slot) => {
                slot.insert(TimedEntry::new(value));
                Ok(())
            }
        }
    }

    /// Inserts every pair from `items` under one lock, all sharing one stamp
    pub fn extend<I>(&self, items: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let now = Instant::now();
        let mut state = self.state.lock();
        for (key, value) in items {
            state.entries.insert(key, TimedEntry::stamped(value, now));
        }
    }

    /// Returns a copy of the value for `key`, or `None` if absent or swept
    pub fn try_get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
    }

    /// Returns a copy of the value for `key`
    ///
    /// # Errors
    ///
    /// Returns [`TtlError::KeyNotFound`] if the key is absent or swept.
    pub fn get<Q>(&self, key: &Q) -> Result<V, TtlError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.try_get(key).ok_or(TtlError::KeyNotFound)
    }

    /// Removes `key` whether or not it has expired.
    ///
    /// Returns `true` if the key was present.
    #[must_use = "returns whether the key existed"]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.lock().entries.remove(key).is_some()
    }

    /// Removes `key` only if its value equals `value`
    pub fn remove_entry<Q>(&self, key: &Q, value: &V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.state.lock();
        let matches = state
            .entries
            .get(key)
            .is_some_and(|entry| self.comparer.equals(entry.value(), value));

        if matches {
            state.entries.remove(key);
        }
        matches
    }

    /// Checks if `key` is present, including entries awaiting the next sweep
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.state.lock().entries.contains_key(key)
    }

    /// Checks if any entry holds a value equal to `value`
    #[must_use]
    pub fn contains_value(&self, value: &V) -> bool {
        self.state
            .lock()
            .entries
            .values()
            .any(|entry| self.comparer.equals(entry.value(), value))
    }

    /// Time left before `key` becomes eligible for the sweep
    pub fn remaining_lifetime<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| entry.remaining(state.lifespan))
    }

    /// Returns the number of entries not yet swept (may include expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if the map holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Removes all entries.
    ///
    /// Returns the number of entries that were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        count
    }

    /// Returns all keys currently stored
    pub fn keys(&self) -> Vec<K> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Returns all values currently stored
    pub fn values(&self) -> Vec<V> {
        self.state
            .lock()
            .entries
            .values()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Copies every stored pair into a plain `HashMap`, timestamps dropped
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value().clone()))
            .collect()
    }

    /// Iterates over a copy of the pairs taken under the lock.
    ///
    /// Sweeps and mutations that happen while iterating do not affect the
    /// sequence already produced.
    pub fn iter(&self) -> MapIter<K, V> {
        let pairs: Vec<(K, V)> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value().clone()))
            .collect();
        pairs.into_iter()
    }

    /// Runs a sweep now on the calling thread.
    ///
    /// Returns the number of entries removed. Also done automatically by the
    /// background thread.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge()
    }

    /// Returns the current lifespan
    pub fn lifespan(&self) -> Duration {
        self.state.lock().lifespan
    }

    /// Changes the lifespan.
    ///
    /// Takes effect at the next sweep, measured against each entry's
    /// original stamp. Nothing is removed by this call itself.
    pub fn set_lifespan(&self, lifespan: Duration) {
        self.state.lock().lifespan = lifespan;
    }

    /// Returns the current sweep interval
    pub fn interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Changes the sweep interval; see [`ExpiryScheduler::set_interval`]
    pub fn set_interval(&self, interval: Duration) -> Result<(), TtlError> {
        self.scheduler.set_interval(interval)
    }

    /// Restarts background sweeping after [`stop`](Self::stop)
    pub fn start(&self) -> Result<(), TtlError> {
        self.scheduler.start()
    }

    /// Stops background sweeping, waiting for an in-flight sweep to finish.
    ///
    /// The map stays usable; entries simply stop expiring until restarted.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Returns `true` while the sweep thread is active
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Returns the background sweep counters
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}

impl<'a, K, V> IntoIterator for &'a TtlMap<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    type Item = (K, V);
    type IntoIter = MapIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V> std::fmt::Debug for TtlMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TtlMap")
            .field("len", &state.entries.len())
            .field("lifespan", &state.lifespan)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
