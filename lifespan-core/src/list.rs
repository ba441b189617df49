use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compare::Comparer;
use crate::config::TtlConfig;
use crate::entry::TimedEntry;
use crate::error::TtlError;
use crate::scheduler::{ExpiryScheduler, SchedulerStats};

/// Iterator over a point-in-time copy of a [`TtlList`]
pub type ListIter<T> = std::vec::IntoIter<T>;

struct ListState<T> {
    items: Vec<TimedEntry<T>>,
    lifespan: Duration,
}

impl<T> ListState<T> {
    /// Keeps survivors in their original order. `retain` visits every slot
    /// exactly once, so removing one element never skips its neighbour.
    fn purge(&mut self) -> usize {
        let now = Instant::now();
        let lifespan = self.lifespan;
        let before = self.items.len();

        self.items.retain(|entry| !entry.is_expired_at(lifespan, now));

        before - self.items.len()
    }

    fn check_index(&self, index: usize) -> Result<(), TtlError> {
        if index < self.items.len() {
            Ok(())
        } else {
            Err(TtlError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

/// Thread-safe ordered list whose elements are evicted by a background
/// sweep once they outlive the configured lifespan.
///
/// Duplicates are allowed and position matters. Sweeps and removals keep the
/// relative order of every surviving element. [`push`](Self::push),
/// [`insert`](Self::insert) and [`set`](Self::set) stamp the element; reads
/// never do.
///
/// # Example
///
/// ```rust
/// use lifespan_core::{TtlConfig, TtlList};
/// use std::time::Duration;
///
/// let list = TtlList::new(TtlConfig::default().with_lifespan(Duration::from_secs(60))).unwrap();
/// list.push("x");
/// list.push("y");
/// list.push("x");
///
/// assert!(list.remove(&"x"));
/// assert_eq!(list.to_vec(), vec!["y"]);
/// ```
pub struct TtlList<T> {
    scheduler: ExpiryScheduler,
    state: Arc<Mutex<ListState<T>>>,
    comparer: Comparer<T>,
}

impl<T> TtlList<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty list and starts its sweep thread
    pub fn new(config: TtlConfig) -> Result<Self, TtlError>
    where
        T: PartialEq,
    {
        Self::build(config, Comparer::default(), std::iter::empty())
    }

    /// Creates a list seeded with `data` in order, every element stamped
    /// with the construction time
    pub fn with_data<I>(config: TtlConfig, data: I) -> Result<Self, TtlError>
    where
        I: IntoIterator<Item = T>,
        T: PartialEq,
    {
        Self::build(config, Comparer::default(), data)
    }

    /// Creates an empty list that compares elements with `comparer`
    pub fn with_comparer(config: TtlConfig, comparer: Comparer<T>) -> Result<Self, TtlError> {
        Self::build(config, comparer, std::iter::empty())
    }

    fn build<I>(config: TtlConfig, comparer: Comparer<T>, data: I) -> Result<Self, TtlError>
    where
        I: IntoIterator<Item = T>,
    {
        config.validate()?;

        let now = Instant::now();
        let items = data
            .into_iter()
            .map(|item| TimedEntry::stamped(item, now))
            .collect();

        let state = Arc::new(Mutex::new(ListState {
            items,
            lifespan: config.lifespan,
        }));

        let sweep_state = Arc::clone(&state);
        let scheduler = ExpiryScheduler::new("ttl-list", config.interval, move || {
            Ok(sweep_state.lock().purge())
        })?;
        scheduler.start()?;

        Ok(Self {
            scheduler,
            state,
            comparer,
        })
    }

    /// Appends `item` at the end
    pub fn push(&self, item: T) {
        self.state.lock().items.push(TimedEntry::new(item));
    }

    /// Appends every item in order, all sharing one stamp
    pub fn extend<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let now = Instant::now();
        self.state
            .lock()
            .items
            .extend(items.into_iter().map(|item| TimedEntry::stamped(item, now)));
    }

    /// Inserts `item` at `index`, shifting later elements right.
    ///
    /// `index` may equal the length, which appends.
    pub fn insert(&self, index: usize, item: T) -> Result<(), TtlError> {
        let mut state = self.state.lock();
        let len = state.items.len();
        if index > len {
            return Err(TtlError::IndexOutOfRange { index, len });
        }
        state.items.insert(index, TimedEntry::new(item));
        Ok(())
    }

    /// Returns a copy of the element at `index`
    pub fn get(&self, index: usize) -> Result<T, TtlError> {
        let state = self.state.lock();
        state.check_index(index)?;
        Ok(state.items[index].value().clone())
    }

    /// Overwrites the element at `index` and restamps it.
    ///
    /// Returns the replaced value.
    pub fn set(&self, index: usize, item: T) -> Result<T, TtlError> {
        let mut state = self.state.lock();
        state.check_index(index)?;
        Ok(state.items[index].replace(item))
    }

    /// Removes and returns the element at `index`
    pub fn remove_at(&self, index: usize) -> Result<T, TtlError> {
        let mut state = self.state.lock();
        state.check_index(index)?;
        Ok(state.items.remove(index).into_value())
    }

    /// Removes **every** element equal to `item`.
    ///
    /// Returns `true` if at least one was removed.
    #[must_use = "returns whether anything was removed"]
    pub fn remove(&self, item: &T) -> bool {
        self.remove_matching(item) > 0
    }

    /// Removes every element equal to `item` and returns how many went
    pub fn remove_matching(&self, item: &T) -> usize {
        let mut state = self.state.lock();
        let before = state.items.len();
        state
            .items
            .retain(|entry| !self.comparer.equals(entry.value(), item));
        before - state.items.len()
    }

    /// Position of the first element equal to `item`
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.state
            .lock()
            .items
            .iter()
            .position(|entry| self.comparer.equals(entry.value(), item))
    }

    /// Checks if any element equals `item`
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Returns the number of elements not yet swept (may include expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns `true` if the list holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Removes all elements
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    /// Copies the elements, in order, into a plain `Vec`
    pub fn to_vec(&self) -> Vec<T> {
        self.state
            .lock()
            .items
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Iterates over a copy of the elements taken under the lock
    pub fn iter(&self) -> ListIter<T> {
        self.to_vec().into_iter()
    }

    /// Runs a sweep now on the calling thread and returns how many elements
    /// were removed
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge()
    }

    /// Returns the current lifespan
    pub fn lifespan(&self) -> Duration {
        self.state.lock().lifespan
    }

    /// Changes the lifespan; evaluated at the next sweep against each
    /// element's original stamp
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

    /// Stops background sweeping, waiting for an in-flight sweep to finish
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

impl<'a, T> IntoIterator for &'a TtlList<T>
where
    T: Clone + Send + 'static,
{
    type Item = T;
    type IntoIter = ListIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> std::fmt::Debug for TtlList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TtlList")
            .field("len", &state.items.len())
            .field("lifespan", &state.lifespan)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
