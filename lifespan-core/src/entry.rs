use std::time::{Duration, Instant};

/// A stored value together with the instant it was created or last replaced
#[derive(Debug, Clone)]
pub struct TimedEntry<T> {
    value: T,
    stamped_at: Instant,
}

impl<T> TimedEntry<T> {
    /// Creates a new entry stamped with the current time
    pub fn new(value: T) -> Self {
        Self::stamped(value, Instant::now())
    }

    /// Creates a new entry with an explicit timestamp
    pub fn stamped(value: T, stamped_at: Instant) -> Self {
        Self { value, stamped_at }
    }

    /// Returns a reference to the stored value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the entry and returns the stored value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Time elapsed since the entry was stamped
    pub fn age(&self) -> Duration {
        self.age_at(Instant::now())
    }

    /// Age relative to `now`, zero if `now` precedes the stamp
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stamped_at)
    }

    /// Checks if this entry has outlived `lifespan` as of `now`. A sweep
    /// passes one `now` so every entry is judged against the same instant.
    pub fn is_expired_at(&self, lifespan: Duration, now: Instant) -> bool {
        self.age_at(now) >= lifespan
    }

    /// Time left before the entry becomes eligible for removal
    pub fn remaining(&self, lifespan: Duration) -> Duration {
        lifespan.saturating_sub(self.age())
    }

    /// Replaces the value and restamps the entry, returning the old value
    pub fn replace(&mut self, value: T) -> T {
        self.stamped_at = Instant::now();
        std::mem::replace(&mut self.value, value)
    }
}
