use std::fmt;
use std::sync::Arc;

/// Value equality used by membership and removal-by-value operations.
///
/// Defaults to `PartialEq`; a custom comparer can be supplied for
/// case-insensitive text, approximate numbers and similar cases.
pub struct Comparer<T> {
    eq: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> Comparer<T> {
    /// Wraps an arbitrary equality function
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self { eq: Arc::new(eq) }
    }

    /// Returns `true` if `a` and `b` are considered equal
    pub fn equals(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<T: PartialEq> Default for Comparer<T> {
    fn default() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<T> Clone for Comparer<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<T> fmt::Debug for Comparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Comparer")
    }
}
