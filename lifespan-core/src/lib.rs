//! # Lifespan Core
//!
//! In-memory containers whose entries expire after a configured lifespan.
//!
//! ## Features
//!
//! - [`TtlMap`]: unique keys, evicts expired key/value pairs
//! - [`TtlList`]: ordered, duplicates allowed, evicts expired elements while
//!   keeping the order of survivors
//! - Expiry is enforced by a background sweep, one thread per container,
//!   driven by [`ExpiryScheduler`]
//! - One lock per container guards the store, the lifespan and the sweep
//! - Entries may outlive their lifespan by at most one sweep interval
//!
//! ## Example
//!
//! ```rust,no_run
//! use lifespan_core::{TtlConfig, TtlList, TtlMap};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), lifespan_core::TtlError> {
//!     // Sweep every 50ms, keep entries for 500ms
//!     let config = TtlConfig::default()
//!         .with_interval(Duration::from_millis(50))
//!         .with_lifespan(Duration::from_millis(500));
//!
//!     let sessions = TtlMap::new(config.clone())?;
//!     sessions.insert("user:123", "John Doe");
//!     assert_eq!(sessions.try_get("user:123"), Some("John Doe"));
//!
//!     let events = TtlList::new(config)?;
//!     events.push("login");
//!
//!     std::thread::sleep(Duration::from_millis(600));
//!     assert!(sessions.is_empty());
//!     assert!(events.is_empty());
//!
//!     // Sweep threads are joined on drop, or explicitly:
//!     sessions.stop();
//!     Ok(())
//! }
//! ```

mod compare;
mod config;
mod entry;
mod error;
mod list;
mod map;
mod scheduler;

pub use compare::Comparer;
pub use config::{TtlConfig, INTERVAL_ENV, LIFESPAN_ENV};
pub use entry::TimedEntry;
pub use error::{SweepFault, TtlError};
pub use list::{ListIter, TtlList};
pub use map::{MapIter, TtlMap};
pub use scheduler::{ExpiryScheduler, SchedulerStats, SweepFn};
