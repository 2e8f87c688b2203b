//! Keyed cache of view snapshots with explicit staleness.
//!
//! Server state is partitioned by view: every [`CacheKey`] is fetched,
//! cached and invalidated on its own. There is no global state object. What
//! keeps the views consistent is the propagator, which turns one domain event
//! into writes across several keys.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::new();
//! store.store_fetched(CacheKey::Leaderboard, rows.wrap(), Duration::from_secs(30));
//!
//! // Optimistic local write: visible immediately, freshness unchanged
//! store.write(CacheKey::Leaderboard, |old| old.cloned());
//!
//! // Ask the next reader to go back to the server
//! store.invalidate(CacheKey::Leaderboard);
//! ```

pub mod entry;
pub mod key;
pub mod store;
pub mod value;

pub use entry::CacheEntry;
pub use key::CacheKey;
pub use store::{CacheStore, FetchTicket, Subscription};
pub use value::{CacheValue, CacheableView};
