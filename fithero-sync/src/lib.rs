//! FitHero Sync - Optimistic Client State
//!
//! Keeps the client's views of the FitHero backend (profile, daily tasks,
//! achievements, leaderboard) in a keyed cache, applies user actions to that
//! cache before the server answers, and heals any divergence by scheduled
//! refetches.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod notifications;
pub mod propagator;
pub mod reconcile;
pub mod session;
pub mod views;

pub use cache::{
    CacheEntry, CacheKey, CacheStore, CacheValue, CacheableView, FetchTicket, Subscription,
};
pub use config::{SyncConfig, ViewTtls};
pub use coordinator::{MutationCoordinator, MutationHandle};
pub use error::{MutationError, MutationResult};
pub use mutation::{KeyLease, KeyLeases, Mutation, MutationKind, MutationPhase};
pub use notifications::{Notification, NotificationSlot, Severity};
pub use propagator::{is_sorted_descending, Delta, DomainEvent, Plan, PlannedTransform, Propagator};
pub use reconcile::ReconciliationScheduler;
pub use session::Session;
pub use views::{ActiveView, ViewReader, ViewState};
