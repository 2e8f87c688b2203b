//! Optimistic mutation lifecycle.
//!
//! A mutation moves `Planned → AwaitingServer → {Committed | RolledBack}` and
//! is then handed to the reconciliation scheduler. Each stage is its own
//! type, so committing a rolled-back mutation, or rolling back twice, does
//! not compile.

use crate::cache::{CacheKey, CacheStore};
use crate::propagator::Plan;
use crate::reconcile::ReconciliationScheduler;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

// ============================================================================
// KINDS AND PHASES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CompleteTask,
    UnlockAchievement,
    GenerateTasks,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CompleteTask => "complete_task",
            MutationKind::UnlockAchievement => "unlock_achievement",
            MutationKind::GenerateTasks => "generate_tasks",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime view of where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationPhase {
    Idle,
    Applying,
    AwaitingServer,
    Committed,
    RolledBack,
    Reconciling,
}

impl MutationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationPhase::Idle => "idle",
            MutationPhase::Applying => "applying",
            MutationPhase::AwaitingServer => "awaiting_server",
            MutationPhase::Committed => "committed",
            MutationPhase::RolledBack => "rolled_back",
            MutationPhase::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// KEY LEASES
// ============================================================================

/// Keys held by mutations waiting on the server.
///
/// Lease state lives in the cache store itself, so a fetch result and a
/// lease are always checked under the same lock.
#[derive(Clone)]
pub struct KeyLeases {
    store: CacheStore,
}

impl KeyLeases {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Take every key in `keys`, or none of them.
    ///
    /// On conflict returns the first key already held.
    pub fn acquire(&self, keys: &[CacheKey]) -> Result<KeyLease, CacheKey> {
        let mut taken: Vec<CacheKey> = keys.to_vec();
        taken.sort();
        taken.dedup();
        self.store.try_lease(&taken)?;
        Ok(KeyLease {
            keys: taken,
            leases: self.clone(),
        })
    }

    pub fn is_held(&self, key: CacheKey) -> bool {
        self.store.is_leased(key)
    }

    pub fn held(&self) -> Vec<CacheKey> {
        self.store.leased()
    }
}

/// Keys held by one mutation. Released on drop.
pub struct KeyLease {
    keys: Vec<CacheKey>,
    leases: KeyLeases,
}

impl KeyLease {
    pub fn keys(&self) -> &[CacheKey] {
        &self.keys
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        self.leases.store.release(&self.keys);
    }
}

impl fmt::Debug for KeyLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLease").field("keys", &self.keys).finish()
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for mutation stages.
pub trait MutationState: private::Sealed + Send + Sync {
    const PHASE: MutationPhase;
}

/// Stages after the server answered.
pub trait Settled: MutationState {}

/// Built, nothing written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planned;
impl MutationState for Planned {
    const PHASE: MutationPhase = MutationPhase::Applying;
}

/// Forward deltas written, server call outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitingServer;
impl MutationState for AwaitingServer {
    const PHASE: MutationPhase = MutationPhase::AwaitingServer;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed;
impl MutationState for Committed {
    const PHASE: MutationPhase = MutationPhase::Committed;
}
impl Settled for Committed {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolledBack;
impl MutationState for RolledBack {
    const PHASE: MutationPhase = MutationPhase::RolledBack;
}
impl Settled for RolledBack {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Planned {}
    impl Sealed for super::AwaitingServer {}
    impl Sealed for super::Committed {}
    impl Sealed for super::RolledBack {}
}

// ============================================================================
// MUTATION
// ============================================================================

/// One optimistic mutation, from plan to reconciliation.
///
/// The mutation owns the lease on its target keys, so the keys stay
/// reserved until [`Mutation::reconcile`] consumes it (or it is dropped).
#[derive(Debug)]
pub struct Mutation<S: MutationState> {
    kind: MutationKind,
    plan: Plan,
    targets: Vec<CacheKey>,
    lease: KeyLease,
    _state: PhantomData<S>,
}

impl<S: MutationState> Mutation<S> {
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn phase(&self) -> MutationPhase {
        S::PHASE
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Keys reserved by this mutation.
    pub fn targets(&self) -> &[CacheKey] {
        &self.targets
    }

    fn into_state<T: MutationState>(self) -> Mutation<T> {
        debug!(kind = %self.kind, from = %S::PHASE, to = %T::PHASE, "Mutation transition");
        Mutation {
            kind: self.kind,
            plan: self.plan,
            targets: self.targets,
            lease: self.lease,
            _state: PhantomData,
        }
    }
}

impl Mutation<Planned> {
    pub fn new(kind: MutationKind, plan: Plan, lease: KeyLease) -> Self {
        let mut targets: Vec<CacheKey> = lease.keys().to_vec();
        for key in plan.keys() {
            if !targets.contains(&key) {
                targets.push(key);
            }
        }
        Self {
            kind,
            plan,
            targets,
            lease,
            _state: PhantomData,
        }
    }

    /// Write the forward deltas.
    pub fn apply(self, store: &CacheStore) -> Mutation<AwaitingServer> {
        self.plan.apply(store);
        self.into_state()
    }
}

impl Mutation<AwaitingServer> {
    /// Keep the optimistic writes and merge the server's authoritative
    /// fields on top of them.
    pub fn commit(self, store: &CacheStore, merge: &Plan) -> Mutation<Committed> {
        merge.apply(store);
        self.into_state()
    }

    /// Undo the forward deltas.
    pub fn rollback(self, store: &CacheStore) -> Mutation<RolledBack> {
        self.plan.revert(store);
        self.into_state()
    }
}

impl<S: Settled> Mutation<S> {
    /// Schedule every affected key for an authoritative refetch and release
    /// the lease. Returns the scheduled keys.
    pub fn reconcile(self, scheduler: &ReconciliationScheduler) -> Vec<CacheKey> {
        debug!(kind = %self.kind, from = %S::PHASE, to = %MutationPhase::Reconciling, "Mutation transition");
        scheduler.schedule(&self.targets);
        let Mutation { targets, lease, .. } = self;
        drop(lease);
        debug!(to = %MutationPhase::Idle, "Mutation finished");
        targets
    }
}
