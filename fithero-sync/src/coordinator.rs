//! Optimistic mutation coordinator.
//!
//! Every user action goes through the same steps: check preconditions
//! against the cache, lease the target keys, write the forward deltas, then
//! settle against the server on a spawned task. Settlement commits or rolls
//! back, shows exactly one notification, and schedules reconciliation.
//!
//! Settlement does not depend on the caller: dropping the returned
//! [`MutationHandle`] detaches it, the cache is still committed or restored.

use crate::cache::{CacheKey, CacheStore};
use crate::config::SyncConfig;
use crate::error::{MutationError, MutationResult};
use crate::mutation::{AwaitingServer, KeyLease, KeyLeases, Mutation, MutationKind};
use crate::notifications::{NotificationSlot, Severity};
use crate::propagator::{DomainEvent, Plan, Propagator};
use crate::reconcile::ReconciliationScheduler;
use chrono::Utc;
use fithero_core::{
    Achievement, AchievementId, AchievementUnlock, ApiError, DailyTask, DailyTaskId,
    GamificationApi, Profile, TaskCompletion, UserAchievement, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const COMPLETE_TASK_FAILED: &str = "Failed to complete task";
const UNLOCK_FAILED: &str = "Failed to unlock achievement";
const GENERATE_FAILED: &str = "Failed to generate tasks";

/// Outcome of a mutation that passed its preconditions.
///
/// Awaiting is optional. Dropping the handle leaves settlement running.
#[derive(Debug)]
pub struct MutationHandle<T> {
    kind: MutationKind,
    task: JoinHandle<MutationResult<T>>,
}

impl<T> MutationHandle<T> {
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn is_settled(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the server call and the resulting commit or rollback.
    pub async fn settled(self) -> MutationResult<T> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(kind = %self.kind, error = %join_err, "Mutation settlement task died");
                Err(MutationError::SettlementLost(join_err.to_string()))
            }
        }
    }
}

/// Runs user actions against the cache and the backend.
///
/// Methods must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct MutationCoordinator {
    user: UserId,
    api: Arc<dyn GamificationApi>,
    store: CacheStore,
    propagator: Propagator,
    scheduler: ReconciliationScheduler,
    notifications: NotificationSlot,
    leases: KeyLeases,
    dismiss_after: Duration,
}

impl MutationCoordinator {
    pub fn new(
        user: UserId,
        api: Arc<dyn GamificationApi>,
        store: CacheStore,
        scheduler: ReconciliationScheduler,
        notifications: NotificationSlot,
        config: &SyncConfig,
    ) -> Self {
        Self {
            user,
            api,
            propagator: Propagator::new(store.clone()),
            leases: KeyLeases::new(store.clone()),
            store,
            scheduler,
            notifications,
            dismiss_after: config.notification_dismiss,
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// True while a mutation holds `key`.
    pub fn is_pending(&self, key: CacheKey) -> bool {
        self.leases.is_held(key)
    }

    /// Keys held by mutations waiting on the server.
    pub fn pending_keys(&self) -> Vec<CacheKey> {
        self.leases.held()
    }

    // ========================================================================
    // COMPLETE TASK
    // ========================================================================

    /// Mark a daily task completed and credit its points right away.
    pub fn complete_task(
        &self,
        task_id: DailyTaskId,
    ) -> MutationResult<MutationHandle<TaskCompletion>> {
        let kind = MutationKind::CompleteTask;
        let lease = self.lease(
            kind,
            &[
                CacheKey::DailyTasks(self.user),
                CacheKey::Profile(self.user),
                CacheKey::Leaderboard,
            ],
        )?;
        let task = self.check_completable(task_id).map_err(|err| self.reject(kind, err))?;

        let guess = task.points();
        let plan = self.propagator.plan(&DomainEvent::TaskCompleted {
            user: self.user,
            task: task_id,
            points: guess,
        });
        let mutation = Mutation::new(kind, plan, lease).apply(&self.store);
        info!(kind = %kind, task_id = %task_id, points = guess, "Optimistic update applied");

        let this = self.clone();
        let task = tokio::spawn(async move {
            let response = this.api.complete_task(task_id).await;
            this.settle_completion(mutation, guess, response)
        });
        Ok(MutationHandle { kind, task })
    }

    fn check_completable(&self, task_id: DailyTaskId) -> MutationResult<DailyTask> {
        let key = CacheKey::DailyTasks(self.user);
        let tasks = self
            .store
            .view::<Vec<DailyTask>>(key)
            .ok_or(MutationError::NotLoaded(key))?;
        let task = tasks
            .into_iter()
            .find(|task| task.id == task_id)
            .ok_or(MutationError::UnknownTask(task_id))?;
        if task.completed {
            return Err(MutationError::AlreadyCompleted(task_id));
        }
        Ok(task)
    }

    fn settle_completion(
        &self,
        mutation: Mutation<AwaitingServer>,
        guess: u32,
        response: Result<TaskCompletion, ApiError>,
    ) -> MutationResult<TaskCompletion> {
        match response {
            Ok(completion) => {
                let correction = i64::from(completion.points_earned) - i64::from(guess);
                let merge = if correction != 0 {
                    self.propagator.plan(&DomainEvent::PointsCorrected {
                        user: self.user,
                        amount: correction,
                    })
                } else {
                    Plan::default()
                };
                let committed = mutation.commit(&self.store, &merge);
                info!(
                    kind = %committed.kind(),
                    points_earned = completion.points_earned,
                    correction,
                    level_up = completion.level_up,
                    "Mutation committed"
                );
                self.notify(Severity::Success, self.completion_message(&completion));
                committed.reconcile(&self.scheduler);
                Ok(completion)
            }
            Err(err) => Err(self.roll_back(mutation, err, COMPLETE_TASK_FAILED)),
        }
    }

    fn completion_message(&self, completion: &TaskCompletion) -> String {
        let mut message = String::from("Great job! Task completed!");
        if completion.points_earned > 0 {
            message.push_str(&format!(
                " You earned {} points!",
                completion.points_earned
            ));
        }
        if completion.level_up {
            let level = completion.new_level.or_else(|| {
                self.store
                    .view::<Profile>(CacheKey::Profile(self.user))
                    .map(|profile| profile.level())
            });
            match level {
                Some(level) => message.push_str(&format!(" Level up! You're now level {}!", level)),
                None => message.push_str(" Level up!"),
            }
        }
        if completion.achievement_unlocked {
            message.push_str(" New achievement unlocked!");
        }
        message
    }

    // ========================================================================
    // UNLOCK ACHIEVEMENT
    // ========================================================================

    /// Spend points on an achievement. Rejected locally when the cached
    /// points do not cover its cost.
    pub fn unlock_achievement(
        &self,
        achievement_id: AchievementId,
    ) -> MutationResult<MutationHandle<UserAchievement>> {
        let kind = MutationKind::UnlockAchievement;
        let lease = self.lease(
            kind,
            &[
                CacheKey::Profile(self.user),
                CacheKey::UnlockedAchievements(self.user),
                CacheKey::Leaderboard,
            ],
        )?;
        let achievement = self
            .check_unlockable(achievement_id)
            .map_err(|err| self.reject(kind, err))?;

        let record = UserAchievement::pending(achievement.clone(), Utc::now());
        let plan = self.propagator.plan(&DomainEvent::AchievementUnlocked {
            user: self.user,
            record,
        });
        let mutation = Mutation::new(kind, plan, lease).apply(&self.store);
        info!(
            kind = %kind,
            achievement_id = %achievement_id,
            cost = achievement.cost,
            "Optimistic update applied"
        );

        let this = self.clone();
        let task = tokio::spawn(async move {
            let response = this.api.unlock_achievement(achievement_id).await;
            this.settle_unlock(mutation, &achievement, response)
        });
        Ok(MutationHandle { kind, task })
    }

    fn check_unlockable(&self, achievement_id: AchievementId) -> MutationResult<Achievement> {
        let profile_key = CacheKey::Profile(self.user);
        let profile = self
            .store
            .view::<Profile>(profile_key)
            .ok_or(MutationError::NotLoaded(profile_key))?;

        let catalog = self
            .store
            .view::<Vec<Achievement>>(CacheKey::AchievementCatalog)
            .ok_or(MutationError::NotLoaded(CacheKey::AchievementCatalog))?;
        let achievement = catalog
            .into_iter()
            .find(|achievement| achievement.id == achievement_id)
            .ok_or(MutationError::UnknownAchievement(achievement_id))?;

        let already = self
            .store
            .view::<Vec<UserAchievement>>(CacheKey::UnlockedAchievements(self.user))
            .is_some_and(|records| records.iter().any(|r| r.achievement_id() == achievement_id));
        if already {
            return Err(MutationError::AlreadyUnlocked(achievement_id));
        }

        if profile.points < achievement.cost {
            return Err(MutationError::InsufficientPoints {
                required: achievement.cost,
                available: profile.points,
            });
        }
        Ok(achievement)
    }

    fn settle_unlock(
        &self,
        mutation: Mutation<AwaitingServer>,
        guess: &Achievement,
        response: Result<AchievementUnlock, ApiError>,
    ) -> MutationResult<UserAchievement> {
        match response {
            Ok(unlock) => {
                let record = unlock.user_achievement;
                let mut merge = self.propagator.plan(&DomainEvent::UnlockConfirmed {
                    user: self.user,
                    record: record.clone(),
                });
                let correction = i64::from(guess.cost) - i64::from(record.achievement.cost);
                if correction != 0 {
                    merge = merge.then(self.propagator.plan(&DomainEvent::PointsCorrected {
                        user: self.user,
                        amount: correction,
                    }));
                }
                let committed = mutation.commit(&self.store, &merge);
                info!(
                    kind = %committed.kind(),
                    achievement_id = %record.achievement_id(),
                    correction,
                    "Mutation committed"
                );
                self.notify(Severity::Success, unlock_message(&record.achievement));
                committed.reconcile(&self.scheduler);
                Ok(record)
            }
            Err(err) => Err(self.roll_back(mutation, err, UNLOCK_FAILED)),
        }
    }

    // ========================================================================
    // GENERATE TASKS
    // ========================================================================

    /// Ask the server for a new set of daily tasks.
    ///
    /// Nothing is written before the server answers; the new list replaces
    /// the cached one on success.
    pub fn generate_tasks(&self) -> MutationResult<MutationHandle<Vec<DailyTask>>> {
        let kind = MutationKind::GenerateTasks;
        let lease = self.lease(kind, &[CacheKey::DailyTasks(self.user)])?;
        let mutation = Mutation::new(kind, Plan::default(), lease).apply(&self.store);

        let this = self.clone();
        let task = tokio::spawn(async move {
            match this.api.generate_daily_tasks().await {
                Ok(tasks) => {
                    let merge = this.propagator.plan(&DomainEvent::TasksGenerated {
                        user: this.user,
                        tasks: tasks.clone(),
                    });
                    let committed = mutation.commit(&this.store, &merge);
                    info!(kind = %committed.kind(), count = tasks.len(), "Mutation committed");
                    this.notify(
                        Severity::Success,
                        "New daily tasks generated! Get ready for your fitness adventure!",
                    );
                    committed.reconcile(&this.scheduler);
                    Ok(tasks)
                }
                Err(err) => Err(this.roll_back(mutation, err, GENERATE_FAILED)),
            }
        });
        Ok(MutationHandle { kind, task })
    }

    // ========================================================================
    // SHARED STEPS
    // ========================================================================

    fn lease(&self, kind: MutationKind, keys: &[CacheKey]) -> MutationResult<KeyLease> {
        self.leases
            .acquire(keys)
            .map_err(|busy| self.reject(kind, MutationError::Busy(busy)))
    }

    /// Report a precondition failure. Nothing has been written.
    fn reject(&self, kind: MutationKind, err: MutationError) -> MutationError {
        warn!(kind = %kind, error = %err, "Mutation rejected");
        let severity = match err {
            MutationError::Busy(_) => Severity::Info,
            _ => Severity::Error,
        };
        self.notify(severity, err.user_message(""));
        err
    }

    fn roll_back(
        &self,
        mutation: Mutation<AwaitingServer>,
        err: ApiError,
        fallback: &str,
    ) -> MutationError {
        let rolled_back = mutation.rollback(&self.store);
        warn!(kind = %rolled_back.kind(), error = %err, "Mutation rolled back");
        self.notify(Severity::Error, err.user_message(fallback));
        rolled_back.reconcile(&self.scheduler);
        MutationError::Api(err)
    }

    fn notify(&self, severity: Severity, message: impl Into<String>) {
        let sequence = self.notifications.show(message, severity);
        if !self.dismiss_after.is_zero() {
            self.notifications.auto_dismiss(sequence, self.dismiss_after);
        }
    }
}

fn unlock_message(achievement: &Achievement) -> String {
    use fithero_core::AchievementKind;

    let mut message = String::from("Achievement unlocked!");
    match achievement.kind {
        AchievementKind::Character => {
            message.push_str(&format!(" You are now {}!", achievement.title))
        }
        AchievementKind::Upgrade => {
            message.push_str(&format!(" Your new title: {}!", achievement.title))
        }
        AchievementKind::Badge => {}
    }
    message.push_str(&format!(" ({} points spent)", achievement.cost));
    message
}
