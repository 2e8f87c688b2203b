//! Per-user synchronization session.
//!
//! A [`Session`] wires one cache store to the view readers, the mutation
//! coordinator, the reconciliation scheduler and the notification slot, all
//! bound to the signed-in user.

use crate::cache::{CacheKey, CacheStore, CacheableView};
use crate::config::SyncConfig;
use crate::coordinator::{MutationCoordinator, MutationHandle};
use crate::error::MutationResult;
use crate::notifications::NotificationSlot;
use crate::reconcile::ReconciliationScheduler;
use crate::views::{ActiveView, ViewReader, ViewState};
use fithero_core::{
    Achievement, AchievementId, ApiResult, DailyProgress, DailyTask, DailyTaskId,
    GamificationApi, LeaderboardEntry, LevelProgress, Profile, TaskCompletion, UserAchievement,
    UserId,
};
use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::info;

type Fetch<T> = Box<dyn Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

pub struct Session {
    user: UserId,
    api: Arc<dyn GamificationApi>,
    config: SyncConfig,
    store: CacheStore,
    views: ViewReader,
    scheduler: ReconciliationScheduler,
    coordinator: MutationCoordinator,
    notifications: NotificationSlot,
}

impl Session {
    /// Build a session for `user` without touching the backend.
    pub fn new(user: UserId, api: Arc<dyn GamificationApi>, config: SyncConfig) -> Self {
        let store = CacheStore::new();
        let views = ViewReader::new(store.clone(), config.ttls.clone());
        let scheduler = ReconciliationScheduler::new(store.clone(), config.reconciliation_delay);
        let notifications = NotificationSlot::new();
        let coordinator = MutationCoordinator::new(
            user,
            Arc::clone(&api),
            store.clone(),
            scheduler.clone(),
            notifications.clone(),
            &config,
        );
        Self {
            user,
            api,
            config,
            store,
            views,
            scheduler,
            coordinator,
            notifications,
        }
    }

    /// Fetch the current profile to learn who is signed in, and start a
    /// session with that profile already cached.
    pub async fn connect(api: Arc<dyn GamificationApi>, config: SyncConfig) -> ApiResult<Self> {
        let profile = api.profile().await?;
        let session = Self::new(profile.id, api, config);
        let key = CacheKey::Profile(profile.id);
        info!(user_id = %profile.id, username = %profile.username, "Session started");
        let ttl = session.config.ttls.for_key(key);
        session.store.store_fetched(key, profile.wrap(), ttl);
        Ok(session)
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn views(&self) -> &ViewReader {
        &self.views
    }

    pub fn scheduler(&self) -> &ReconciliationScheduler {
        &self.scheduler
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn notifications(&self) -> &NotificationSlot {
        &self.notifications
    }

    // ========================================================================
    // VIEWS
    // ========================================================================

    pub async fn profile(&self) -> ViewState<Profile> {
        self.views
            .read(CacheKey::Profile(self.user), self.profile_fetch())
            .await
    }

    pub async fn daily_tasks(&self) -> ViewState<Vec<DailyTask>> {
        self.views
            .read(CacheKey::DailyTasks(self.user), self.daily_tasks_fetch())
            .await
    }

    pub async fn achievements(&self) -> ViewState<Vec<Achievement>> {
        self.views
            .read(CacheKey::AchievementCatalog, self.catalog_fetch())
            .await
    }

    pub async fn unlocked_achievements(&self) -> ViewState<Vec<UserAchievement>> {
        self.views
            .read(
                CacheKey::UnlockedAchievements(self.user),
                self.unlocked_fetch(),
            )
            .await
    }

    pub async fn leaderboard(&self) -> ViewState<Vec<LeaderboardEntry>> {
        self.views
            .read(CacheKey::Leaderboard, self.leaderboard_fetch())
            .await
    }

    /// Level, thresholds and progress derived from the profile's points.
    pub async fn level_progress(&self) -> ViewState<LevelProgress> {
        self.profile().await.map(|profile| profile.level_progress())
    }

    /// Completed versus total daily tasks.
    pub async fn daily_progress(&self) -> ViewState<DailyProgress> {
        self.daily_tasks()
            .await
            .map(|tasks| DailyProgress::from_tasks(&tasks))
    }

    /// Keep the view under `key` populated and refetched on invalidation
    /// until the returned handle is dropped.
    pub fn keep_fresh(&self, key: CacheKey) -> ActiveView {
        match key {
            CacheKey::Profile(_) => self.views.keep_fresh(key, self.profile_fetch()),
            CacheKey::DailyTasks(_) => self.views.keep_fresh(key, self.daily_tasks_fetch()),
            CacheKey::UnlockedAchievements(_) => self.views.keep_fresh(key, self.unlocked_fetch()),
            CacheKey::AchievementCatalog => self.views.keep_fresh(key, self.catalog_fetch()),
            CacheKey::Leaderboard => self.views.keep_fresh(key, self.leaderboard_fetch()),
        }
    }

    /// Invalidate every view of this session.
    pub fn force_refresh_all(&self) -> usize {
        let invalidated = CacheKey::all_for(self.user)
            .into_iter()
            .filter(|key| self.store.invalidate(*key))
            .count();
        info!(user_id = %self.user, invalidated, "Forced refresh of all views");
        invalidated
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    pub fn complete_task(
        &self,
        task_id: DailyTaskId,
    ) -> MutationResult<MutationHandle<TaskCompletion>> {
        self.coordinator.complete_task(task_id)
    }

    pub fn unlock_achievement(
        &self,
        achievement_id: AchievementId,
    ) -> MutationResult<MutationHandle<UserAchievement>> {
        self.coordinator.unlock_achievement(achievement_id)
    }

    pub fn generate_tasks(&self) -> MutationResult<MutationHandle<Vec<DailyTask>>> {
        self.coordinator.generate_tasks()
    }

    // ========================================================================
    // FETCHERS
    // ========================================================================

    fn profile_fetch(&self) -> Fetch<Profile> {
        let api = Arc::clone(&self.api);
        Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.profile().await }.boxed()
        })
    }

    fn daily_tasks_fetch(&self) -> Fetch<Vec<DailyTask>> {
        let api = Arc::clone(&self.api);
        Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.daily_tasks().await }.boxed()
        })
    }

    fn catalog_fetch(&self) -> Fetch<Vec<Achievement>> {
        let api = Arc::clone(&self.api);
        Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.achievements().await }.boxed()
        })
    }

    fn unlocked_fetch(&self) -> Fetch<Vec<UserAchievement>> {
        let api = Arc::clone(&self.api);
        Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.unlocked_achievements().await }.boxed()
        })
    }

    fn leaderboard_fetch(&self) -> Fetch<Vec<LeaderboardEntry>> {
        let api = Arc::clone(&self.api);
        let limit = self.config.leaderboard_limit;
        Box::new(move || {
            let api = Arc::clone(&api);
            async move { api.leaderboard(limit).await }.boxed()
        })
    }
}
