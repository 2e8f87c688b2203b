//! Backend contract consumed by the synchronization layer.
//!
//! Authentication is owned by the implementor: the trait only sees calls on
//! behalf of "the current user".

use crate::entities::{Achievement, DailyTask, LeaderboardEntry, Profile, UserAchievement};
use crate::error::ApiResult;
use crate::identity::{AchievementId, DailyTaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Response to completing a daily task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub points_earned: u32,
    #[serde(default)]
    pub level_up: bool,
    #[serde(default)]
    pub new_level: Option<u8>,
    #[serde(default)]
    pub achievement_unlocked: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response to unlocking an achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub user_achievement: UserAchievement,
}

/// Calls the synchronization layer makes against the backend.
#[async_trait]
pub trait GamificationApi: Send + Sync + 'static {
    /// Profile of the current user.
    async fn profile(&self) -> ApiResult<Profile>;

    /// Today's tasks for the current user, in display order.
    async fn daily_tasks(&self) -> ApiResult<Vec<DailyTask>>;

    /// Mark a daily task as completed.
    async fn complete_task(&self, task_id: DailyTaskId) -> ApiResult<TaskCompletion>;

    /// Generate today's tasks, replacing the current list.
    async fn generate_daily_tasks(&self) -> ApiResult<Vec<DailyTask>>;

    /// Full achievement catalog.
    async fn achievements(&self) -> ApiResult<Vec<Achievement>>;

    /// Achievements unlocked by the current user.
    async fn unlocked_achievements(&self) -> ApiResult<Vec<UserAchievement>>;

    /// Spend points to unlock an achievement.
    async fn unlock_achievement(&self, achievement_id: AchievementId) -> ApiResult<AchievementUnlock>;

    /// Top `limit` users ordered by points, highest first.
    async fn leaderboard(&self, limit: usize) -> ApiResult<Vec<LeaderboardEntry>>;
}
