//! FitHero Core - Entity Types
//!
//! Data types shared by every FitHero crate: identifiers, the entities served
//! by the backend, level derivation, the backend contract and its errors.

pub mod api;
pub mod entities;
pub mod error;
pub mod identity;
pub mod level;

pub use api::{AchievementUnlock, GamificationApi, TaskCompletion};
pub use entities::{
    Achievement, AchievementKind, DailyProgress, DailyTask, Difficulty, DisplayField,
    LeaderboardEntry, Profile, Task, UserAchievement,
};
pub use error::{ApiError, ApiResult};
pub use identity::{
    AchievementId, DailyTaskId, EntityIdType, TaskId, Timestamp, UserAchievementId, UserId,
};
pub use level::{level_for_points, next_level_threshold, LevelProgress, LEVEL_THRESHOLDS, MAX_LEVEL};
