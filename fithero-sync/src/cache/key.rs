//! Cache keys, one per independently fetchable view.

use fithero_core::UserId;
use std::fmt;

/// Identifier of one view of server state.
///
/// Per-user views carry the user they belong to so that a key can never be
/// mistaken for another user's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Profile(UserId),
    DailyTasks(UserId),
    UnlockedAchievements(UserId),
    AchievementCatalog,
    Leaderboard,
}

impl CacheKey {
    /// Every key that belongs to `user`, plus the shared views.
    pub fn all_for(user: UserId) -> [CacheKey; 5] {
        [
            CacheKey::Profile(user),
            CacheKey::DailyTasks(user),
            CacheKey::UnlockedAchievements(user),
            CacheKey::AchievementCatalog,
            CacheKey::Leaderboard,
        ]
    }

    pub fn view_name(&self) -> &'static str {
        match self {
            CacheKey::Profile(_) => "profile",
            CacheKey::DailyTasks(_) => "daily-tasks",
            CacheKey::UnlockedAchievements(_) => "unlocked-achievements",
            CacheKey::AchievementCatalog => "achievement-catalog",
            CacheKey::Leaderboard => "leaderboard",
        }
    }

    pub fn user(&self) -> Option<UserId> {
        match self {
            CacheKey::Profile(user)
            | CacheKey::DailyTasks(user)
            | CacheKey::UnlockedAchievements(user) => Some(*user),
            CacheKey::AchievementCatalog | CacheKey::Leaderboard => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.user() {
            Some(user) => write!(f, "{}/{}", self.view_name(), user),
            None => write!(f, "{}", self.view_name()),
        }
    }
}
