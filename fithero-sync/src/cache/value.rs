//! Snapshot payloads held by the cache and the typed views over them.

use fithero_core::{Achievement, DailyTask, LeaderboardEntry, Profile, UserAchievement};

/// Data held for one cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Profile(Profile),
    DailyTasks(Vec<DailyTask>),
    UnlockedAchievements(Vec<UserAchievement>),
    AchievementCatalog(Vec<Achievement>),
    Leaderboard(Vec<LeaderboardEntry>),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Profile(_) => "profile",
            CacheValue::DailyTasks(_) => "daily-tasks",
            CacheValue::UnlockedAchievements(_) => "unlocked-achievements",
            CacheValue::AchievementCatalog(_) => "achievement-catalog",
            CacheValue::Leaderboard(_) => "leaderboard",
        }
    }
}

/// Marker trait for types that can live in the cache.
///
/// # Implementation Requirements
///
/// - `wrap` and `peek` must agree: `Self::peek(&x.clone().wrap()) == Some(&x)`
/// - Implementations must be `Clone + Send + Sync + 'static` so that snapshots
///   can be handed to readers on any task
pub trait CacheableView: Clone + Send + Sync + 'static {
    /// Put the typed value into the cache's payload type.
    fn wrap(self) -> CacheValue;

    /// Borrow the typed value out of a payload, `None` on a shape mismatch.
    fn peek(value: &CacheValue) -> Option<&Self>;
}

macro_rules! impl_cacheable_view {
    ($ty:ty, $variant:ident) => {
        impl CacheableView for $ty {
            fn wrap(self) -> CacheValue {
                CacheValue::$variant(self)
            }

            fn peek(value: &CacheValue) -> Option<&Self> {
                match value {
                    CacheValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_cacheable_view!(Profile, Profile);
impl_cacheable_view!(Vec<DailyTask>, DailyTasks);
impl_cacheable_view!(Vec<UserAchievement>, UnlockedAchievements);
impl_cacheable_view!(Vec<Achievement>, AchievementCatalog);
impl_cacheable_view!(Vec<LeaderboardEntry>, Leaderboard);
