//! Runtime knobs for the synchronization layer.

use crate::cache::CacheKey;
use std::time::Duration;

/// Default delay before affected keys are invalidated after a mutation.
pub const DEFAULT_RECONCILIATION_DELAY: Duration = Duration::from_secs(5);

/// Default lifetime of a visible notification.
pub const DEFAULT_NOTIFICATION_DISMISS: Duration = Duration::from_secs(4);

/// Default number of leaderboard rows requested.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 20;

/// How long a fetched view stays fresh, per view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTtls {
    pub profile: Duration,
    pub daily_tasks: Duration,
    pub unlocked_achievements: Duration,
    pub achievement_catalog: Duration,
    pub leaderboard: Duration,
}

impl Default for ViewTtls {
    fn default() -> Self {
        Self {
            profile: Duration::from_secs(5 * 60),
            daily_tasks: Duration::from_secs(30),
            unlocked_achievements: Duration::from_secs(2 * 60),
            achievement_catalog: Duration::from_secs(10 * 60),
            leaderboard: Duration::from_secs(30),
        }
    }
}

impl ViewTtls {
    /// Same TTL for every view.
    pub fn uniform(ttl: Duration) -> Self {
        Self {
            profile: ttl,
            daily_tasks: ttl,
            unlocked_achievements: ttl,
            achievement_catalog: ttl,
            leaderboard: ttl,
        }
    }

    pub fn for_key(&self, key: CacheKey) -> Duration {
        match key {
            CacheKey::Profile(_) => self.profile,
            CacheKey::DailyTasks(_) => self.daily_tasks,
            CacheKey::UnlockedAchievements(_) => self.unlocked_achievements,
            CacheKey::AchievementCatalog => self.achievement_catalog,
            CacheKey::Leaderboard => self.leaderboard,
        }
    }
}

/// Configuration for a synchronization session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub ttls: ViewTtls,
    /// Delay between a settled mutation and the invalidation of its keys.
    pub reconciliation_delay: Duration,
    /// How long a notification stays visible before it is hidden.
    pub notification_dismiss: Duration,
    /// Rows requested when the leaderboard is fetched.
    pub leaderboard_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttls: ViewTtls::default(),
            reconciliation_delay: DEFAULT_RECONCILIATION_DELAY,
            notification_dismiss: DEFAULT_NOTIFICATION_DISMISS,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttls(mut self, ttls: ViewTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn with_reconciliation_delay(mut self, delay: Duration) -> Self {
        self.reconciliation_delay = delay;
        self
    }

    pub fn with_notification_dismiss(mut self, duration: Duration) -> Self {
        self.notification_dismiss = duration;
        self
    }

    pub fn with_leaderboard_limit(mut self, limit: usize) -> Self {
        self.leaderboard_limit = limit;
        self
    }
}
