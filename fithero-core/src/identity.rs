//! Identity types for FitHero entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour for the numeric identifiers handed out by the backend.
pub trait EntityIdType: Copy + Eq + std::hash::Hash + fmt::Display {
    /// Short name used in log fields and cache key rendering.
    const ENTITY_NAME: &'static str;

    /// Wrap a raw backend identifier.
    fn new(raw: u64) -> Self;

    /// Get the raw backend identifier.
    fn as_u64(&self) -> u64;
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(raw: u64) -> Self {
                Self(raw)
            }

            fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

define_entity_id!(
    /// Identifier of a registered user.
    UserId,
    "user"
);
define_entity_id!(
    /// Identifier of a task template in the task catalog.
    TaskId,
    "task"
);
define_entity_id!(
    /// Identifier of a task assigned to a user for one day.
    DailyTaskId,
    "daily_task"
);
define_entity_id!(
    /// Identifier of an achievement in the catalog.
    AchievementId,
    "achievement"
);
define_entity_id!(
    /// Identifier of a user's unlock record.
    UserAchievementId,
    "user_achievement"
);
