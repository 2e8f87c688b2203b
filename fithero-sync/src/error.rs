//! Errors raised when a mutation is requested.

use crate::cache::CacheKey;
use fithero_core::{AchievementId, ApiError, DailyTaskId};
use thiserror::Error;

/// Why a mutation did not go through.
///
/// Precondition variants are detected locally and never reach the server or
/// the cache. `Api` is produced after an optimistic write and always comes
/// with a rollback. `SettlementLost` means the settlement task itself died,
/// so the caller cannot tell whether the cache was committed or restored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Not enough points: {required} required, {available} available")]
    InsufficientPoints { required: u32, available: u32 },

    #[error("Achievement {0} is already unlocked")]
    AlreadyUnlocked(AchievementId),

    #[error("Task {0} is already completed")]
    AlreadyCompleted(DailyTaskId),

    #[error("Task {0} is not in today's list")]
    UnknownTask(DailyTaskId),

    #[error("Achievement {0} is not in the catalog")]
    UnknownAchievement(AchievementId),

    #[error("{0} is not loaded yet")]
    NotLoaded(CacheKey),

    #[error("Another action on {0} is still waiting for the server")]
    Busy(CacheKey),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Mutation settlement did not finish: {0}")]
    SettlementLost(String),
}

impl MutationError {
    /// True for failures detected before any cache write.
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            MutationError::Api(_) | MutationError::SettlementLost(_)
        )
    }

    /// Text shown to the user. `fallback` is used for backend failures that
    /// carry no message of their own.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            MutationError::InsufficientPoints {
                required,
                available,
            } => format!(
                "Not enough points! You need {} points but only have {}.",
                required, available
            ),
            MutationError::AlreadyUnlocked(_) => "Achievement already unlocked".to_string(),
            MutationError::AlreadyCompleted(_) => "Task already completed".to_string(),
            MutationError::UnknownTask(_) => "Task not found".to_string(),
            MutationError::UnknownAchievement(_) => "Achievement not found".to_string(),
            MutationError::NotLoaded(key) => format!("Still loading {}", key.view_name()),
            MutationError::Busy(_) => "Please wait for the previous action to finish".to_string(),
            MutationError::Api(err) => err.user_message(fallback),
            MutationError::SettlementLost(_) => {
                "Something went wrong, please refresh".to_string()
            }
        }
    }
}

/// Result type alias for mutation requests.
pub type MutationResult<T> = Result<T, MutationError>;
