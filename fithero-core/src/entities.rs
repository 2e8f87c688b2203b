//! Entity types as served by the FitHero backend.

use crate::identity::{AchievementId, DailyTaskId, TaskId, Timestamp, UserAchievementId, UserId};
use crate::level::{level_for_points, LevelProgress};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PROFILE
// ============================================================================

/// Profile of the authenticated user.
///
/// There is deliberately no `level` field: any level sent by the server is
/// dropped on deserialization and [`Profile::level`] recomputes it from
/// `points`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub points: u32,
    pub character: String,
    pub job_title: String,
    #[serde(default, alias = "achievement_count")]
    pub achievements_count: u32,
}

impl Profile {
    pub fn level(&self) -> u8 {
        level_for_points(self.points)
    }

    pub fn level_progress(&self) -> LevelProgress {
        LevelProgress::for_points(self.points)
    }

    pub fn display_field(&self, field: DisplayField) -> &str {
        match field {
            DisplayField::Character => &self.character,
            DisplayField::JobTitle => &self.job_title,
        }
    }

    pub fn set_display_field(&mut self, field: DisplayField, value: impl Into<String>) {
        match field {
            DisplayField::Character => self.character = value.into(),
            DisplayField::JobTitle => self.job_title = value.into(),
        }
    }
}

/// Profile fields that an unlocked achievement can overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayField {
    Character,
    JobTitle,
}

impl fmt::Display for DisplayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayField::Character => write!(f, "character"),
            DisplayField::JobTitle => write!(f, "job_title"),
        }
    }
}

// ============================================================================
// TASKS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A task template from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points: u32,
    pub category: String,
    pub difficulty: Difficulty,
}

/// A task assigned to the user for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTask {
    pub id: DailyTaskId,
    pub task: Task,
    #[serde(alias = "is_completed")]
    pub completed: bool,
    #[serde(default)]
    pub date: Option<Timestamp>,
}

impl DailyTask {
    /// Points awarded when this task is completed.
    pub fn points(&self) -> u32 {
        self.task.points
    }
}

/// Completed/total counts over today's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyProgress {
    pub completed: usize,
    pub total: usize,
}

impl DailyProgress {
    pub fn from_tasks(tasks: &[DailyTask]) -> Self {
        Self {
            completed: tasks.iter().filter(|t| t.completed).count(),
            total: tasks.len(),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

// ============================================================================
// ACHIEVEMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementKind {
    /// Replaces the user's character.
    Character,
    /// Replaces the user's job title.
    Upgrade,
    /// Collectible with no effect on the profile.
    Badge,
}

impl AchievementKind {
    /// Profile field overwritten by unlocking an achievement of this kind.
    pub fn display_field(&self) -> Option<DisplayField> {
        match self {
            AchievementKind::Character => Some(DisplayField::Character),
            AchievementKind::Upgrade => Some(DisplayField::JobTitle),
            AchievementKind::Badge => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementKind::Character => "character",
            AchievementKind::Upgrade => "upgrade",
            AchievementKind::Badge => "badge",
        }
    }
}

impl fmt::Display for AchievementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(rename = "points_cost", alias = "cost")]
    pub cost: u32,
    #[serde(rename = "type")]
    pub kind: AchievementKind,
}

/// An achievement unlocked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievement {
    /// `None` while the unlock is only known locally.
    #[serde(default)]
    pub id: Option<UserAchievementId>,
    pub achievement: Achievement,
    pub unlocked_at: Timestamp,
}

impl UserAchievement {
    /// Local placeholder written before the server confirms the unlock.
    pub fn pending(achievement: Achievement, unlocked_at: Timestamp) -> Self {
        Self {
            id: None,
            achievement,
            unlocked_at,
        }
    }

    pub fn achievement_id(&self) -> AchievementId {
        self.achievement.id
    }

    pub fn is_confirmed(&self) -> bool {
        self.id.is_some()
    }
}

// ============================================================================
// LEADERBOARD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: UserId,
    pub username: String,
    pub points: u32,
    pub character: String,
    pub job_title: String,
}

impl LeaderboardEntry {
    pub fn level(&self) -> u8 {
        level_for_points(self.points)
    }
}
