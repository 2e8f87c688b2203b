//! Plain-text rendering of views for the terminal.

use fithero_core::{
    Achievement, DailyProgress, DailyTask, LeaderboardEntry, LevelProgress, Profile,
    UserAchievement, UserId,
};
use fithero_sync::{Notification, ViewState};
use std::fmt::Write;

pub fn status(profile: &Profile, progress: &LevelProgress) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", profile.username, profile.character);
    let _ = writeln!(out, "  {}", profile.job_title);
    let _ = writeln!(
        out,
        "  Level {} - {} points - {} achievements",
        progress.level, progress.points, profile.achievements_count
    );
    match progress.next {
        Some(next) => {
            let _ = writeln!(
                out,
                "  {:.0}% to level {} ({} points to go, next at {})",
                progress.percent(),
                progress.level + 1,
                progress.remaining(),
                next
            );
        }
        None => {
            let _ = writeln!(out, "  Max level reached");
        }
    }
    out
}

pub fn tasks(tasks: &[DailyTask]) -> String {
    if tasks.is_empty() {
        return "No tasks for today. Run `fithero generate` to get some.\n".to_string();
    }
    let progress = DailyProgress::from_tasks(tasks);
    let mut out = format!(
        "Today's tasks: {}/{} done ({:.0}%)\n",
        progress.completed,
        progress.total,
        progress.percent()
    );
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        let _ = writeln!(
            out,
            "  [{}] #{:<4} {:<32} {:>4} pts  {}",
            mark,
            task.id.to_string(),
            task.task.title,
            task.points(),
            task.task.category
        );
    }
    out
}

pub fn achievements(catalog: &[Achievement], unlocked: &[UserAchievement], points: u32) -> String {
    if catalog.is_empty() {
        return "No achievements available.\n".to_string();
    }
    let mut out = String::new();
    for achievement in catalog {
        let state = if unlocked
            .iter()
            .any(|record| record.achievement_id() == achievement.id)
        {
            "unlocked"
        } else if points >= achievement.cost {
            "available"
        } else {
            "locked"
        };
        let _ = writeln!(
            out,
            "  #{:<4} {:<24} {:<10} {:>6} pts  {}",
            achievement.id.to_string(),
            achievement.title,
            achievement.kind,
            achievement.cost,
            state
        );
    }
    out
}

pub fn leaderboard(rows: &[LeaderboardEntry], me: UserId) -> String {
    if rows.is_empty() {
        return "Leaderboard is empty.\n".to_string();
    }
    let mut out = String::new();
    for (rank, row) in rows.iter().enumerate() {
        let marker = if row.id == me { ">" } else { " " };
        let _ = writeln!(
            out,
            "{} {:>3}. {:<20} {:>7} pts  lvl {}  {}",
            marker,
            rank + 1,
            row.username,
            row.points,
            row.level(),
            row.character
        );
    }
    out
}

pub fn notification(notification: &Notification) -> String {
    format!("[{}] {}", notification.severity, notification.message)
}

/// Data of a view, or a description of why there is none.
pub fn view_or_reason<'a, T>(state: &'a ViewState<T>, view: &str) -> Result<&'a T, String> {
    match (&state.data, &state.error) {
        (Some(data), _) => Ok(data),
        (None, Some(err)) => Err(format!(
            "Could not load {}: {}",
            view,
            err.user_message("request failed")
        )),
        (None, None) => Err(format!("No {} available", view)),
    }
}
