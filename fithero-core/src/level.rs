//! Level derivation from points.
//!
//! A user's level is never stored. It is recomputed from the point total
//! every time it is needed, so it cannot drift away from the points shown in
//! any view.

use serde::{Deserialize, Serialize};

/// Minimum points required to reach each level, indexed by `level - 1`.
pub const LEVEL_THRESHOLDS: [u32; 5] = [0, 250, 500, 1000, 2000];

/// Highest reachable level.
pub const MAX_LEVEL: u8 = LEVEL_THRESHOLDS.len() as u8;

/// Derive the level for a point total.
///
/// Pure, monotonic step function: 0 → 1, 250 → 2, 500 → 3, 1000 → 4,
/// 2000 and above → 5.
pub fn level_for_points(points: u32) -> u8 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|threshold| points >= *threshold)
        .map(|index| index as u8 + 1)
        .unwrap_or(1)
}

/// Points required to reach the level after `level`, or `None` at the cap.
pub fn next_level_threshold(level: u8) -> Option<u32> {
    if level == 0 {
        return Some(LEVEL_THRESHOLDS[0]);
    }
    LEVEL_THRESHOLDS.get(level as usize).copied()
}

/// Progress of a point total towards the next level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u8,
    pub points: u32,
    /// Threshold of the current level.
    pub floor: u32,
    /// Threshold of the next level, `None` when already at the cap.
    pub next: Option<u32>,
}

impl LevelProgress {
    pub fn for_points(points: u32) -> Self {
        let level = level_for_points(points);
        Self {
            level,
            points,
            floor: LEVEL_THRESHOLDS[(level - 1) as usize],
            next: next_level_threshold(level),
        }
    }

    /// Percentage (0.0 to 100.0) of the way from the current threshold to the next.
    pub fn percent(&self) -> f64 {
        match self.next {
            Some(next) => {
                let span = (next - self.floor) as f64;
                ((self.points - self.floor) as f64 / span * 100.0).clamp(0.0, 100.0)
            }
            None => 100.0,
        }
    }

    /// Points still missing to reach the next level.
    pub fn remaining(&self) -> u32 {
        self.next
            .map(|next| next.saturating_sub(self.points))
            .unwrap_or(0)
    }

    pub fn is_max_level(&self) -> bool {
        self.next.is_none()
    }
}
