//! Cross-view propagation rules.
//!
//! Every domain event is turned into a [`Plan`]: for each cached key the
//! event affects, the deltas to apply now and the deltas that undo them.
//! Inverses are computed when the plan is built, from the snapshot the
//! forward deltas will run against, so a rollback restores overwritten
//! strings and flags instead of guessing defaults.
//!
//! Keys that are not cached are left alone. Nothing here fetches.

use crate::cache::{CacheKey, CacheStore, CacheValue};
use fithero_core::{
    AchievementId, DailyTask, DailyTaskId, DisplayField, LeaderboardEntry, Profile,
    UserAchievement, UserId,
};

// ============================================================================
// DELTAS
// ============================================================================

/// One field-level change to a cached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Add to the profile's points.
    AdjustPoints { amount: i64 },
    /// Add to the profile's unlocked achievement count.
    AdjustAchievementCount { amount: i64 },
    /// Overwrite the profile's character or job title.
    SetDisplayField { field: DisplayField, value: String },
    /// Flip the completed flag of one daily task.
    SetTaskCompleted { task: DailyTaskId, completed: bool },
    /// Replace the whole daily task list.
    ReplaceDailyTasks(Vec<DailyTask>),
    /// Add to a leaderboard row's points and move the row.
    ///
    /// With `restore_index` the row is put back at that position, unless
    /// that would leave the board out of order. Without it the board is
    /// re-sorted descending by points.
    AdjustLeaderboardPoints {
        user: UserId,
        amount: i64,
        restore_index: Option<usize>,
    },
    /// Overwrite a display field of a leaderboard row.
    SetLeaderboardDisplay {
        user: UserId,
        field: DisplayField,
        value: String,
    },
    AppendUnlocked(UserAchievement),
    RemoveUnlocked(AchievementId),
    /// Swap in a new record for the same achievement.
    ReplaceUnlocked(UserAchievement),
}

impl Delta {
    /// Apply to `value`. Returns `None` when the delta does not fit the value
    /// (wrong shape, unknown row), in which case nothing is changed.
    pub fn apply(&self, value: &CacheValue) -> Option<CacheValue> {
        match (self, value) {
            (Delta::AdjustPoints { amount }, CacheValue::Profile(profile)) => {
                let mut profile = profile.clone();
                profile.points = offset(profile.points, *amount);
                Some(CacheValue::Profile(profile))
            }
            (Delta::AdjustAchievementCount { amount }, CacheValue::Profile(profile)) => {
                let mut profile = profile.clone();
                profile.achievements_count = offset(profile.achievements_count, *amount);
                Some(CacheValue::Profile(profile))
            }
            (Delta::SetDisplayField { field, value }, CacheValue::Profile(profile)) => {
                let mut profile = profile.clone();
                profile.set_display_field(*field, value.clone());
                Some(CacheValue::Profile(profile))
            }
            (Delta::SetTaskCompleted { task, completed }, CacheValue::DailyTasks(tasks)) => {
                let mut tasks = tasks.clone();
                let row = tasks.iter_mut().find(|t| t.id == *task)?;
                row.completed = *completed;
                Some(CacheValue::DailyTasks(tasks))
            }
            (Delta::ReplaceDailyTasks(next), CacheValue::DailyTasks(_)) => {
                Some(CacheValue::DailyTasks(next.clone()))
            }
            (
                Delta::AdjustLeaderboardPoints {
                    user,
                    amount,
                    restore_index,
                },
                CacheValue::Leaderboard(rows),
            ) => {
                let mut rows = rows.clone();
                let index = rows.iter().position(|row| row.id == *user)?;
                let mut row = rows.remove(index);
                row.points = offset(row.points, *amount);
                match restore_index {
                    Some(target) => {
                        rows.insert((*target).min(rows.len()), row);
                        // The board may have been refetched since the forward write.
                        if !is_sorted_descending(&rows) {
                            sort_leaderboard(&mut rows);
                        }
                    }
                    None => {
                        rows.insert(index, row);
                        sort_leaderboard(&mut rows);
                    }
                }
                Some(CacheValue::Leaderboard(rows))
            }
            (
                Delta::SetLeaderboardDisplay { user, field, value },
                CacheValue::Leaderboard(rows),
            ) => {
                let mut rows = rows.clone();
                let row = rows.iter_mut().find(|row| row.id == *user)?;
                match field {
                    DisplayField::Character => row.character = value.clone(),
                    DisplayField::JobTitle => row.job_title = value.clone(),
                }
                Some(CacheValue::Leaderboard(rows))
            }
            (Delta::AppendUnlocked(record), CacheValue::UnlockedAchievements(records)) => {
                let mut records = records.clone();
                records.push(record.clone());
                Some(CacheValue::UnlockedAchievements(records))
            }
            (Delta::RemoveUnlocked(id), CacheValue::UnlockedAchievements(records)) => {
                let mut records = records.clone();
                let index = records.iter().rposition(|r| r.achievement_id() == *id)?;
                records.remove(index);
                Some(CacheValue::UnlockedAchievements(records))
            }
            (Delta::ReplaceUnlocked(record), CacheValue::UnlockedAchievements(records)) => {
                let mut records = records.clone();
                let slot = records
                    .iter_mut()
                    .rfind(|r| r.achievement_id() == record.achievement_id())?;
                *slot = record.clone();
                Some(CacheValue::UnlockedAchievements(records))
            }
            _ => None,
        }
    }
}

fn offset(value: u32, amount: i64) -> u32 {
    (i64::from(value) + amount).clamp(0, i64::from(u32::MAX)) as u32
}

/// Amount that `offset(value, amount)` actually moves `value` by.
fn effective(value: u32, amount: i64) -> i64 {
    i64::from(offset(value, amount)) - i64::from(value)
}

/// Stable sort, highest points first.
pub fn sort_leaderboard(rows: &mut [LeaderboardEntry]) {
    rows.sort_by(|a, b| b.points.cmp(&a.points));
}

pub fn is_sorted_descending(rows: &[LeaderboardEntry]) -> bool {
    rows.windows(2).all(|pair| pair[0].points >= pair[1].points)
}

// ============================================================================
// PLANS
// ============================================================================

/// Deltas for one key, with the deltas that undo them.
///
/// `inverse` is already in undo order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransform {
    pub key: CacheKey,
    pub forward: Vec<Delta>,
    pub inverse: Vec<Delta>,
}

impl PlannedTransform {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            forward: Vec::new(),
            inverse: Vec::new(),
        }
    }

    fn push(&mut self, forward: Delta, inverse: Delta) {
        self.forward.push(forward);
        self.inverse.insert(0, inverse);
    }
}

/// Writes produced by one domain event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    transforms: Vec<PlannedTransform>,
}

impl Plan {
    pub fn transforms(&self) -> &[PlannedTransform] {
        &self.transforms
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.transforms.iter().map(|t| t.key).collect()
    }

    pub fn touches(&self, key: CacheKey) -> bool {
        self.transforms.iter().any(|t| t.key == key)
    }

    /// Run `other` after this plan.
    pub fn then(mut self, other: Plan) -> Plan {
        self.transforms.extend(other.transforms);
        self
    }

    fn push(&mut self, transform: PlannedTransform) {
        if !transform.forward.is_empty() {
            self.transforms.push(transform);
        }
    }

    /// Write the forward deltas, one atomic write per key.
    pub fn apply(&self, store: &CacheStore) {
        for transform in &self.transforms {
            write_all(store, transform.key, &transform.forward);
        }
    }

    /// Write the inverse deltas, undoing [`Plan::apply`].
    pub fn revert(&self, store: &CacheStore) {
        for transform in self.transforms.iter().rev() {
            write_all(store, transform.key, &transform.inverse);
        }
    }
}

fn write_all(store: &CacheStore, key: CacheKey, deltas: &[Delta]) {
    store.write(key, |current| {
        let mut value = current?.clone();
        let mut changed = false;
        for delta in deltas {
            match delta.apply(&value) {
                Some(next) => {
                    value = next;
                    changed = true;
                }
                None => tracing::debug!(key = %key, ?delta, "Delta does not apply, skipped"),
            }
        }
        changed.then_some(value)
    });
}

// ============================================================================
// EVENTS
// ============================================================================

/// Something the user did (or the server confirmed) that several views
/// need to reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A daily task was completed, worth `points`.
    TaskCompleted {
        user: UserId,
        task: DailyTaskId,
        points: u32,
    },
    /// An achievement was unlocked. `record` is what goes into the user's
    /// unlocked list.
    AchievementUnlocked {
        user: UserId,
        record: UserAchievement,
    },
    /// The server's points figure differs from what was applied locally.
    PointsCorrected { user: UserId, amount: i64 },
    /// The server confirmed an unlock; its record supersedes the local one.
    UnlockConfirmed {
        user: UserId,
        record: UserAchievement,
    },
    /// The server produced a new list of daily tasks.
    TasksGenerated { user: UserId, tasks: Vec<DailyTask> },
}

/// Maps domain events to per-key writes against the current cache contents.
#[derive(Clone)]
pub struct Propagator {
    store: CacheStore,
}

impl Propagator {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Plan the writes for `event` against what is cached right now.
    pub fn plan(&self, event: &DomainEvent) -> Plan {
        let mut plan = Plan::default();
        match event {
            DomainEvent::TaskCompleted { user, task, points } => {
                plan.push(self.task_flag(*user, *task, true));
                let amount = i64::from(*points);
                plan.push(self.profile(*user, amount, 0, None));
                plan.push(self.leaderboard(*user, amount, None));
            }
            DomainEvent::AchievementUnlocked { user, record } => {
                let achievement = &record.achievement;
                let amount = -i64::from(achievement.cost);
                let display = achievement
                    .kind
                    .display_field()
                    .map(|field| (field, achievement.title.as_str()));
                plan.push(self.profile(*user, amount, 1, display));
                plan.push(self.unlocked_append(*user, record));
                plan.push(self.leaderboard(*user, amount, display));
            }
            DomainEvent::PointsCorrected { user, amount } => {
                plan.push(self.profile(*user, *amount, 0, None));
                plan.push(self.leaderboard(*user, *amount, None));
            }
            DomainEvent::UnlockConfirmed { user, record } => {
                plan.push(self.unlocked_replace(*user, record));
            }
            DomainEvent::TasksGenerated { user, tasks } => {
                plan.push(self.tasks_replace(*user, tasks));
            }
        }
        plan
    }

    fn profile(
        &self,
        user: UserId,
        points: i64,
        count: i64,
        display: Option<(DisplayField, &str)>,
    ) -> PlannedTransform {
        let key = CacheKey::Profile(user);
        let mut transform = PlannedTransform::new(key);
        let Some(profile) = self.store.view::<Profile>(key) else {
            return transform;
        };

        let points = effective(profile.points, points);
        if points != 0 {
            transform.push(
                Delta::AdjustPoints { amount: points },
                Delta::AdjustPoints { amount: -points },
            );
        }
        let count = effective(profile.achievements_count, count);
        if count != 0 {
            transform.push(
                Delta::AdjustAchievementCount { amount: count },
                Delta::AdjustAchievementCount { amount: -count },
            );
        }
        if let Some((field, value)) = display {
            let prior = profile.display_field(field).to_string();
            if prior != value {
                transform.push(
                    Delta::SetDisplayField {
                        field,
                        value: value.to_string(),
                    },
                    Delta::SetDisplayField {
                        field,
                        value: prior,
                    },
                );
            }
        }
        transform
    }

    fn leaderboard(
        &self,
        user: UserId,
        amount: i64,
        display: Option<(DisplayField, &str)>,
    ) -> PlannedTransform {
        let key = CacheKey::Leaderboard;
        let mut transform = PlannedTransform::new(key);
        let Some(rows) = self.store.view::<Vec<LeaderboardEntry>>(key) else {
            return transform;
        };
        let Some(index) = rows.iter().position(|row| row.id == user) else {
            return transform;
        };
        let row = &rows[index];

        let amount = effective(row.points, amount);
        if amount != 0 {
            transform.push(
                Delta::AdjustLeaderboardPoints {
                    user,
                    amount,
                    restore_index: None,
                },
                Delta::AdjustLeaderboardPoints {
                    user,
                    amount: -amount,
                    restore_index: Some(index),
                },
            );
        }
        if let Some((field, value)) = display {
            let prior = match field {
                DisplayField::Character => row.character.clone(),
                DisplayField::JobTitle => row.job_title.clone(),
            };
            if prior != value {
                transform.push(
                    Delta::SetLeaderboardDisplay {
                        user,
                        field,
                        value: value.to_string(),
                    },
                    Delta::SetLeaderboardDisplay {
                        user,
                        field,
                        value: prior,
                    },
                );
            }
        }
        transform
    }

    fn task_flag(&self, user: UserId, task: DailyTaskId, completed: bool) -> PlannedTransform {
        let key = CacheKey::DailyTasks(user);
        let mut transform = PlannedTransform::new(key);
        let prior = self
            .store
            .view::<Vec<DailyTask>>(key)
            .and_then(|tasks| tasks.iter().find(|t| t.id == task).map(|t| t.completed));
        if let Some(prior) = prior {
            transform.push(
                Delta::SetTaskCompleted { task, completed },
                Delta::SetTaskCompleted {
                    task,
                    completed: prior,
                },
            );
        }
        transform
    }

    fn tasks_replace(&self, user: UserId, tasks: &[DailyTask]) -> PlannedTransform {
        let key = CacheKey::DailyTasks(user);
        let mut transform = PlannedTransform::new(key);
        if let Some(prior) = self.store.view::<Vec<DailyTask>>(key) {
            transform.push(
                Delta::ReplaceDailyTasks(tasks.to_vec()),
                Delta::ReplaceDailyTasks(prior),
            );
        }
        transform
    }

    fn unlocked_append(&self, user: UserId, record: &UserAchievement) -> PlannedTransform {
        let key = CacheKey::UnlockedAchievements(user);
        let mut transform = PlannedTransform::new(key);
        if self.store.contains(key) {
            transform.push(
                Delta::AppendUnlocked(record.clone()),
                Delta::RemoveUnlocked(record.achievement_id()),
            );
        }
        transform
    }

    fn unlocked_replace(&self, user: UserId, record: &UserAchievement) -> PlannedTransform {
        let key = CacheKey::UnlockedAchievements(user);
        let mut transform = PlannedTransform::new(key);
        let prior = self
            .store
            .view::<Vec<UserAchievement>>(key)
            .and_then(|records| {
                records
                    .into_iter()
                    .rfind(|r| r.achievement_id() == record.achievement_id())
            });
        if let Some(prior) = prior {
            transform.push(
                Delta::ReplaceUnlocked(record.clone()),
                Delta::ReplaceUnlocked(prior),
            );
        }
        transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheableView;
    use chrono::Utc;
    use fithero_core::{Achievement, AchievementKind, Difficulty, Task, TaskId};
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(60);

    fn user() -> UserId {
        UserId::from(1)
    }

    fn profile(points: u32) -> Profile {
        Profile {
            id: user(),
            username: "hero".into(),
            email: "hero@example.com".into(),
            points,
            character: "Rookie Hero".into(),
            job_title: "Fitness Novice".into(),
            achievements_count: 0,
        }
    }

    fn daily(id: u64, points: u32) -> DailyTask {
        DailyTask {
            id: DailyTaskId::from(id),
            task: Task {
                id: TaskId::from(id),
                title: format!("Task {}", id),
                description: String::new(),
                points,
                category: "cardio".into(),
                difficulty: Difficulty::Easy,
            },
            completed: false,
            date: None,
        }
    }

    fn row(id: u64, points: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            id: UserId::from(id),
            username: format!("user{}", id),
            points,
            character: "Rookie Hero".into(),
            job_title: "Fitness Novice".into(),
        }
    }

    fn ninja() -> UserAchievement {
        UserAchievement::pending(
            Achievement {
                id: AchievementId::from(3),
                title: "Ninja".into(),
                description: String::new(),
                icon: String::new(),
                cost: 150,
                kind: AchievementKind::Character,
            },
            Utc::now(),
        )
    }

    fn seeded() -> (CacheStore, Propagator) {
        let store = CacheStore::new();
        store.store_fetched(CacheKey::Profile(user()), profile(300).wrap(), TTL);
        store.store_fetched(
            CacheKey::DailyTasks(user()),
            vec![daily(1, 50), daily(2, 20)].wrap(),
            TTL,
        );
        store.store_fetched(
            CacheKey::Leaderboard,
            vec![row(9, 340), row(8, 320), row(1, 300), row(7, 100)].wrap(),
            TTL,
        );
        store.store_fetched(
            CacheKey::UnlockedAchievements(user()),
            Vec::<UserAchievement>::new().wrap(),
            TTL,
        );
        (store.clone(), Propagator::new(store))
    }

    #[test]
    fn test_task_completed_touches_tasks_profile_and_leaderboard() {
        let (store, propagator) = seeded();
        let plan = propagator.plan(&DomainEvent::TaskCompleted {
            user: user(),
            task: DailyTaskId::from(1),
            points: 50,
        });
        assert_eq!(
            plan.keys(),
            vec![
                CacheKey::DailyTasks(user()),
                CacheKey::Profile(user()),
                CacheKey::Leaderboard
            ]
        );

        plan.apply(&store);
        let profile: Profile = store.view(CacheKey::Profile(user())).unwrap();
        assert_eq!(profile.points, 350);
        let tasks: Vec<DailyTask> = store.view(CacheKey::DailyTasks(user())).unwrap();
        assert!(tasks[0].completed);
        let board: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
        assert_eq!(board[0].id, user());
        assert!(is_sorted_descending(&board));
    }

    #[test]
    fn test_revert_restores_exact_state() {
        let (store, propagator) = seeded();
        let before: Vec<_> = store
            .keys()
            .into_iter()
            .map(|key| store.read(key).map(|e| e.data().clone()))
            .collect();

        let plan = propagator.plan(&DomainEvent::AchievementUnlocked {
            user: user(),
            record: ninja(),
        });
        plan.apply(&store);
        let profile: Profile = store.view(CacheKey::Profile(user())).unwrap();
        assert_eq!(profile.points, 150);
        assert_eq!(profile.character, "Ninja");
        assert_eq!(profile.achievements_count, 1);

        plan.revert(&store);
        let after: Vec<_> = store
            .keys()
            .into_iter()
            .map(|key| store.read(key).map(|e| e.data().clone()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_revert_over_refetched_board_keeps_order() {
        let store = CacheStore::new();
        store.store_fetched(
            CacheKey::Leaderboard,
            vec![row(1, 300), row(9, 200)].wrap(),
            TTL,
        );
        let plan = Propagator::new(store.clone()).plan(&DomainEvent::PointsCorrected {
            user: user(),
            amount: 50,
        });
        plan.apply(&store);

        // A rival overtook the user on the server meanwhile.
        store.store_fetched(
            CacheKey::Leaderboard,
            vec![row(9, 320), row(1, 300)].wrap(),
            TTL,
        );
        plan.revert(&store);

        let board: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
        assert!(is_sorted_descending(&board));
        assert_eq!(board[0].id, UserId::from(9));
        assert_eq!(board[1].id, user());
        assert_eq!(board[1].points, 250);
    }

    #[test]
    fn test_revert_restores_tied_position() {
        let store = CacheStore::new();
        let board = vec![row(9, 300), row(1, 300), row(7, 300)];
        store.store_fetched(CacheKey::Leaderboard, board.clone().wrap(), TTL);
        let plan = Propagator::new(store.clone()).plan(&DomainEvent::PointsCorrected {
            user: user(),
            amount: 25,
        });

        plan.apply(&store);
        plan.revert(&store);
        let after: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
        assert_eq!(after, board);
    }

    #[test]
    fn test_leaderboard_untouched_when_user_absent() {
        let store = CacheStore::new();
        store.store_fetched(CacheKey::Leaderboard, vec![row(9, 340)].wrap(), TTL);
        let propagator = Propagator::new(store);

        let plan = propagator.plan(&DomainEvent::PointsCorrected {
            user: user(),
            amount: 10,
        });
        assert!(plan.is_empty());
    }

    #[test]
    fn test_uncached_keys_are_not_planned() {
        let propagator = Propagator::new(CacheStore::new());
        let plan = propagator.plan(&DomainEvent::TaskCompleted {
            user: user(),
            task: DailyTaskId::from(1),
            points: 50,
        });
        assert!(plan.is_empty());
    }

    #[test]
    fn test_points_never_go_negative() {
        let store = CacheStore::new();
        store.store_fetched(CacheKey::Profile(user()), profile(30).wrap(), TTL);
        let propagator = Propagator::new(store.clone());

        let plan = propagator.plan(&DomainEvent::PointsCorrected {
            user: user(),
            amount: -100,
        });
        plan.apply(&store);
        assert_eq!(store.view::<Profile>(CacheKey::Profile(user())).unwrap().points, 0);
        plan.revert(&store);
        assert_eq!(store.view::<Profile>(CacheKey::Profile(user())).unwrap().points, 30);
    }

    #[test]
    fn test_unlock_confirmed_replaces_pending_record() {
        let (store, propagator) = seeded();
        propagator
            .plan(&DomainEvent::AchievementUnlocked {
                user: user(),
                record: ninja(),
            })
            .apply(&store);

        let mut confirmed = ninja();
        confirmed.id = Some(fithero_core::UserAchievementId::from(44));
        propagator
            .plan(&DomainEvent::UnlockConfirmed {
                user: user(),
                record: confirmed,
            })
            .apply(&store);

        let records: Vec<UserAchievement> =
            store.view(CacheKey::UnlockedAchievements(user())).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_confirmed());
    }

    #[test]
    fn test_badge_does_not_touch_display_fields() {
        let (store, propagator) = seeded();
        let mut badge = ninja();
        badge.achievement.kind = AchievementKind::Badge;
        propagator
            .plan(&DomainEvent::AchievementUnlocked {
                user: user(),
                record: badge,
            })
            .apply(&store);

        let profile: Profile = store.view(CacheKey::Profile(user())).unwrap();
        assert_eq!(profile.character, "Rookie Hero");
        assert_eq!(profile.points, 150);
    }
}
