//! FitHero Test Utilities
//!
//! Shared test infrastructure for the FitHero workspace:
//! - An in-memory backend that behaves like the real server
//! - Fixtures for common scenarios
//! - Proptest generators for entity types
//! - Assertions for mutation outcomes

pub use fithero_core::{
    level_for_points, Achievement, AchievementId, AchievementKind, AchievementUnlock, ApiError,
    ApiResult, DailyTask, DailyTaskId, Difficulty, EntityIdType, GamificationApi,
    LeaderboardEntry, Profile, Task, TaskCompletion, TaskId, Timestamp, UserAchievement,
    UserAchievementId, UserId,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

// ============================================================================
// MOCK BACKEND
// ============================================================================

/// Backend endpoints, for counting calls and scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Profile,
    DailyTasks,
    CompleteTask,
    GenerateTasks,
    Achievements,
    UnlockedAchievements,
    UnlockAchievement,
    Leaderboard,
}

/// In-memory stand-in for the FitHero backend.
///
/// Mutating endpoints update the server-side state the way the real server
/// does, so a refetch after a mutation returns the new truth. Every endpoint
/// can be paused (calls wait until released) or scripted to fail.
pub struct MockApi {
    state: Mutex<ServerState>,
    calls: Mutex<HashMap<Endpoint, usize>>,
    failures: Mutex<HashMap<Endpoint, VecDeque<ApiError>>>,
    gates: Mutex<HashMap<Endpoint, watch::Sender<bool>>>,
}

#[derive(Debug, Clone)]
struct ServerState {
    profile: Profile,
    tasks: Vec<DailyTask>,
    generated: Vec<DailyTask>,
    catalog: Vec<Achievement>,
    unlocked: Vec<UserAchievement>,
    others: Vec<LeaderboardEntry>,
    points_earned_override: Option<u32>,
    next_record_id: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockApi {
    pub fn new(profile: Profile) -> Self {
        Self {
            state: Mutex::new(ServerState {
                profile,
                tasks: Vec::new(),
                generated: Vec::new(),
                catalog: Vec::new(),
                unlocked: Vec::new(),
                others: Vec::new(),
                points_earned_override: None,
                next_record_id: 1,
            }),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Server with the standard fixtures and `points` on the profile.
    pub fn seeded(points: u32) -> Self {
        Self::new(fixtures::hero_profile(points))
            .with_tasks(fixtures::daily_tasks())
            .with_generated_tasks(fixtures::generated_tasks())
            .with_catalog(fixtures::catalog())
            .with_other_users(fixtures::rivals())
    }

    pub fn with_tasks(self, tasks: Vec<DailyTask>) -> Self {
        lock(&self.state).tasks = tasks;
        self
    }

    /// Tasks returned by the next `generate_daily_tasks`.
    pub fn with_generated_tasks(self, tasks: Vec<DailyTask>) -> Self {
        lock(&self.state).generated = tasks;
        self
    }

    pub fn with_catalog(self, catalog: Vec<Achievement>) -> Self {
        lock(&self.state).catalog = catalog;
        self
    }

    pub fn with_unlocked(self, unlocked: Vec<UserAchievement>) -> Self {
        lock(&self.state).unlocked = unlocked;
        self
    }

    /// Leaderboard rows for users other than the profile's owner.
    pub fn with_other_users(self, rows: Vec<LeaderboardEntry>) -> Self {
        lock(&self.state).others = rows;
        self
    }

    /// Award this many points for every completed task, whatever the task
    /// says.
    pub fn set_points_earned(&self, points: Option<u32>) {
        lock(&self.state).points_earned_override = points;
    }

    /// Change the server-side points without going through an endpoint,
    /// as another device would.
    pub fn set_points(&self, points: u32) {
        lock(&self.state).profile.points = points;
    }

    pub fn server_profile(&self) -> Profile {
        lock(&self.state).profile.clone()
    }

    pub fn server_tasks(&self) -> Vec<DailyTask> {
        lock(&self.state).tasks.clone()
    }

    pub fn server_unlocked(&self) -> Vec<UserAchievement> {
        lock(&self.state).unlocked.clone()
    }

    /// Number of calls made to `endpoint`.
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        lock(&self.calls).get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Make the next call to `endpoint` fail with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        lock(&self.failures)
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Hold calls to `endpoint` until [`MockApi::release`].
    pub fn pause(&self, endpoint: Endpoint) {
        lock(&self.gates)
            .entry(endpoint)
            .or_insert_with(|| watch::Sender::new(false))
            .send_replace(true);
    }

    pub fn release(&self, endpoint: Endpoint) {
        if let Some(gate) = lock(&self.gates).get(&endpoint) {
            gate.send_replace(false);
        }
    }

    async fn enter(&self, endpoint: Endpoint) -> ApiResult<()> {
        *lock(&self.calls).entry(endpoint).or_insert(0) += 1;

        let gate = lock(&self.gates).get(&endpoint).map(|gate| gate.subscribe());
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|paused| !*paused).await;
        }

        match lock(&self.failures)
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ServerState {
    fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let me = LeaderboardEntry {
            id: self.profile.id,
            username: self.profile.username.clone(),
            points: self.profile.points,
            character: self.profile.character.clone(),
            job_title: self.profile.job_title.clone(),
        };
        let mut rows: Vec<LeaderboardEntry> = self.others.clone();
        rows.push(me);
        rows.sort_by(|a, b| b.points.cmp(&a.points));
        rows.truncate(limit);
        rows
    }
}

#[async_trait]
impl GamificationApi for MockApi {
    async fn profile(&self) -> ApiResult<Profile> {
        self.enter(Endpoint::Profile).await?;
        Ok(lock(&self.state).profile.clone())
    }

    async fn daily_tasks(&self) -> ApiResult<Vec<DailyTask>> {
        self.enter(Endpoint::DailyTasks).await?;
        Ok(lock(&self.state).tasks.clone())
    }

    async fn complete_task(&self, task_id: DailyTaskId) -> ApiResult<TaskCompletion> {
        self.enter(Endpoint::CompleteTask).await?;
        let mut state = lock(&self.state);
        let override_points = state.points_earned_override;
        let task = state
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| ApiError::from_status(404, Some("Task not found".into())))?;
        if task.completed {
            return Err(ApiError::from_status(
                409,
                Some("Task already completed".into()),
            ));
        }
        task.completed = true;
        let points_earned = override_points.unwrap_or(task.task.points);

        let old_level = state.profile.level();
        state.profile.points += points_earned;
        let new_level = state.profile.level();
        Ok(TaskCompletion {
            points_earned,
            level_up: new_level > old_level,
            new_level: (new_level > old_level).then_some(new_level),
            achievement_unlocked: false,
            message: Some("Task completed successfully".into()),
        })
    }

    async fn generate_daily_tasks(&self) -> ApiResult<Vec<DailyTask>> {
        self.enter(Endpoint::GenerateTasks).await?;
        let mut state = lock(&self.state);
        state.tasks = state.generated.clone();
        Ok(state.tasks.clone())
    }

    async fn achievements(&self) -> ApiResult<Vec<Achievement>> {
        self.enter(Endpoint::Achievements).await?;
        Ok(lock(&self.state).catalog.clone())
    }

    async fn unlocked_achievements(&self) -> ApiResult<Vec<UserAchievement>> {
        self.enter(Endpoint::UnlockedAchievements).await?;
        Ok(lock(&self.state).unlocked.clone())
    }

    async fn unlock_achievement(&self, achievement_id: AchievementId) -> ApiResult<AchievementUnlock> {
        self.enter(Endpoint::UnlockAchievement).await?;
        let mut state = lock(&self.state);
        let achievement = state
            .catalog
            .iter()
            .find(|a| a.id == achievement_id)
            .cloned()
            .ok_or_else(|| ApiError::from_status(404, Some("Achievement not found".into())))?;
        if state.unlocked.iter().any(|r| r.achievement_id() == achievement_id) {
            return Err(ApiError::from_status(
                409,
                Some("Achievement already unlocked".into()),
            ));
        }
        if state.profile.points < achievement.cost {
            return Err(ApiError::from_status(
                400,
                Some("Insufficient points".into()),
            ));
        }

        state.profile.points -= achievement.cost;
        state.profile.achievements_count += 1;
        if let Some(field) = achievement.kind.display_field() {
            state.profile.set_display_field(field, achievement.title.clone());
        }
        let record = UserAchievement {
            id: Some(UserAchievementId::from(state.next_record_id)),
            achievement,
            unlocked_at: Utc::now(),
        };
        state.next_record_id += 1;
        state.unlocked.push(record.clone());
        Ok(AchievementUnlock {
            user_achievement: record,
        })
    }

    async fn leaderboard(&self, limit: usize) -> ApiResult<Vec<LeaderboardEntry>> {
        self.enter(Endpoint::Leaderboard).await?;
        Ok(lock(&self.state).leaderboard(limit))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities for common scenarios.

    use super::*;

    pub const HERO_ID: u64 = 1;

    pub fn hero_id() -> UserId {
        UserId::from(HERO_ID)
    }

    pub fn hero_profile(points: u32) -> Profile {
        Profile {
            id: hero_id(),
            username: "hero".to_string(),
            email: "hero@fithero.dev".to_string(),
            points,
            character: "Rookie Hero".to_string(),
            job_title: "Fitness Novice".to_string(),
            achievements_count: 0,
        }
    }

    pub fn daily_task(id: u64, title: &str, points: u32) -> DailyTask {
        DailyTask {
            id: DailyTaskId::from(id),
            task: Task {
                id: TaskId::from(id),
                title: title.to_string(),
                description: format!("{} today", title),
                points,
                category: "cardio".to_string(),
                difficulty: Difficulty::Medium,
            },
            completed: false,
            date: Some(Utc::now()),
        }
    }

    /// Three open tasks worth 50, 30 and 20 points (ids 1, 2, 3).
    pub fn daily_tasks() -> Vec<DailyTask> {
        vec![
            daily_task(1, "Run 5km", 50),
            daily_task(2, "50 push-ups", 30),
            daily_task(3, "Stretch for 10 minutes", 20),
        ]
    }

    /// Tasks handed out by task generation (ids 11, 12).
    pub fn generated_tasks() -> Vec<DailyTask> {
        vec![
            daily_task(11, "Cycle 10km", 60),
            daily_task(12, "Plank for 2 minutes", 25),
        ]
    }

    pub fn achievement(id: u64, title: &str, cost: u32, kind: AchievementKind) -> Achievement {
        Achievement {
            id: AchievementId::from(id),
            title: title.to_string(),
            description: format!("Unlock {}", title),
            icon: String::new(),
            cost,
            kind,
        }
    }

    /// Ninja (character, 150), Gym Leader (upgrade, 400), Early Bird
    /// (badge, 50), Legend (character, 5000); ids 1 to 4.
    pub fn catalog() -> Vec<Achievement> {
        vec![
            achievement(1, "Ninja", 150, AchievementKind::Character),
            achievement(2, "Gym Leader", 400, AchievementKind::Upgrade),
            achievement(3, "Early Bird", 50, AchievementKind::Badge),
            achievement(4, "Legend", 5000, AchievementKind::Character),
        ]
    }

    pub fn leaderboard_row(id: u64, points: u32) -> LeaderboardEntry {
        LeaderboardEntry {
            id: UserId::from(id),
            username: format!("athlete{}", id),
            points,
            character: "Rookie Hero".to_string(),
            job_title: "Fitness Novice".to_string(),
        }
    }

    /// Other users at 1200, 340, 320 and 100 points.
    pub fn rivals() -> Vec<LeaderboardEntry> {
        vec![
            leaderboard_row(2, 1200),
            leaderboard_row(3, 340),
            leaderboard_row(4, 320),
            leaderboard_row(5, 100),
        ]
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for FitHero entity types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_points() -> impl Strategy<Value = u32> {
        prop_oneof![0u32..3000, Just(0u32), Just(250), Just(500), Just(1000), Just(2000)]
    }

    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,10}( [A-Z][a-z]{2,8})?".prop_map(|s| s.to_string())
    }

    pub fn arb_achievement_kind() -> impl Strategy<Value = AchievementKind> {
        prop_oneof![
            Just(AchievementKind::Character),
            Just(AchievementKind::Upgrade),
            Just(AchievementKind::Badge),
        ]
    }

    pub fn arb_profile() -> impl Strategy<Value = Profile> {
        (arb_points(), arb_title(), arb_title(), 0u32..20).prop_map(
            |(points, character, job_title, achievements_count)| Profile {
                achievements_count,
                character,
                job_title,
                ..fixtures::hero_profile(points)
            },
        )
    }

    pub fn arb_achievement(id: u64) -> impl Strategy<Value = Achievement> {
        (arb_title(), 0u32..3000, arb_achievement_kind())
            .prop_map(move |(title, cost, kind)| fixtures::achievement(id, &title, cost, kind))
    }

    /// 1 to 8 tasks with ids 1..=n and random completion flags.
    pub fn arb_daily_tasks() -> impl Strategy<Value = Vec<DailyTask>> {
        prop::collection::vec((1u32..200, any::<bool>()), 1..8).prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (points, completed))| {
                    let mut task = fixtures::daily_task(i as u64 + 1, "Workout", points);
                    task.completed = completed;
                    task
                })
                .collect()
        })
    }

    /// Leaderboard sorted descending by points, with other users only.
    /// Ids start at 2 so the hero is never among them.
    pub fn arb_leaderboard() -> impl Strategy<Value = Vec<LeaderboardEntry>> {
        prop::collection::vec(0u32..3000, 0..12).prop_map(|mut points| {
            points.sort_unstable_by(|a, b| b.cmp(a));
            points
                .into_iter()
                .enumerate()
                .map(|(i, points)| fixtures::leaderboard_row(i as u64 + 2, points))
                .collect()
        })
    }

    /// Sorted leaderboard that includes `hero` with the hero's points.
    pub fn arb_leaderboard_with(hero: Profile) -> impl Strategy<Value = Vec<LeaderboardEntry>> {
        arb_leaderboard().prop_map(move |mut rows| {
            rows.push(LeaderboardEntry {
                id: hero.id,
                username: hero.username.clone(),
                points: hero.points,
                character: hero.character.clone(),
                job_title: hero.job_title.clone(),
            });
            rows.sort_by(|a, b| b.points.cmp(&a.points));
            rows
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for FitHero entities.

    use super::*;

    /// Assert that rows are sorted highest points first.
    #[track_caller]
    pub fn assert_sorted_descending(rows: &[LeaderboardEntry]) {
        for pair in rows.windows(2) {
            assert!(
                pair[0].points >= pair[1].points,
                "Leaderboard out of order: {} ({}) before {} ({})",
                pair[0].username,
                pair[0].points,
                pair[1].username,
                pair[1].points
            );
        }
    }

    /// Assert that an API result failed with `status`.
    #[track_caller]
    pub fn assert_status<T: std::fmt::Debug>(result: &ApiResult<T>, status: u16) {
        match result {
            Err(err) => assert_eq!(err.status(), Some(status), "Wrong status in {:?}", err),
            other => panic!("Expected error with status {}, got: {:?}", status, other),
        }
    }
}
