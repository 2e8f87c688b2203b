//! Property-Based Tests for Cross-View Propagation
//!
//! **Property: Rollback Exactness**
//!
//! For any cached state and any domain event, applying the planned forward
//! deltas and then the planned inverse deltas leaves every cached key equal
//! to what it was, field by field, including overwritten display strings.
//!
//! **Property: Leaderboard Order**
//!
//! After any points delta affecting a user present in the cached
//! leaderboard, the cached list stays sorted descending by points.
//!
//! **Property: Server Data Never Lands Under a Pending Mutation**
//!
//! Invalidations and fetch results arriving between the forward write and
//! the rollback do not disturb rollback exactness: fetches overlapping a
//! lease are discarded, and a board refetched outside a lease stays sorted
//! after the inverse deltas run on top of it.
//!
//! **Property: Single In-Flight Mutation**
//!
//! Triggering "complete task" any number of times before the first one
//! settles applies its points exactly once and calls the server once.

use chrono::Utc;
use fithero_core::{Achievement, DailyTask, DailyTaskId, LeaderboardEntry, Profile, UserAchievement};
use fithero_sync::{
    is_sorted_descending, CacheKey, CacheStore, CacheValue, CacheableView, DomainEvent, KeyLeases,
    MutationError, Propagator, Session, SyncConfig,
};
use fithero_test_utils::generators::{
    arb_achievement, arb_daily_tasks, arb_leaderboard, arb_leaderboard_with, arb_points,
    arb_profile,
};
use fithero_test_utils::{fixtures, Endpoint, MockApi};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

fn seed(
    profile: &Profile,
    tasks: Vec<DailyTask>,
    board: Vec<LeaderboardEntry>,
    unlocked: Vec<UserAchievement>,
) -> CacheStore {
    let store = CacheStore::new();
    store.store_fetched(CacheKey::Profile(profile.id), profile.clone().wrap(), TTL);
    store.store_fetched(CacheKey::DailyTasks(profile.id), tasks.wrap(), TTL);
    store.store_fetched(CacheKey::Leaderboard, board.wrap(), TTL);
    store.store_fetched(CacheKey::UnlockedAchievements(profile.id), unlocked.wrap(), TTL);
    store
}

fn snapshot(store: &CacheStore) -> Vec<(CacheKey, CacheValue)> {
    store
        .keys()
        .into_iter()
        .filter_map(|key| store.read(key).map(|entry| (key, entry.data().clone())))
        .collect()
}

fn board_row(profile: &Profile, points: u32) -> LeaderboardEntry {
    LeaderboardEntry {
        id: profile.id,
        username: profile.username.clone(),
        points,
        character: profile.character.clone(),
        job_title: profile.job_title.clone(),
    }
}

fn unlock_scenario() -> impl Strategy<Value = (Profile, Vec<LeaderboardEntry>, Achievement)> {
    arb_profile().prop_flat_map(|profile| {
        (
            Just(profile.clone()),
            arb_leaderboard_with(profile),
            arb_achievement(1),
        )
    })
}

fn task_scenario() -> impl Strategy<Value = (Profile, Vec<DailyTask>, Vec<LeaderboardEntry>, usize)> {
    (arb_profile(), arb_daily_tasks()).prop_flat_map(|(profile, tasks)| {
        let len = tasks.len();
        (
            Just(profile.clone()),
            Just(tasks),
            arb_leaderboard_with(profile),
            0..len,
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property: Rollback Exactness** for task completion.
    #[test]
    fn prop_task_completion_rollback_is_exact(
        (profile, tasks, board, index) in task_scenario(),
    ) {
        let task = tasks[index].clone();
        let store = seed(&profile, tasks, board, Vec::new());
        let before = snapshot(&store);

        let plan = Propagator::new(store.clone()).plan(&DomainEvent::TaskCompleted {
            user: profile.id,
            task: task.id,
            points: task.points(),
        });
        plan.apply(&store);
        plan.revert(&store);

        prop_assert_eq!(snapshot(&store), before);
    }

    /// **Property: Rollback Exactness** for unlocks, including the display
    /// field the unlock overwrote.
    #[test]
    fn prop_unlock_rollback_is_exact(
        (profile, board, achievement) in unlock_scenario(),
    ) {
        let store = seed(&profile, Vec::new(), board, Vec::new());
        let before = snapshot(&store);

        let plan = Propagator::new(store.clone()).plan(&DomainEvent::AchievementUnlocked {
            user: profile.id,
            record: UserAchievement::pending(achievement.clone(), Utc::now()),
        });
        plan.apply(&store);

        if let Some(field) = achievement.kind.display_field() {
            let changed: Profile = store.view(CacheKey::Profile(profile.id)).unwrap();
            prop_assert_eq!(changed.display_field(field), achievement.title.as_str());
        }

        plan.revert(&store);
        prop_assert_eq!(snapshot(&store), before);
    }

    /// **Property: Leaderboard Order**
    #[test]
    fn prop_leaderboard_stays_sorted(
        profile in arb_profile(),
        others in arb_leaderboard(),
        amounts in prop::collection::vec(-3000i64..3000, 1..6),
    ) {
        let mut board = others;
        board.push(LeaderboardEntry {
            id: profile.id,
            username: profile.username.clone(),
            points: profile.points,
            character: profile.character.clone(),
            job_title: profile.job_title.clone(),
        });
        fithero_sync::propagator::sort_leaderboard(&mut board);
        let store = seed(&profile, Vec::new(), board, Vec::new());
        let propagator = Propagator::new(store.clone());

        for amount in amounts {
            propagator
                .plan(&DomainEvent::PointsCorrected { user: profile.id, amount })
                .apply(&store);
            let rows: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
            prop_assert!(is_sorted_descending(&rows));

            let me = rows.iter().find(|row| row.id == profile.id).unwrap();
            let cached: Profile = store.view(CacheKey::Profile(profile.id)).unwrap();
            prop_assert_eq!(me.points, cached.points);
        }
    }

    /// **Property: Leaderboard Order** when the user is not on the board:
    /// the cached board is not touched at all.
    #[test]
    fn prop_absent_user_leaves_leaderboard_untouched(
        profile in arb_profile(),
        others in arb_leaderboard(),
        amount in -3000i64..3000,
    ) {
        let store = seed(&profile, Vec::new(), others, Vec::new());
        let version = store.read(CacheKey::Leaderboard).unwrap().version();

        Propagator::new(store.clone())
            .plan(&DomainEvent::PointsCorrected { user: profile.id, amount })
            .apply(&store);

        prop_assert_eq!(store.read(CacheKey::Leaderboard).unwrap().version(), version);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property: Server Data Never Lands Under a Pending Mutation** for
    /// invalidations, which only touch freshness.
    #[test]
    fn prop_invalidation_before_revert_keeps_exactness(
        (profile, tasks, board, index) in task_scenario(),
        invalidated in prop::collection::vec(any::<bool>(), 4),
    ) {
        let task = tasks[index].clone();
        let store = seed(&profile, tasks, board, Vec::new());
        let before = snapshot(&store);

        let plan = Propagator::new(store.clone()).plan(&DomainEvent::TaskCompleted {
            user: profile.id,
            task: task.id,
            points: task.points(),
        });
        plan.apply(&store);
        for (key, invalidate) in store.keys().into_iter().zip(invalidated) {
            if invalidate {
                store.invalidate(key);
            }
        }
        plan.revert(&store);

        prop_assert_eq!(snapshot(&store), before);
    }

    /// **Property: Server Data Never Lands Under a Pending Mutation** for
    /// fetches issued before or during the lease.
    #[test]
    fn prop_fetch_overlapping_lease_is_discarded(
        (profile, tasks, board, index) in task_scenario(),
        server_points in arb_points(),
        server_board in arb_leaderboard(),
        issued_before_lease in any::<bool>(),
    ) {
        let task = tasks[index].clone();
        let store = seed(&profile, tasks, board, Vec::new());
        let before = snapshot(&store);
        let leases = KeyLeases::new(store.clone());
        let profile_key = CacheKey::Profile(profile.id);
        let early = [
            store.begin_fetch(profile_key),
            store.begin_fetch(CacheKey::Leaderboard),
        ];

        let lease = leases
            .acquire(&[profile_key, CacheKey::DailyTasks(profile.id), CacheKey::Leaderboard])
            .unwrap();
        let plan = Propagator::new(store.clone()).plan(&DomainEvent::TaskCompleted {
            user: profile.id,
            task: task.id,
            points: task.points(),
        });
        plan.apply(&store);

        let tickets = if issued_before_lease {
            early
        } else {
            [
                store.begin_fetch(profile_key),
                store.begin_fetch(CacheKey::Leaderboard),
            ]
        };
        let mut refetched = profile.clone();
        refetched.points = server_points;
        prop_assert!(!store.store_fetched_if_current(tickets[0], refetched.wrap(), TTL));
        prop_assert!(!store.store_fetched_if_current(tickets[1], server_board.wrap(), TTL));

        plan.revert(&store);
        drop(lease);

        prop_assert_eq!(snapshot(&store), before);
        let rows: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
        prop_assert!(is_sorted_descending(&rows));
        prop_assert!(store.is_stale(profile_key));
        prop_assert!(leases.held().is_empty());
    }

    /// **Property: Leaderboard Order** when the board is replaced between
    /// the forward write and the rollback.
    #[test]
    fn prop_revert_over_refetched_board_stays_sorted(
        profile in arb_profile(),
        others in arb_leaderboard(),
        amount in -3000i64..3000,
        server_others in arb_leaderboard(),
        server_points in arb_points(),
    ) {
        let mut board = others;
        board.push(board_row(&profile, profile.points));
        fithero_sync::propagator::sort_leaderboard(&mut board);
        let store = seed(&profile, Vec::new(), board, Vec::new());

        let plan = Propagator::new(store.clone())
            .plan(&DomainEvent::PointsCorrected { user: profile.id, amount });
        plan.apply(&store);

        let mut server_board = server_others;
        server_board.push(board_row(&profile, server_points));
        fithero_sync::propagator::sort_leaderboard(&mut server_board);
        let len = server_board.len();
        store.store_fetched(CacheKey::Leaderboard, server_board.wrap(), TTL);
        plan.revert(&store);

        let rows: Vec<LeaderboardEntry> = store.view(CacheKey::Leaderboard).unwrap();
        prop_assert!(is_sorted_descending(&rows));
        prop_assert_eq!(rows.len(), len);
        prop_assert_eq!(rows.iter().filter(|row| row.id == profile.id).count(), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(25))]

    /// **Property: Single In-Flight Mutation**
    #[test]
    fn prop_repeated_completion_applies_once(attempts in 1usize..6) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let api = Arc::new(MockApi::seeded(300));
            let session = Session::connect(api.clone(), SyncConfig::default()).await.unwrap();
            session.daily_tasks().await;

            let task = DailyTaskId::from(1);
            let mut handles = Vec::new();
            for i in 0..attempts {
                match session.complete_task(task) {
                    Ok(handle) => {
                        assert_eq!(i, 0, "only the first attempt may start");
                        handles.push(handle);
                    }
                    Err(err) => assert!(matches!(err, MutationError::Busy(_))),
                }
            }

            let profile: Profile = session.store().view(CacheKey::Profile(fixtures::hero_id())).unwrap();
            assert_eq!(profile.points, 350);

            for handle in handles {
                handle.settled().await.unwrap();
            }
            let profile: Profile = session.store().view(CacheKey::Profile(fixtures::hero_id())).unwrap();
            assert_eq!(profile.points, 350);
            assert_eq!(api.calls(Endpoint::CompleteTask), 1);
        });
    }
}
