//! End-to-end scenarios for optimistic mutations against the mock backend.

use fithero_core::{
    AchievementId, ApiError, DailyTask, DailyTaskId, LeaderboardEntry, Profile, UserAchievement,
};
use fithero_sync::{CacheKey, MutationError, Session, Severity, SyncConfig};
use fithero_test_utils::assertions::assert_sorted_descending;
use fithero_test_utils::{fixtures, Endpoint, MockApi};
use std::sync::Arc;
use std::time::Duration;

async fn loaded_session(api: &Arc<MockApi>) -> Session {
    let session = Session::connect(api.clone(), SyncConfig::default())
        .await
        .unwrap();
    session.daily_tasks().await;
    session.achievements().await;
    session.unlocked_achievements().await;
    session.leaderboard().await;
    session
}

fn cached_profile(session: &Session) -> Profile {
    session
        .store()
        .view(CacheKey::Profile(session.user()))
        .unwrap()
}

fn cached_tasks(session: &Session) -> Vec<DailyTask> {
    session
        .store()
        .view(CacheKey::DailyTasks(session.user()))
        .unwrap()
}

fn cached_board(session: &Session) -> Vec<LeaderboardEntry> {
    session.store().view(CacheKey::Leaderboard).unwrap()
}

async fn yield_many() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

// ----------------------------------------------------------------------------
// Complete task
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_happy_path_completion_is_visible_before_server_answers() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;

    let handle = session.complete_task(DailyTaskId::from(1)).unwrap();

    // Nothing has reached the server yet, the cache already shows the result.
    assert_eq!(api.calls(Endpoint::CompleteTask), 0);
    let profile = cached_profile(&session);
    assert_eq!(profile.points, 350);
    assert_eq!(profile.level(), 2);
    assert!(cached_tasks(&session)[0].completed);

    let completion = handle.settled().await.unwrap();
    assert_eq!(completion.points_earned, 50);
    assert_eq!(cached_profile(&session).points, 350);

    let notification = session.notifications().current().unwrap();
    assert_eq!(notification.severity, Severity::Success);
    assert!(notification.message.contains("50"));
}

#[tokio::test]
async fn test_completion_moves_user_up_the_leaderboard() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    let before = cached_board(&session);
    assert_eq!(before[3].id, fixtures::hero_id());

    session.complete_task(DailyTaskId::from(1)).unwrap();

    let after = cached_board(&session);
    assert_sorted_descending(&after);
    assert_eq!(after[1].id, fixtures::hero_id());
    assert_eq!(after[1].points, 350);
}

#[tokio::test]
async fn test_server_rejection_rolls_back_completion() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    api.fail_next(
        Endpoint::CompleteTask,
        ApiError::from_status(500, Some("Database unavailable".into())),
    );
    let board_before = cached_board(&session);

    let handle = session.complete_task(DailyTaskId::from(1)).unwrap();
    assert_eq!(cached_profile(&session).points, 350);
    assert!(cached_tasks(&session)[0].completed);

    let err = handle.settled().await.unwrap_err();
    assert!(matches!(err, MutationError::Api(_)));
    assert_eq!(cached_profile(&session).points, 300);
    assert!(!cached_tasks(&session)[0].completed);
    assert_eq!(cached_board(&session), board_before);

    let notification = session.notifications().current().unwrap();
    assert_eq!(notification.severity, Severity::Error);
    assert_eq!(notification.message, "Database unavailable");
}

#[tokio::test]
async fn test_failure_without_message_uses_fallback() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    api.fail_next(Endpoint::CompleteTask, ApiError::Timeout);

    let handle = session.complete_task(DailyTaskId::from(2)).unwrap();
    assert!(handle.settled().await.is_err());
    assert_eq!(
        session.notifications().current().unwrap().message,
        "Failed to complete task"
    );
}

#[tokio::test]
async fn test_refetch_during_pending_completion_does_not_corrupt_rollback() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    let user = session.user();
    api.pause(Endpoint::CompleteTask);
    api.fail_next(Endpoint::CompleteTask, ApiError::Timeout);

    let handle = session.complete_task(DailyTaskId::from(1)).unwrap();
    yield_many().await;
    assert_eq!(cached_profile(&session).points, 350);

    // The server still reports 300 while the completion is in flight.
    session.store().invalidate(CacheKey::Profile(user));
    session.store().invalidate(CacheKey::Leaderboard);
    let profile = session.profile().await;
    let board = session.leaderboard().await;
    assert_eq!(api.calls(Endpoint::Profile), 2);
    assert_eq!(profile.data.unwrap().points, 350);
    assert!(profile.error.is_none());
    assert_eq!(board.data.unwrap()[1].points, 350);

    api.release(Endpoint::CompleteTask);
    assert!(handle.settled().await.is_err());

    assert_eq!(cached_profile(&session).points, 300);
    assert_eq!(cached_profile(&session).points, api.server_profile().points);
    let board = cached_board(&session);
    assert_sorted_descending(&board);
    let hero = board.iter().find(|row| row.id == user).unwrap();
    assert_eq!(hero.points, 300);
    assert!(!cached_tasks(&session)[0].completed);
    assert!(session.store().is_stale(CacheKey::Profile(user)));
}

#[tokio::test]
async fn test_fetch_started_before_completion_lands_after_optimistic_write() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    let user = session.user();
    api.pause(Endpoint::Profile);
    api.pause(Endpoint::CompleteTask);
    api.fail_next(Endpoint::CompleteTask, ApiError::Timeout);
    session.store().invalidate(CacheKey::Profile(user));

    let (_, outcome) = tokio::join!(session.profile(), async {
        yield_many().await;
        let handle = session.complete_task(DailyTaskId::from(1)).unwrap();
        api.release(Endpoint::Profile);
        yield_many().await;
        assert_eq!(cached_profile(&session).points, 350);
        api.release(Endpoint::CompleteTask);
        handle.settled().await
    });

    assert!(outcome.is_err());
    assert_eq!(cached_profile(&session).points, 300);
}

#[tokio::test]
async fn test_server_points_supersede_the_guess() {
    let api = Arc::new(MockApi::seeded(300));
    api.set_points_earned(Some(70));
    let session = loaded_session(&api).await;

    let handle = session.complete_task(DailyTaskId::from(1)).unwrap();
    assert_eq!(cached_profile(&session).points, 350);

    handle.settled().await.unwrap();
    assert_eq!(cached_profile(&session).points, 370);
    assert!(session
        .notifications()
        .current()
        .unwrap()
        .message
        .contains("70"));
}

#[tokio::test]
async fn test_level_up_is_reported() {
    let api = Arc::new(MockApi::seeded(480));
    let session = loaded_session(&api).await;

    session
        .complete_task(DailyTaskId::from(1))
        .unwrap()
        .settled()
        .await
        .unwrap();

    assert_eq!(cached_profile(&session).level(), 3);
    let message = session.notifications().current().unwrap().message;
    assert!(message.contains("Level up! You're now level 3!"), "{}", message);
}

#[tokio::test]
async fn test_completing_a_completed_task_is_rejected_locally() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    session
        .complete_task(DailyTaskId::from(1))
        .unwrap()
        .settled()
        .await
        .unwrap();

    let err = session.complete_task(DailyTaskId::from(1)).unwrap_err();
    assert_eq!(err, MutationError::AlreadyCompleted(DailyTaskId::from(1)));
    assert_eq!(api.calls(Endpoint::CompleteTask), 1);
    assert_eq!(cached_profile(&session).points, 350);
    assert_eq!(
        session.notifications().current().unwrap().message,
        "Task already completed"
    );
}

#[tokio::test]
async fn test_overlapping_mutation_is_rejected_as_busy() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;

    let first = session.complete_task(DailyTaskId::from(1)).unwrap();
    let err = session.complete_task(DailyTaskId::from(2)).unwrap_err();
    assert!(matches!(err, MutationError::Busy(_)));
    assert_eq!(
        session.notifications().current().unwrap().severity,
        Severity::Info
    );
    assert_eq!(cached_profile(&session).points, 350);

    first.settled().await.unwrap();
    let second = session.complete_task(DailyTaskId::from(2)).unwrap();
    second.settled().await.unwrap();
    assert_eq!(cached_profile(&session).points, 380);
}

#[tokio::test]
async fn test_dropped_handle_still_settles() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    api.fail_next(Endpoint::CompleteTask, ApiError::Timeout);

    drop(session.complete_task(DailyTaskId::from(1)).unwrap());
    assert_eq!(cached_profile(&session).points, 350);

    yield_many().await;
    assert_eq!(cached_profile(&session).points, 300);
    assert!(!session.coordinator().is_pending(CacheKey::Profile(session.user())));
}

// ----------------------------------------------------------------------------
// Unlock achievement
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_insufficient_points_never_reaches_server() {
    let api = Arc::new(MockApi::seeded(100));
    let session = loaded_session(&api).await;
    let version = session
        .store()
        .read(CacheKey::Profile(session.user()))
        .unwrap()
        .version();

    let err = session.unlock_achievement(AchievementId::from(1)).unwrap_err();
    assert_eq!(
        err,
        MutationError::InsufficientPoints {
            required: 150,
            available: 100
        }
    );
    assert_eq!(api.calls(Endpoint::UnlockAchievement), 0);
    assert_eq!(
        session
            .store()
            .read(CacheKey::Profile(session.user()))
            .unwrap()
            .version(),
        version
    );

    let notification = session.notifications().current().unwrap();
    assert_eq!(notification.severity, Severity::Error);
    assert!(notification.message.contains("Not enough points"));
}

#[tokio::test]
async fn test_unlock_replaces_character_and_confirms_record() {
    let api = Arc::new(MockApi::seeded(500));
    let session = loaded_session(&api).await;

    let handle = session.unlock_achievement(AchievementId::from(1)).unwrap();
    let profile = cached_profile(&session);
    assert_eq!(profile.points, 350);
    assert_eq!(profile.character, "Ninja");
    assert_eq!(profile.achievements_count, 1);
    let pending: Vec<UserAchievement> = session
        .store()
        .view(CacheKey::UnlockedAchievements(session.user()))
        .unwrap();
    assert!(!pending[0].is_confirmed());

    let record = handle.settled().await.unwrap();
    assert!(record.is_confirmed());
    let confirmed: Vec<UserAchievement> = session
        .store()
        .view(CacheKey::UnlockedAchievements(session.user()))
        .unwrap();
    assert_eq!(confirmed, vec![record]);
    assert_eq!(
        session.notifications().current().unwrap().message,
        "Achievement unlocked! You are now Ninja! (150 points spent)"
    );
}

#[tokio::test]
async fn test_failed_unlock_restores_prior_job_title() {
    let api = Arc::new(MockApi::seeded(500));
    let session = loaded_session(&api).await;
    api.fail_next(Endpoint::UnlockAchievement, ApiError::Timeout);

    let handle = session.unlock_achievement(AchievementId::from(2)).unwrap();
    assert_eq!(cached_profile(&session).job_title, "Gym Leader");

    handle.settled().await.unwrap_err();
    let profile = cached_profile(&session);
    assert_eq!(profile.job_title, "Fitness Novice");
    assert_eq!(profile.points, 500);
    assert_eq!(profile.achievements_count, 0);
    let unlocked: Vec<UserAchievement> = session
        .store()
        .view(CacheKey::UnlockedAchievements(session.user()))
        .unwrap();
    assert!(unlocked.is_empty());
    assert_eq!(
        session.notifications().current().unwrap().message,
        "Failed to unlock achievement"
    );
}

#[tokio::test]
async fn test_unlocking_twice_is_rejected_locally() {
    let api = Arc::new(MockApi::seeded(500));
    let session = loaded_session(&api).await;
    session
        .unlock_achievement(AchievementId::from(3))
        .unwrap()
        .settled()
        .await
        .unwrap();

    let err = session.unlock_achievement(AchievementId::from(3)).unwrap_err();
    assert_eq!(err, MutationError::AlreadyUnlocked(AchievementId::from(3)));
    assert_eq!(api.calls(Endpoint::UnlockAchievement), 1);
}

// ----------------------------------------------------------------------------
// Generate tasks
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_generate_tasks_replaces_list_after_server_answers() {
    let api = Arc::new(MockApi::seeded(0));
    let session = loaded_session(&api).await;

    let handle = session.generate_tasks().unwrap();
    assert_eq!(cached_tasks(&session).len(), 3);

    let tasks = handle.settled().await.unwrap();
    assert_eq!(cached_tasks(&session), tasks);
    assert_eq!(cached_tasks(&session)[0].id, DailyTaskId::from(11));
    assert!(session
        .notifications()
        .current()
        .unwrap()
        .message
        .starts_with("New daily tasks generated!"));
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_read_after_reconciliation_delay_refetches_once() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    assert_eq!(api.calls(Endpoint::Profile), 1);

    session
        .complete_task(DailyTaskId::from(1))
        .unwrap()
        .settled()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    session.profile().await;
    assert_eq!(api.calls(Endpoint::Profile), 1);

    tokio::time::sleep(Duration::from_millis(1_001)).await;
    yield_many().await;
    assert!(session.store().is_stale(CacheKey::Profile(session.user())));

    let (a, b) = tokio::join!(session.profile(), session.profile());
    assert_eq!(api.calls(Endpoint::Profile), 2);
    assert_eq!(a.data.unwrap().points, 350);
    assert_eq!(b.data.unwrap().points, 350);

    session.profile().await;
    assert_eq!(api.calls(Endpoint::Profile), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconciliation_heals_concurrent_server_change() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;
    let _active = session.keep_fresh(CacheKey::Profile(session.user()));

    session
        .complete_task(DailyTaskId::from(1))
        .unwrap()
        .settled()
        .await
        .unwrap();

    // Another device spent points meanwhile.
    api.set_points(120);
    assert_eq!(cached_profile(&session).points, 350);

    tokio::time::sleep(Duration::from_secs(6)).await;
    yield_many().await;
    assert_eq!(cached_profile(&session).points, 120);
}

#[tokio::test]
async fn test_force_refresh_all_invalidates_every_view() {
    let api = Arc::new(MockApi::seeded(300));
    let session = loaded_session(&api).await;

    assert_eq!(session.force_refresh_all(), 5);
    for key in CacheKey::all_for(session.user()) {
        assert!(session.store().is_stale(key), "{} should be stale", key);
    }

    let progress = session.daily_progress().await;
    assert_eq!(progress.data.unwrap().total, 3);
    assert_eq!(api.calls(Endpoint::DailyTasks), 2);
}

#[tokio::test]
async fn test_level_progress_follows_optimistic_points() {
    let api = Arc::new(MockApi::seeded(230));
    let session = loaded_session(&api).await;
    assert_eq!(session.level_progress().await.data.unwrap().level, 1);

    // Task 3 is worth 20 points, exactly the level 2 threshold.
    session.complete_task(DailyTaskId::from(3)).unwrap();
    let progress = session.level_progress().await.data.unwrap();
    assert_eq!(progress.level, 2);
    assert_eq!(progress.points, 250);
    assert_eq!(progress.next, Some(500));
}
