use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use tasko::db::TaskStore;
use tasko::error::AppError;
use tasko::models::Task;
use tasko::services::delivery::{
    DeliveryExecutor, NotificationPermission, NotificationSink, ReminderNotification,
};
use tasko::services::{ReminderScheduler, SnoozeOption, TokioDeferredExecutor};

struct StaticPermission(bool);

impl NotificationPermission for StaticPermission {
    fn is_granted(&self) -> bool {
        self.0
    }
}

#[derive(Default)]
struct RecordingSink {
    shown: Mutex<Vec<ReminderNotification>>,
}

impl RecordingSink {
    fn bodies(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.body.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn show(&self, notification: ReminderNotification) -> Result<(), AppError> {
        self.shown.lock().unwrap().push(notification);
        Ok(())
    }
}

fn scheduler_with(granted: bool) -> (ReminderScheduler, Arc<TokioDeferredExecutor>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let delivery = Arc::new(DeliveryExecutor::new(
        Arc::new(StaticPermission(granted)),
        sink.clone(),
    ));
    let timers = Arc::new(TokioDeferredExecutor::new(delivery));
    let scheduler = ReminderScheduler::new(timers.clone());
    (scheduler, timers, sink)
}

async fn setup_store() -> TaskStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    TaskStore::new(pool).await.expect("Failed to create store")
}

#[tokio::test(start_paused = true)]
async fn past_due_reminder_is_dropped() {
    let (scheduler, timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "too late", now - 1_000);

    assert!(!timers.is_registered("reminder_1"));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(sink.shown.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn schedule_registers_and_fires_once() {
    let (scheduler, timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "stretch", now + 500);
    assert!(timers.is_registered("reminder_1"));

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(sink.bodies(), vec!["stretch"]);
    assert!(!timers.is_registered("reminder_1"));
}

#[tokio::test(start_paused = true)]
async fn reschedule_replaces_pending_registration() {
    let (scheduler, timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "first", now + 500);
    scheduler.schedule(1, "second", now + 200);
    assert!(timers.is_registered("reminder_1"));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.bodies(), vec!["second"]);
}

#[tokio::test(start_paused = true)]
async fn repeated_identical_schedule_fires_once() {
    let (scheduler, _timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "stand up", now + 300);
    scheduler.schedule(1, "stand up", now + 300);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.bodies(), vec!["stand up"]);
}

#[tokio::test(start_paused = true)]
async fn cancel_removes_pending_registration() {
    let (scheduler, timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "never fires", now + 500);
    scheduler.cancel(1);
    assert!(!timers.is_registered("reminder_1"));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(sink.shown.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_without_registration_is_noop() {
    let (scheduler, timers, _sink) = scheduler_with(true);
    scheduler.cancel(99);
    assert!(!timers.is_registered("reminder_99"));
}

#[tokio::test(start_paused = true)]
async fn denied_permission_swallows_delivery() {
    let (scheduler, timers, sink) = scheduler_with(false);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "invisible", now + 200);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(sink.shown.lock().unwrap().is_empty());
    assert!(!timers.is_registered("reminder_1"));
}

#[tokio::test(start_paused = true)]
async fn separate_tasks_keep_separate_registrations() {
    let (scheduler, timers, sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    scheduler.schedule(1, "one", now + 300);
    scheduler.schedule(2, "two", now + 400);
    assert!(timers.is_registered("reminder_1"));
    assert!(timers.is_registered("reminder_2"));

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(sink.bodies(), vec!["one", "two"]);
}

#[tokio::test]
async fn snooze_persists_new_due_time_and_reschedules() {
    let store = setup_store().await;
    let (scheduler, timers, _sink) = scheduler_with(true);

    let mut task = Task::new("stretch");
    task.remind_at = Some(Utc::now().timestamp_millis() + 60_000);
    let id = store.upsert(&task).await.unwrap();
    scheduler.schedule(id, &task.title, Utc::now().timestamp_millis() + 60_000);

    let before = Utc::now().timestamp_millis();
    let updated = scheduler
        .snooze(&store, id, SnoozeOption::TenMinutes)
        .await
        .unwrap()
        .expect("task should exist");
    let after = Utc::now().timestamp_millis();

    let remind_at = updated.remind_at.expect("snooze sets a reminder");
    assert!(remind_at >= before + 600_000);
    assert!(remind_at <= after + 600_000);

    let persisted = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(persisted.remind_at, Some(remind_at));
    assert!(timers.is_registered(&format!("reminder_{id}")));
}

#[tokio::test]
async fn snooze_missing_task_returns_none() {
    let store = setup_store().await;
    let (scheduler, _timers, _sink) = scheduler_with(true);

    let result = scheduler
        .snooze(&store, 424242, SnoozeOption::OneHour)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn restore_after_delete_reuses_original_identity() {
    let store = setup_store().await;
    let (scheduler, timers, _sink) = scheduler_with(true);

    let mut task = Task::new("undo me");
    task.remind_at = Some(Utc::now().timestamp_millis() + 60_000);
    let id = store.upsert(&task).await.unwrap();
    let saved = store.get_by_id(id).await.unwrap().unwrap();

    scheduler.cancel(id);
    store.delete(&saved).await.unwrap();

    // Undo restores the same record, original identity included, so the
    // reminder key stays stable.
    let restored_id = store.upsert(&saved).await.unwrap();
    assert_eq!(restored_id, id);

    let remind_at = saved.remind_at.unwrap();
    scheduler.schedule(restored_id, &saved.title, remind_at);
    assert!(timers.is_registered(&format!("reminder_{id}")));
}

#[tokio::test]
async fn rehydrate_schedules_only_future_undone_reminders() {
    let store = setup_store().await;
    let (scheduler, timers, _sink) = scheduler_with(true);
    let now = Utc::now().timestamp_millis();

    let mut future = Task::new("future");
    future.remind_at = Some(now + 120_000);
    let future_id = store.upsert(&future).await.unwrap();

    let mut past = Task::new("past");
    past.remind_at = Some(now - 120_000);
    let past_id = store.upsert(&past).await.unwrap();

    let mut finished = Task::new("finished");
    finished.remind_at = Some(now + 120_000);
    finished.is_done = true;
    let finished_id = store.upsert(&finished).await.unwrap();

    store.upsert(&Task::new("no reminder")).await.unwrap();

    let scheduled = scheduler.rehydrate(&store).await.unwrap();
    assert_eq!(scheduled, 1);
    assert!(timers.is_registered(&format!("reminder_{future_id}")));
    assert!(!timers.is_registered(&format!("reminder_{past_id}")));
    assert!(!timers.is_registered(&format!("reminder_{finished_id}")));
}
