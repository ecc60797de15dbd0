use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::TaskStore;
use crate::error::AppError;
use crate::models::Task;
use crate::services::delivery::ReminderPayload;
use crate::services::presentation::tomorrow_at_nine_local;
use crate::services::timer::DeferredExecutor;

/// Turns a task's reminder intent into exactly one deferred delivery,
/// keyed by task identity.
pub struct ReminderScheduler {
    timers: Arc<dyn DeferredExecutor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnoozeOption {
    TenMinutes,
    OneHour,
    TomorrowNine,
}

impl SnoozeOption {
    /// New due time, always relative to the snooze moment.
    pub fn resolve(self, now_ms: i64) -> i64 {
        match self {
            SnoozeOption::TenMinutes => now_ms + 10 * 60_000,
            SnoozeOption::OneHour => now_ms + 60 * 60_000,
            SnoozeOption::TomorrowNine => tomorrow_at_nine_local(now_ms),
        }
    }
}

impl ReminderScheduler {
    pub fn new(timers: Arc<dyn DeferredExecutor>) -> Self {
        Self { timers }
    }

    /// Registers one deferred delivery for the task, replacing any pending
    /// one under the same identity. A `remind_at` at or before now is
    /// dropped without firing: past-due reminders never surface late.
    pub fn schedule(&self, task_id: i64, title: &str, remind_at: i64) {
        let delay_ms = remind_at - Utc::now().timestamp_millis();
        if delay_ms <= 0 {
            debug!(task_id, remind_at, "reminder already past due, dropping");
            return;
        }

        self.timers.register(
            &reminder_key(task_id),
            Duration::from_millis(delay_ms as u64),
            ReminderPayload {
                task_id,
                title: title.to_string(),
            },
        );
    }

    /// Removes any pending delivery for the task. No-op when none exists.
    /// Must accompany task deletion and reminder clearing.
    pub fn cancel(&self, task_id: i64) {
        self.timers.unregister(&reminder_key(task_id));
    }

    /// Recomputes the due time from now, persists it onto the task and
    /// reschedules under the same identity. Returns the updated task, or
    /// `None` when the task no longer exists.
    pub async fn snooze(
        &self,
        store: &TaskStore,
        task_id: i64,
        option: SnoozeOption,
    ) -> Result<Option<Task>, AppError> {
        let Some(mut task) = store.get_by_id(task_id).await? else {
            return Ok(None);
        };

        let remind_at = option.resolve(Utc::now().timestamp_millis());
        self.cancel(task_id);
        task.remind_at = Some(remind_at);
        let id = store.upsert(&task).await?;
        self.schedule(id, &task.title, remind_at);

        Ok(Some(task))
    }

    /// Re-registers every not-done task with a future reminder. Called at
    /// startup since the in-process registration table does not survive a
    /// restart.
    pub async fn rehydrate(&self, store: &TaskStore) -> Result<usize, AppError> {
        let now = Utc::now().timestamp_millis();
        let mut scheduled = 0;

        for task in store.fetch_all().await? {
            if task.is_done {
                continue;
            }
            let Some(remind_at) = task.remind_at else {
                continue;
            };
            if remind_at > now {
                self.schedule(task.id, &task.title, remind_at);
                scheduled += 1;
            }
        }

        if scheduled > 0 {
            info!("rescheduled {} pending reminders", scheduled);
        }
        Ok(scheduled)
    }
}

fn reminder_key(task_id: i64) -> String {
    format!("reminder_{task_id}")
}
