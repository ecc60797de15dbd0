use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;

/// Payload carried by a deferred reminder registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPayload {
    pub task_id: i64,
    pub title: String,
}

/// A user-visible reminder. `display_id` is freshly randomized per firing,
/// never derived from the task id; `task_id` lets the presentation layer
/// route a tap back to the task.
#[derive(Debug, Clone)]
pub struct ReminderNotification {
    pub display_id: Uuid,
    pub task_id: i64,
    pub title: String,
    pub body: String,
}

/// Live notification-permission check, evaluated at fire time.
pub trait NotificationPermission: Send + Sync {
    fn is_granted(&self) -> bool;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: ReminderNotification) -> Result<(), AppError>;
}

/// Permission gate backed by the `NOTIFICATIONS_ENABLED` environment
/// variable. Granted unless the variable is set to an explicit "off" value.
#[derive(Default)]
pub struct EnvNotificationPermission;

impl NotificationPermission for EnvNotificationPermission {
    fn is_granted(&self) -> bool {
        match env::var("NOTIFICATIONS_ENABLED") {
            Ok(value) => !matches!(value.to_lowercase().as_str(), "0" | "false" | "no"),
            Err(_) => true,
        }
    }
}

/// Sink that surfaces reminders on the service log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn show(&self, notification: ReminderNotification) -> Result<(), AppError> {
        info!(
            task_id = notification.task_id,
            display_id = %notification.display_id,
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// Runs a registration once its due time arrives. Delivery is best-effort
/// and at-most-one-attempt: a denied permission or a failed display both
/// resolve to success and are never retried.
pub struct DeliveryExecutor {
    permission: Arc<dyn NotificationPermission>,
    sink: Arc<dyn NotificationSink>,
}

impl DeliveryExecutor {
    pub fn new(
        permission: Arc<dyn NotificationPermission>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { permission, sink }
    }

    pub async fn fire(&self, payload: ReminderPayload) {
        if !self.permission.is_granted() {
            info!(
                task_id = payload.task_id,
                "notification permission not granted, dropping reminder"
            );
            return;
        }

        let notification = ReminderNotification {
            display_id: Uuid::new_v4(),
            task_id: payload.task_id,
            title: "Reminder".to_string(),
            body: payload.title,
        };

        if let Err(err) = self.sink.show(notification).await {
            warn!(
                task_id = payload.task_id,
                "failed to display reminder: {}", err
            );
        }
    }
}
