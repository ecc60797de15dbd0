use std::sync::Arc;

use crate::db::TaskStore;
use crate::services::{ReminderScheduler, ViewEngine};
use crate::tips::TipsClient;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub engine: Arc<ViewEngine>,
    pub reminders: Arc<ReminderScheduler>,
    pub tips: Arc<dyn TipsClient>,
}
