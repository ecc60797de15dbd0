use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single task. `id` 0 means "not yet persisted"; the store assigns a
/// real id on first upsert and every later save with a non-zero id
/// overwrites that row in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_at: Option<i64>,
    #[serde(default)]
    pub remind_at: Option<i64>,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default = "now_millis")]
    pub created_at: i64,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: String::new(),
            due_at: None,
            remind_at: None,
            is_done: false,
            is_pinned: false,
            created_at: now_millis(),
        }
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Done,
}
