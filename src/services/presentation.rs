use std::collections::BTreeMap;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Task;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Overdue: the reminder time has passed and the task is not done.
pub fn is_overdue(task: &Task, now_ms: i64) -> bool {
    match task.remind_at {
        Some(remind_at) => !task.is_done && remind_at < now_ms,
        None => false,
    }
}

/// Not-done tasks in display order: pinned first, then overdue, then
/// tasks with a reminder (soonest first), then the rest. Stable, so ties
/// keep the snapshot order.
pub fn active_order(tasks: &[Task], now_ms: i64) -> Vec<Task> {
    let mut active: Vec<Task> = tasks.iter().filter(|t| !t.is_done).cloned().collect();
    active.sort_by_key(|t| {
        (
            !t.is_pinned,
            !is_overdue(t, now_ms),
            t.remind_at.is_none(),
            t.remind_at.unwrap_or(i64::MAX),
        )
    });
    active
}

/// The list screen's three sections.
#[derive(Debug, Clone, Serialize)]
pub struct ListSections {
    pub pinned: Vec<Task>,
    pub active: Vec<Task>,
    pub done: Vec<Task>,
}

pub fn list_sections(tasks: &[Task], now_ms: i64) -> ListSections {
    let ordered = active_order(tasks, now_ms);
    let (pinned, active) = ordered.into_iter().partition(|t| t.is_pinned);
    let done = tasks.iter().filter(|t| t.is_done).cloned().collect();
    ListSections {
        pinned,
        active,
        done,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarView {
    #[default]
    Today,
    Upcoming,
    All,
}

/// One local calendar day of reminders.
#[derive(Debug, Clone, Serialize)]
pub struct DayGroup {
    pub day_start: i64,
    pub label: String,
    pub date: String,
    pub tasks: Vec<Task>,
}

/// Buckets tasks that carry a reminder by the local start-of-day of that
/// reminder. Buckets ascend chronologically; within a bucket tasks ascend
/// by reminder time.
pub fn calendar_groups(tasks: &[Task], view: CalendarView, now_ms: i64) -> Vec<DayGroup> {
    let start_today = start_of_local_day(now_ms);
    let start_tomorrow = start_today + DAY_MS;

    let mut buckets: BTreeMap<i64, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        let Some(remind_at) = task.remind_at else {
            continue;
        };
        let keep = match view {
            CalendarView::Today => remind_at >= start_today && remind_at < start_tomorrow,
            CalendarView::Upcoming => remind_at >= start_tomorrow,
            CalendarView::All => true,
        };
        if keep {
            buckets
                .entry(start_of_local_day(remind_at))
                .or_default()
                .push(task.clone());
        }
    }

    buckets
        .into_iter()
        .map(|(day_start, mut tasks)| {
            tasks.sort_by_key(|t| t.remind_at);
            DayGroup {
                day_start,
                label: day_label(day_start, start_today, start_tomorrow),
                date: format_date(day_start),
                tasks,
            }
        })
        .collect()
}

fn day_label(day_start: i64, start_today: i64, start_tomorrow: i64) -> String {
    if day_start == start_today {
        "Today".to_string()
    } else if day_start == start_tomorrow {
        "Tomorrow".to_string()
    } else {
        "Upcoming".to_string()
    }
}

/// Midnight truncation in the local calendar.
pub fn start_of_local_day(at_ms: i64) -> i64 {
    let Some(local) = to_local(at_ms) else {
        return at_ms;
    };
    let Some(midnight) = local.date_naive().and_hms_opt(0, 0, 0) else {
        return at_ms;
    };
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map_or(at_ms, |dt| dt.timestamp_millis())
}

/// The next calendar day at exactly 09:00:00.000 local time, independent
/// of the time of day of `now_ms`.
pub fn tomorrow_at_nine_local(now_ms: i64) -> i64 {
    let Some(local) = to_local(now_ms) else {
        return now_ms;
    };
    let Some(tomorrow) = local.date_naive().succ_opt() else {
        return now_ms;
    };
    let Some(at_nine) = tomorrow.and_hms_opt(9, 0, 0) else {
        return now_ms;
    };
    Local
        .from_local_datetime(&at_nine)
        .earliest()
        .map_or(now_ms, |dt| dt.timestamp_millis())
}

pub fn format_date(at_ms: i64) -> String {
    to_local(at_ms).map_or_else(String::new, |dt| dt.format("%d %b %Y").to_string())
}

fn to_local(at_ms: i64) -> Option<DateTime<Local>> {
    Utc.timestamp_millis_opt(at_ms)
        .single()
        .map(|dt| dt.with_timezone(&Local))
}
