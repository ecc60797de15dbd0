use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router, extract::{Path, Query, State}, http::StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::error::AppError;
use crate::models::{Task, TaskFilter};
use crate::services::SnoozeOption;
use crate::services::presentation::{self, CalendarView, DayGroup, ListSections};
use crate::services::view_engine::UiState;
use crate::state::AppState;
use crate::tips::Tip;

#[derive(Deserialize)]
struct DoneRequest {
    done: bool,
}

#[derive(Deserialize)]
struct PinRequest {
    pinned: bool,
}

#[derive(Deserialize)]
struct SnoozeRequest {
    option: SnoozeOption,
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Deserialize)]
struct FilterRequest {
    filter: TaskFilter,
}

#[derive(Deserialize)]
struct CalendarParams {
    #[serde(default)]
    view: CalendarView,
}

#[derive(Serialize)]
struct ClearDoneResponse {
    deleted: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(save_task))
        .route("/tasks/done", delete(clear_done))
        .route("/tasks/{id}", get(get_task).delete(delete_task))
        .route("/tasks/{id}/done", patch(set_done))
        .route("/tasks/{id}/pin", patch(set_pinned))
        .route("/tasks/{id}/snooze", post(snooze_task))
        .route("/ui", get(ui_state))
        .route("/ui/stream", get(ui_stream))
        .route("/ui/query", put(set_query))
        .route("/ui/filter", put(set_filter))
        .route("/ui/active", get(active_list))
        .route("/ui/calendar", get(calendar))
        .route("/tips", get(tips))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(state.store.pool()).await?;
    Ok(StatusCode::OK)
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.store.fetch_all().await?;
    Ok(Json(tasks))
}

async fn save_task(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<Json<Task>, AppError> {
    let id = state.store.upsert(&task).await?;

    // A saved reminder supersedes whatever was pending under this id; a
    // cleared one cancels it.
    match task.remind_at {
        Some(remind_at) => state.reminders.schedule(id, &task.title, remind_at),
        None => state.reminders.cancel(id),
    }

    let mut saved = task;
    saved.id = id;
    Ok(Json(saved))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    let task = state.store.get_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let task = state.store.get_by_id(id).await?.ok_or(AppError::NotFound)?;
    state.reminders.cancel(task.id);
    state.store.delete(&task).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_done(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<DoneRequest>,
) -> Result<StatusCode, AppError> {
    state.store.set_done(id, req.done).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_pinned(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<PinRequest>,
) -> Result<StatusCode, AppError> {
    state.store.set_pinned(id, req.pinned).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn snooze_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SnoozeRequest>,
) -> Result<Json<Task>, AppError> {
    let task = state
        .reminders
        .snooze(&state.store, id, req.option)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(task))
}

async fn clear_done(State(state): State<AppState>) -> Result<Json<ClearDoneResponse>, AppError> {
    let done: Vec<Task> = state
        .store
        .fetch_all()
        .await?
        .into_iter()
        .filter(|t| t.is_done)
        .collect();

    let mut deleted = 0;
    for task in done {
        state.reminders.cancel(task.id);
        state.store.delete(&task).await?;
        deleted += 1;
    }
    Ok(Json(ClearDoneResponse { deleted }))
}

/// Latest published state. Attaches an observer for the duration of the
/// request, so polling clients keep the pipeline warm through the grace
/// window just as an open stream does.
async fn ui_state(State(state): State<AppState>) -> Json<UiState> {
    let observer = state.engine.subscribe();
    Json(observer.current())
}

async fn ui_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.engine.subscribe().into_stream().map(|ui| {
        let event = match Event::default().json_data(&ui) {
            Ok(event) => event,
            Err(err) => {
                warn!("failed to encode ui state event: {}", err);
                Event::default()
            }
        };
        Ok::<_, Infallible>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn set_query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> StatusCode {
    state.engine.set_query(req.query);
    StatusCode::NO_CONTENT
}

async fn set_filter(State(state): State<AppState>, Json(req): Json<FilterRequest>) -> StatusCode {
    state.engine.set_filter(req.filter);
    StatusCode::NO_CONTENT
}

async fn active_list(State(state): State<AppState>) -> Json<ListSections> {
    let observer = state.engine.subscribe();
    let ui = observer.current();
    let now = Utc::now().timestamp_millis();
    Json(presentation::list_sections(&ui.tasks, now))
}

async fn calendar(
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> Json<Vec<DayGroup>> {
    let observer = state.engine.subscribe();
    let ui = observer.current();
    let now = Utc::now().timestamp_millis();
    Json(presentation::calendar_groups(&ui.tasks, params.view, now))
}

async fn tips(State(state): State<AppState>) -> Result<Json<Vec<Tip>>, AppError> {
    let tips = state.tips.fetch_tips().await?;
    Ok(Json(tips))
}
