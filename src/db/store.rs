use sqlx::SqlitePool;
use tokio::sync::{Mutex, watch};

use crate::error::AppError;
use crate::models::Task;

/// Authoritative task storage. Every mutation re-reads the table and
/// publishes the fresh snapshot on a watch channel, so observers see the
/// store as a live sequence of full snapshots (most recent wins).
pub struct TaskStore {
    db: SqlitePool,
    snapshots: watch::Sender<Vec<Task>>,
    // Serializes snapshot publication so a slow read can never overwrite
    // a newer snapshot with an older one.
    publish_lock: Mutex<()>,
}

const SELECT_TASKS: &str = "SELECT id, title, description, due_at, remind_at, is_done, is_pinned, created_at FROM tasks";

impl TaskStore {
    pub async fn new(db: SqlitePool) -> Result<Self, AppError> {
        let initial = fetch_all(&db).await?;
        let (snapshots, _) = watch::channel(initial);
        Ok(Self {
            db,
            snapshots,
            publish_lock: Mutex::new(()),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Live snapshot sequence. The receiver starts at the current snapshot.
    pub fn observe(&self) -> watch::Receiver<Vec<Task>> {
        self.snapshots.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Vec<Task> {
        self.snapshots.borrow().clone()
    }

    pub async fn fetch_all(&self) -> Result<Vec<Task>, AppError> {
        fetch_all(&self.db).await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!("{SELECT_TASKS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(task)
    }

    /// Upsert by identity: id 0 inserts and returns the assigned id, a
    /// non-zero id overwrites that row in place and returns it unchanged.
    pub async fn upsert(&self, task: &Task) -> Result<i64, AppError> {
        let id = if task.id == 0 {
            sqlx::query(
                "INSERT INTO tasks (title, description, due_at, remind_at, is_done, is_pinned, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.due_at)
            .bind(task.remind_at)
            .bind(task.is_done)
            .bind(task.is_pinned)
            .bind(task.created_at)
            .execute(&self.db)
            .await?
            .last_insert_rowid()
        } else {
            sqlx::query(
                "INSERT INTO tasks (id, title, description, due_at, remind_at, is_done, is_pinned, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET \
                 title = excluded.title, description = excluded.description, \
                 due_at = excluded.due_at, remind_at = excluded.remind_at, \
                 is_done = excluded.is_done, is_pinned = excluded.is_pinned, \
                 created_at = excluded.created_at",
            )
            .bind(task.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.due_at)
            .bind(task.remind_at)
            .bind(task.is_done)
            .bind(task.is_pinned)
            .bind(task.created_at)
            .execute(&self.db)
            .await?;
            task.id
        };

        self.publish().await?;
        Ok(id)
    }

    pub async fn delete(&self, task: &Task) -> Result<(), AppError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task.id)
            .execute(&self.db)
            .await?;
        self.publish().await
    }

    pub async fn set_done(&self, id: i64, done: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE tasks SET is_done = ? WHERE id = ?")
            .bind(done)
            .bind(id)
            .execute(&self.db)
            .await?;
        self.publish().await
    }

    pub async fn set_pinned(&self, id: i64, pinned: bool) -> Result<(), AppError> {
        sqlx::query("UPDATE tasks SET is_pinned = ? WHERE id = ?")
            .bind(pinned)
            .bind(id)
            .execute(&self.db)
            .await?;
        self.publish().await
    }

    async fn publish(&self) -> Result<(), AppError> {
        let _guard = self.publish_lock.lock().await;
        let snapshot = fetch_all(&self.db).await?;
        self.snapshots.send_replace(snapshot);
        Ok(())
    }
}

async fn fetch_all(db: &SqlitePool) -> Result<Vec<Task>, AppError> {
    let tasks = sqlx::query_as::<_, Task>(&format!(
        "{SELECT_TASKS} ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(tasks)
}
