use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tasko::api::router;
use tasko::db::TaskStore;
use tasko::services::delivery::{DeliveryExecutor, EnvNotificationPermission, LogNotificationSink};
use tasko::services::{ReminderScheduler, TokioDeferredExecutor, ViewEngine};
use tasko::state::AppState;
use tasko::tips::{NoopTipsClient, TipsClient, TipsConfig, TipsHttpClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tasko=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://tasko.db?mode=rwc".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(TaskStore::new(pool).await?);

    let delivery = Arc::new(DeliveryExecutor::new(
        Arc::new(EnvNotificationPermission),
        Arc::new(LogNotificationSink),
    ));
    let timers = Arc::new(TokioDeferredExecutor::new(delivery));
    let reminders = Arc::new(ReminderScheduler::new(timers));

    // The registration table does not survive restarts; put the pending
    // reminders back before accepting traffic.
    reminders.rehydrate(&store).await?;

    let engine = Arc::new(ViewEngine::new(store.observe()));

    let tips: Arc<dyn TipsClient> = match TipsConfig::new_from_env() {
        Ok(config) => Arc::new(TipsHttpClient::new(config)?),
        Err(_) => {
            info!("TIPS_BASE_URL not set, tips disabled");
            Arc::new(NoopTipsClient)
        }
    };

    let state = AppState {
        store,
        engine,
        reminders,
        tips,
    };

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
