pub mod delivery;
pub mod presentation;
pub mod reminders;
pub mod timer;
pub mod view_engine;

pub use delivery::{DeliveryExecutor, ReminderPayload};
pub use reminders::{ReminderScheduler, SnoozeOption};
pub use timer::{DeferredExecutor, TokioDeferredExecutor};
pub use view_engine::{UiState, UiStateObserver, ViewEngine};
