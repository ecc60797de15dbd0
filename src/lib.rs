//! Personal task manager service: task store, derived view engine,
//! reminder scheduling and delivery, remote tips, HTTP API.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod tips;
