pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
