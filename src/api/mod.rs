pub mod auth;
pub mod chaos;
pub mod handlers;
pub mod requests;
pub mod responses;
pub mod routes;

pub use auth::Principal;
pub use routes::{create_router, AppState};
