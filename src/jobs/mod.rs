use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod repo;
pub mod services;
pub mod worker;

pub use worker::{JobMessage, JobQueue};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::job_routes())
}
