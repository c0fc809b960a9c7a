//! Request/response surface around the rooms core.

mod ask;
mod body;
mod export;
mod questions;
mod sessions;
mod source;

use axum::{routing::{delete, get, post}, Router};

use crate::AppState;

pub(crate) use body::JsonBody;
pub use source::SourceAddr;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ask/{room_code}", post(ask::ask))
        .route("/questions/{id}", delete(questions::delete_question))
        .route("/sessions", get(sessions::list_sessions).post(sessions::create_session))
        .route("/sessions/{room_code}", get(sessions::session))
        .route("/sessions/{room_code}/presence", get(sessions::presence))
        .route("/sessions/{room_code}/export", get(export::export))
}
