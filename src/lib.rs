//! Live question rooms.
//!
//! Clients open a socket on `/ws` and send `{"type":"join","room":"<code>"}`.
//! From then on they receive every question posted to that room through
//! `POST /api/ask/{code}`, deletions made by an admin, and the number of
//! clients currently in the room.
//!
//! Membership is kept in memory ([`rooms::Registry`]); questions and rooms
//! live in SQLite ([`db::Store`]). A question is only broadcast after it has
//! been written.

pub mod api;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod rooms;
pub mod session;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRef,
    http::{header::CONTENT_TYPE, Method},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;
pub use db::Store;
pub use rooms::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub hub: Hub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        let hub = Hub::new(store.clone(), &config);
        Self {
            store,
            hub,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let session_layer = session::layer(&state.config);

    Router::new()
        .merge(auth::router())
        .merge(rooms::router())
        .nest("/api", api::router())

        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
