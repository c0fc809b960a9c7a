//! Live rooms: membership, fan-out, and the socket protocol.

pub mod dispatch;
pub mod events;
pub mod hub;
pub mod registry;
pub mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use dispatch::Delivery;
pub use events::{ControlFrame, Event};
pub use hub::{Ask, Hub};
pub use registry::{Departure, Handle, Joined, Registry};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
}
