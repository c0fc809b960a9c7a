//! Best-effort fan-out of room events to live members.

use axum::extract::ws::Utf8Bytes;
use tracing::{debug, warn};

use super::{
    events::Event,
    registry::{Members, PushError, Registry},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub attempted: usize,
    pub delivered: usize,
}

/// Pushes `event` to every live member of `room`. Failed members are logged
/// and skipped; the caller never sees an error.
pub fn broadcast(registry: &Registry, room: &str, event: &Event) -> Delivery {
    let frame = match event.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(room, event = event.kind(), error = %e, "failed to serialize event");
            return Delivery::default();
        }
    };

    registry.with_members(room, |members| deliver(room, event.kind(), members, &frame))
}

/// Sends the room's live count to the room. Count and delivery happen under
/// one lock so every member's last update matches the settled membership.
pub fn publish_presence(registry: &Registry, room: &str) -> Delivery {
    registry.with_members(room, |members| {
        let event = Event::ClientCountUpdate { count: members.len() };
        match event.to_frame() {
            Ok(frame) => deliver(room, event.kind(), members, &frame),
            Err(e) => {
                warn!(room, error = %e, "failed to serialize presence");
                Delivery::default()
            }
        }
    })
}

fn deliver(room: &str, kind: &str, members: Members<'_>, frame: &Utf8Bytes) -> Delivery {
    let mut delivery = Delivery::default();
    if members.is_empty() {
        return delivery;
    }

    for handle in members.iter() {
        delivery.attempted += 1;
        match handle.push(frame.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(PushError::Full) => {
                warn!(conn = %handle.id(), room, event = kind, "outbound queue full, dropping frame");
            }
            Err(PushError::Closed) => {
                warn!(conn = %handle.id(), room, event = kind, "member transport closed");
            }
        }
    }

    debug!(
        room,
        event = kind,
        attempted = delivery.attempted,
        delivered = delivery.delivered,
        "broadcast event"
    );
    delivery
}
