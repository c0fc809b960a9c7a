use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, trace};

use super::{events::ControlFrame, registry::Handle, Hub};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    Unjoined,
    Joined(String),
    Disconnected,
}

/// Protocol state of one socket. Owned by that socket's task alone.
pub struct Connection {
    hub: Hub,
    handle: Handle,
    state: ConnState,
}

impl Connection {
    pub fn new(hub: Hub, handle: Handle) -> Self {
        Self { hub, handle, state: ConnState::Unjoined }
    }

    pub fn state(&self) -> &ConnState {
        &self.state
    }

    /// A frame that doesn't parse is dropped; the connection stays up.
    pub fn on_frame(&mut self, raw: &str) {
        let frame = match ControlFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(conn = %self.handle.id(), error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            ControlFrame::Join { room } => self.join(room),
            ControlFrame::Unknown => trace!(conn = %self.handle.id(), "ignoring unknown frame type"),
        }
    }

    pub fn on_binary(&mut self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(text) => self.on_frame(text),
            Err(_) => debug!(conn = %self.handle.id(), "dropping non-utf8 frame"),
        }
    }

    fn join(&mut self, room: String) {
        if room.trim().is_empty() {
            debug!(conn = %self.handle.id(), "dropping join without a room");
            return;
        }

        match &self.state {
            ConnState::Unjoined => {
                self.hub.join(&room, self.handle.clone());
                self.state = ConnState::Joined(room);
            }
            ConnState::Joined(current) => {
                debug!(conn = %self.handle.id(), %current, requested = %room, "already joined, ignoring join");
            }
            ConnState::Disconnected => {}
        }
    }

    /// Leaves the joined room, at most once however often it is called.
    pub fn disconnect(&mut self) {
        if let ConnState::Joined(_) = std::mem::replace(&mut self.state, ConnState::Disconnected) {
            self.hub.leave(&self.handle);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(State(hub): State<Hub>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_socket(hub, stream))
}

async fn serve_socket(hub: Hub, stream: WebSocket) {
    let (handle, mut rx) = Handle::channel(hub.outbound_buffer());
    let conn_id = handle.id();
    let mut conn = Connection::new(hub, handle);
    let (mut sender, mut receiver) = stream.split();
    debug!(conn = %conn_id, "socket opened");

    let mut push_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => conn.on_frame(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => conn.on_binary(&bytes),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn = %conn_id, error = %e, "socket error");
                    break;
                }
            },
            _ = &mut push_task => break,
        }
    }

    conn.disconnect();
    push_task.abort();
    debug!(conn = %conn_id, "socket closed");
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Utf8Bytes;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{db::Store, Config};

    async fn hub() -> Hub {
        Hub::new(Store::memory().await.unwrap(), &Config::default())
    }

    fn connection(hub: &Hub) -> (Connection, mpsc::Receiver<Utf8Bytes>) {
        let (handle, rx) = Handle::channel(8);
        (Connection::new(hub.clone(), handle), rx)
    }

    fn next(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Value {
        serde_json::from_str(rx.try_recv().unwrap().as_str()).unwrap()
    }

    #[tokio::test]
    async fn join_moves_to_joined_and_reports_presence() {
        let hub = hub().await;
        let (mut conn, mut rx) = connection(&hub);
        assert_eq!(conn.state(), &ConnState::Unjoined);

        conn.on_frame(r#"{"type":"join","room":"ABC123"}"#);

        assert_eq!(conn.state(), &ConnState::Joined("ABC123".into()));
        assert_eq!(hub.count_of("ABC123"), 1);
        let frame = next(&mut rx);
        assert_eq!(frame["type"], "client_count_update");
        assert_eq!(frame["count"], 1);
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_keep_the_state() {
        let hub = hub().await;
        let (mut conn, mut rx) = connection(&hub);

        conn.on_frame("{{{");
        conn.on_frame(r#"{"type":"wave"}"#);
        conn.on_binary(&[0xff, 0xfe]);
        conn.on_frame(r#"{"type":"join","room":"   "}"#);
        assert_eq!(conn.state(), &ConnState::Unjoined);
        assert!(rx.try_recv().is_err());

        conn.on_binary(br#"{"type":"join","room":"ABC123"}"#);
        assert_eq!(conn.state(), &ConnState::Joined("ABC123".into()));
    }

    #[tokio::test]
    async fn second_join_is_ignored() {
        let hub = hub().await;
        let (mut conn, _rx) = connection(&hub);

        conn.on_frame(r#"{"type":"join","room":"ABC123"}"#);
        conn.on_frame(r#"{"type":"join","room":"XYZ789"}"#);
        conn.on_frame(r#"{"type":"join","room":"ABC123"}"#);

        assert_eq!(conn.state(), &ConnState::Joined("ABC123".into()));
        assert_eq!(hub.count_of("ABC123"), 1);
        assert_eq!(hub.count_of("XYZ789"), 0);
    }

    #[tokio::test]
    async fn disconnect_leaves_once_and_updates_the_room() {
        let hub = hub().await;
        let (mut first, _rx1) = connection(&hub);
        let (mut second, mut rx2) = connection(&hub);
        first.on_frame(r#"{"type":"join","room":"ABC123"}"#);
        second.on_frame(r#"{"type":"join","room":"ABC123"}"#);
        while rx2.try_recv().is_ok() {}

        first.disconnect();
        first.disconnect();

        assert_eq!(first.state(), &ConnState::Disconnected);
        assert_eq!(hub.count_of("ABC123"), 1);
        assert_eq!(next(&mut rx2)["count"], 1);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_after_disconnect_is_ignored() {
        let hub = hub().await;
        let (mut conn, _rx) = connection(&hub);
        conn.disconnect();

        conn.on_frame(r#"{"type":"join","room":"ABC123"}"#);
        assert_eq!(conn.state(), &ConnState::Disconnected);
        assert_eq!(hub.count_of("ABC123"), 0);
    }

    #[tokio::test]
    async fn dropping_a_joined_connection_leaves() {
        let hub = hub().await;
        let (mut conn, _rx) = connection(&hub);
        conn.on_frame(r#"{"type":"join","room":"ABC123"}"#);

        drop(conn);
        assert_eq!(hub.count_of("ABC123"), 0);
        assert!(hub.registry().rooms().is_empty());
    }
}
