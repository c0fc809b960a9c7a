use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::{Question, Store},
    AppError, AppResult, Config,
};

use super::{
    dispatch::{self, Delivery},
    events::Event,
    registry::{Departure, Handle, HandleId, Joined, Registry},
};

/// A question as it arrives from the request layer.
#[derive(Debug, Clone, Default)]
pub struct Ask {
    pub text: String,
    pub name: Option<String>,
    /// Supplied by the caller (proxy header or peer address), stored for tracing only.
    pub source_addr: Option<String>,
}

/// Ties the live registry to the durable store.
#[derive(Clone)]
pub struct Hub {
    registry: Arc<Registry>,
    store: Store,
    anonymous_name: Arc<str>,
    outbound_buffer: usize,
}

impl Hub {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            store,
            anonymous_name: Arc::from(config.anonymous_name.as_str()),
            outbound_buffer: config.outbound_buffer,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    /// Registers `handle` in `room` and tells the room its new size. A handle
    /// moved out of another room also updates the room it left.
    pub fn join(&self, room: &str, handle: Handle) -> usize {
        let conn = handle.id();
        let Joined { count, moved_from } = self.registry.join(room, handle);
        if let Some(departure) = &moved_from {
            self.announce_departure(conn, departure);
        }
        debug!(%conn, room, count, "joined room");

        self.record_connection(room);
        dispatch::publish_presence(&self.registry, room);
        count
    }

    /// Idempotent: only the first call for a joined handle does anything.
    pub fn leave(&self, handle: &Handle) -> Option<Departure> {
        let departure = self.registry.leave(handle)?;
        self.announce_departure(handle.id(), &departure);
        Some(departure)
    }

    fn announce_departure(&self, conn: HandleId, departure: &Departure) {
        match departure {
            Departure::Remaining { room, count } => {
                debug!(%conn, %room, count, "left room");
                dispatch::publish_presence(&self.registry, room);
            }
            Departure::TornDown { room } => {
                debug!(%conn, %room, "last member left, room torn down");
            }
        }
    }

    pub fn count_of(&self, room: &str) -> usize {
        self.registry.count_of(room)
    }

    pub fn broadcast(&self, room: &str, event: &Event) -> Delivery {
        dispatch::broadcast(&self.registry, room, event)
    }

    /// Persists the question, then announces it. Nothing is broadcast unless
    /// the write succeeded.
    pub async fn submit(&self, room: &str, ask: Ask) -> AppResult<Question> {
        if ask.text.trim().is_empty() {
            return Err(AppError::BadRequest("question text is required".to_owned()));
        }

        let name = ask
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&*self.anonymous_name);

        let question = self
            .store
            .create_question(room, &ask.text, name, ask.source_addr.as_deref())
            .await?;
        info!(room, question = %question.id, "question submitted");

        self.broadcast(room, &Event::new_question(&question));
        Ok(question)
    }

    pub async fn delete_question(&self, raw_id: &str) -> AppResult<Question> {
        let id = Uuid::parse_str(raw_id).map_err(|_| AppError::InvalidIdentifier(raw_id.to_owned()))?;

        let question = self
            .store
            .delete_question(id)
            .await?
            .ok_or(AppError::QuestionNotFound)?;
        info!(room = %question.room_code, question = %id, "question deleted");

        self.broadcast(&question.room_code, &Event::question_deleted(id));
        Ok(question)
    }

    /// Bumps the durable join counter off the caller's path; failures are only logged.
    fn record_connection(&self, room: &str) {
        let store = self.store.clone();
        let room = room.to_owned();
        tokio::spawn(async move {
            match store.increment_connections(&room).await {
                Ok(true) => {}
                Ok(false) => debug!(%room, "no stored session for joined room, counter unchanged"),
                Err(e) => warn!(%room, error = %e, "failed to record connection"),
            }
        });
    }
}
