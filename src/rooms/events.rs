//! Wire frames of the room socket.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Question;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Join { room: String },
    /// Any other `type`, kept so newer clients don't get disconnected.
    #[serde(other)]
    Unknown,
}

impl ControlFrame {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NewQuestion { payload: NewQuestion },
    QuestionDeleted { payload: QuestionDeleted },
    ClientCountUpdate { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewQuestion {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub text: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDeleted {
    pub question_id: Uuid,
}

impl Event {
    /// Carries only what clients may see; the submitter address stays behind.
    pub fn new_question(question: &Question) -> Self {
        Event::NewQuestion {
            payload: NewQuestion {
                id: question.id,
                text: question.text.clone(),
                name: question.name.clone(),
            },
        }
    }

    pub fn question_deleted(question_id: Uuid) -> Self {
        Event::QuestionDeleted { payload: QuestionDeleted { question_id } }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::NewQuestion { .. } => "new_question",
            Event::QuestionDeleted { .. } => "question_deleted",
            Event::ClientCountUpdate { .. } => "client_count_update",
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<Utf8Bytes> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}
