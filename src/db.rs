//! Durable record of rooms ("sessions") and their questions.

use anyhow::{anyhow, Context};
use rand::seq::IndexedRandom;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_ATTEMPTS: usize = 8;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    code TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    connection_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY NOT NULL,
    session_code TEXT NOT NULL REFERENCES sessions(code),
    text TEXT NOT NULL,
    name TEXT NOT NULL,
    source_addr TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS questions_by_session ON questions (session_code, created_at);
"#;

const ROOM_COLUMNS: &str = "code,name,connection_count,created_at";
const QUESTION_COLUMNS: &str = "id,session_code,text,name,source_addr,created_at";

type RoomRow = (String, String, i64, i64);
type QuestionRow = (String, String, String, String, Option<String>, i64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: String,
    pub name: String,
    /// Joins ever seen, rejoins included. Never decremented.
    pub connection_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "session")]
    pub room_code: String,
    pub text: String,
    pub name: String,
    /// Kept for abuse tracing only.
    #[serde(skip_serializing)]
    pub source_addr: Option<String>,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .with_context(|| format!("connecting to {url}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("message store ready");
        Ok(store)
    }

    /// A private in-memory database. One pinned connection keeps it alive.
    pub async fn memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("creating schema")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create_room(&self, name: &str) -> AppResult<Room> {
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let code = generate_room_code();
            let created_at = now_millis();

            let res = sqlx::query("INSERT INTO sessions (code,name,connection_count,created_at) VALUES (?,?,0,?)")
                .bind(&code)
                .bind(name)
                .bind(created_at)
                .execute(&self.pool)
                .await;

            match res {
                Ok(_) => {
                    info!(room = %code, "created room");
                    return Ok(Room {
                        code,
                        name: name.to_owned(),
                        connection_count: 0,
                        created_at: from_millis(created_at),
                    });
                }
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    debug!(room = %code, "room code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow!("could not allocate a unique room code").into())
    }

    pub async fn find_room(&self, code: &str) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM sessions WHERE code=?"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(room_from_row))
    }

    pub async fn list_rooms(&self) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM sessions ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(room_from_row).collect())
    }

    /// Returns whether a room row was touched.
    pub async fn increment_connections(&self, code: &str) -> AppResult<bool> {
        let res = sqlx::query("UPDATE sessions SET connection_count = connection_count + 1 WHERE code=?")
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    /// Fails with [`AppError::RoomNotFound`] without writing anything if `room_code` is unknown.
    pub async fn create_question(
        &self,
        room_code: &str,
        text: &str,
        name: &str,
        source_addr: Option<&str>,
    ) -> AppResult<Question> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE code=?")
            .bind(room_code)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::RoomNotFound);
        }

        let id = Uuid::now_v7();
        let created_at = now_millis();
        sqlx::query("INSERT INTO questions (id,session_code,text,name,source_addr,created_at) VALUES (?,?,?,?,?,?)")
            .bind(id.to_string())
            .bind(room_code)
            .bind(text)
            .bind(name)
            .bind(source_addr)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Question {
            id,
            room_code: room_code.to_owned(),
            text: text.to_owned(),
            name: name.to_owned(),
            source_addr: source_addr.map(str::to_owned),
            created_at: from_millis(created_at),
        })
    }

    pub async fn find_question(&self, id: Uuid) -> AppResult<Option<Question>> {
        let row: Option<QuestionRow> = sqlx::query_as(&format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(question_from_row).transpose()
    }

    pub async fn delete_question(&self, id: Uuid) -> AppResult<Option<Question>> {
        let row: Option<QuestionRow> = sqlx::query_as(&format!("DELETE FROM questions WHERE id=? RETURNING {QUESTION_COLUMNS}"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(question_from_row).transpose()
    }

    /// Newest first.
    pub async fn questions_for_room(&self, room_code: &str) -> AppResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE session_code=? ORDER BY created_at DESC, id DESC"
        ))
            .bind(room_code)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(question_from_row).collect()
    }

    /// Oldest first, both bounds inclusive.
    pub async fn questions_between(
        &self,
        room_code: &str,
        from: Option<OffsetDateTime>,
        to: Option<OffsetDateTime>,
    ) -> AppResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions \
             WHERE session_code=? AND created_at >= ? AND created_at <= ? \
             ORDER BY created_at ASC, id ASC"
        ))
            .bind(room_code)
            .bind(from.map_or(i64::MIN, to_millis))
            .bind(to.map_or(i64::MAX, to_millis))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(question_from_row).collect()
    }
}

pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .filter_map(|_| ROOM_CODE_CHARSET.choose(&mut rng))
        .map(|&b| char::from(b))
        .collect()
}

fn room_from_row((code, name, connection_count, created_at): RoomRow) -> Room {
    Room {
        code,
        name,
        connection_count,
        created_at: from_millis(created_at),
    }
}

fn question_from_row((id, room_code, text, name, source_addr, created_at): QuestionRow) -> AppResult<Question> {
    Ok(Question {
        id: Uuid::parse_str(&id).with_context(|| format!("corrupt question id {id:?}"))?,
        room_code,
        text,
        name,
        source_addr,
        created_at: from_millis(created_at),
    })
}

fn now_millis() -> i64 {
    to_millis(OffsetDateTime::now_utc())
}

fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
