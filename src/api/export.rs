use std::fmt::Write;

use anyhow::Context;
use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{auth::Admin, db::{Question, Store}, AppError, AppResult};

const CSV_HEADER: &str = "id,created_at,name,question,source_addr\n";

#[derive(Debug, Deserialize)]
pub(crate) struct ExportQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    to: Option<OffsetDateTime>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn export(
    _admin: Admin,
    State(store): State<Store>,
    Path(room_code): Path<String>,
    Query(ExportQuery { from, to }): Query<ExportQuery>,
) -> AppResult<Response> {
    store.find_room(&room_code).await?.ok_or(AppError::RoomNotFound)?;
    let questions = store.questions_between(&room_code, from, to).await?;

    let body = to_csv(&questions)?;
    let disposition = format!("attachment; filename=\"{room_code}-questions.csv\"");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

fn to_csv(questions: &[Question]) -> anyhow::Result<String> {
    let mut out = String::from(CSV_HEADER);
    for q in questions {
        let created_at = q.created_at.format(&Rfc3339).context("formatting timestamp")?;
        writeln!(
            out,
            "{},{},{},{},{}",
            q.id,
            created_at,
            csv_field(&q.name),
            csv_field(&q.text),
            csv_field(q.source_addr.as_deref().unwrap_or_default()),
        )?;
    }
    Ok(out)
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn one_row_per_question() {
        let q = Question {
            id: Uuid::now_v7(),
            room_code: "ABC123".into(),
            text: "Why, though?".into(),
            name: "Alice".into(),
            source_addr: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let csv = to_csv(&[q.clone()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER.trim_end()));
        assert_eq!(lines.next(), Some(format!("{},1970-01-01T00:00:00Z,Alice,\"Why, though?\",", q.id).as_str()));
        assert_eq!(lines.next(), None);
    }
}
