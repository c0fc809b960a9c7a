use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{rooms::{Ask, Hub}, AppResult};

use super::{JsonBody, SourceAddr};

#[derive(Debug, Deserialize)]
pub(crate) struct AskBody {
    question: String,
    #[serde(default)]
    name: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn ask(
    State(hub): State<Hub>,
    Path(room_code): Path<String>,
    SourceAddr(source_addr): SourceAddr,
    JsonBody(AskBody { question, name }): JsonBody<AskBody>,
) -> AppResult<Json<Value>> {
    hub.submit(&room_code, Ask { text: question, name, source_addr }).await?;

    Ok(Json(json!({ "message": "Question submitted" })))
}
