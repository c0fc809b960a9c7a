use axum::{debug_handler, extract::{Path, State}, Json};
use serde_json::{json, Value};

use crate::{auth::Admin, rooms::Hub, AppResult};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_question(
    _admin: Admin,
    State(hub): State<Hub>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    hub.delete_question(&id).await?;

    Ok(Json(json!({ "message": "Question deleted" })))
}
