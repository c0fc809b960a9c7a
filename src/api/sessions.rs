use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    auth::Admin,
    db::{Question, Room, Store},
    rooms::Hub,
    AppError, AppResult,
};

use super::JsonBody;

#[derive(Debug, Deserialize)]
pub(crate) struct NewSessionBody {
    name: String,
}

#[derive(Serialize)]
pub(crate) struct SessionView {
    session: Room,
    questions: Vec<Question>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn session(
    State(store): State<Store>,
    Path(room_code): Path<String>,
) -> AppResult<Json<SessionView>> {
    let session = store.find_room(&room_code).await?.ok_or(AppError::RoomNotFound)?;
    let questions = store.questions_for_room(&room_code).await?;

    Ok(Json(SessionView { session, questions }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn presence(State(hub): State<Hub>, Path(room_code): Path<String>) -> Json<Value> {
    Json(json!({ "count": hub.count_of(&room_code) }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_session(
    _admin: Admin,
    State(store): State<Store>,
    JsonBody(NewSessionBody { name }): JsonBody<NewSessionBody>,
) -> AppResult<(StatusCode, Json<Room>)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("session name is required".to_owned()));
    }

    let room = store.create_room(name).await?;
    Ok((StatusCode::CREATED, Json(room)))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_sessions(_admin: Admin, State(store): State<Store>) -> AppResult<Json<Vec<Room>>> {
    Ok(Json(store.list_rooms().await?))
}
