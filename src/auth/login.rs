use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{api::JsonBody, session::IS_ADMIN, AppError, AppResult, Config};

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    password: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(config): State<Arc<Config>>,
    session: Session,
    JsonBody(LoginBody { password }): JsonBody<LoginBody>,
) -> AppResult<Json<Value>> {
    let Some(expected) = config.admin_password.as_deref() else {
        warn!("admin login attempted but no admin password is configured");
        return Err(AppError::Unauthorized);
    };

    if password != expected {
        warn!("rejected admin login");
        return Err(AppError::Unauthorized);
    }

    session.cycle_id().await?;
    session.insert(IS_ADMIN, true).await?;
    info!("admin logged in");

    Ok(Json(json!({ "message": "Logged in" })))
}
