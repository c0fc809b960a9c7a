//! Admin gate. Handlers only ask "is this caller an admin?" through [`Admin`].

mod login;
mod logout;

use anyhow::anyhow;
use axum::{extract::FromRequestParts, http::request::Parts, routing::post, Router};
use tower_sessions::Session;

use crate::{session::IS_ADMIN, AppError, AppState};

/// Extracting this succeeds only for sessions that passed the admin login.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(anyhow!(msg)))?;

        if session.get::<bool>(IS_ADMIN).await?.unwrap_or(false) {
            Ok(Admin)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/login", post(login::login))
        .route("/admin/logout", post(logout::logout))
}
