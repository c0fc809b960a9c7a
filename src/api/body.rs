use axum::extract::FromRequest;

use crate::AppError;

/// `axum::Json` whose rejection is an [`AppError::BadRequest`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub(crate) struct JsonBody<T>(pub T);
