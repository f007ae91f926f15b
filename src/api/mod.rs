//! REST API module.
//!
//! Handlers run on behalf of the [`Session`](crate::auth::Session) attached by
//! the auth layer. Each one reads the snapshot once and answers with its
//! generation as `revisionId`, on success and on error alike.

mod cards;
mod config;
mod follows;

pub use cards::*;
pub use config::*;
pub use follows::*;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};

/// `{ "success": true, "data": ..., "revisionId": ... }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
    revision_id: i64,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Envelope a service result with the revision of the snapshot behind it.
pub fn respond<T: Serialize>(result: Result<T, AppError>, revision_id: i64) -> ApiResult<T> {
    result
        .map(|data| ApiResponse {
            success: true,
            data,
            revision_id,
        })
        .map_err(|error| AppErrorWithRevision { error, revision_id })
}
