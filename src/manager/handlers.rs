use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::protocol::*;
use super::service::ShardManager;
use crate::error::{json_reply, malformed_json};

pub async fn handle_init(
    Extension(manager): Extension<Arc<ShardManager>>,
    payload: Result<Json<InitRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(manager.init(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_add(
    Extension(manager): Extension<Arc<ShardManager>>,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(manager.add(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_remove(
    Extension(manager): Extension<Arc<ShardManager>>,
    payload: Result<Json<RemoveRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(manager.remove(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_psinfo(Extension(manager): Extension<Arc<ShardManager>>) -> Response {
    Json(manager.primary_map().await).into_response()
}
