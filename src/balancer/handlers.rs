use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::protocol::*;
use super::service::LoadBalancer;
use crate::error::{json_reply, malformed_json};
use crate::manager::protocol::{AddRequest, InitRequest, RemoveRequest};
use crate::net::sequence_header;

pub async fn handle_init(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    payload: Result<Json<InitRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(lb.init(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_status(Extension(lb): Extension<Arc<LoadBalancer>>) -> Response {
    Json(lb.status().await).into_response()
}

pub async fn handle_add(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(lb.add(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_remove(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    payload: Result<Json<RemoveRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => json_reply(lb.remove(req).await),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_read(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    payload: Result<Json<ReadQuery>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => Json(lb.read(req.range).await).into_response(),
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_write(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    headers: HeaderMap,
    payload: Result<Json<WriteQuery>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    match sequence_header(&headers) {
        Ok(sequence) => json_reply(lb.write(req.data, sequence).await),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_update(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    headers: HeaderMap,
    payload: Result<Json<UpdateQuery>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    match sequence_header(&headers) {
        Ok(sequence) => json_reply(lb.update(req, sequence).await),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_delete(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    headers: HeaderMap,
    payload: Result<Json<DeleteQuery>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    match sequence_header(&headers) {
        Ok(sequence) => json_reply(lb.delete(req, sequence).await),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_read_server(
    Extension(lb): Extension<Arc<LoadBalancer>>,
    Path(server): Path<String>,
) -> Response {
    json_reply(lb.dump(&server).await)
}
