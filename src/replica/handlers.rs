use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::node::ReplicaNode;
use super::protocol::*;
use crate::error::{json_reply, malformed_json};
use crate::net::{HEADER_COMMIT_INDEX, sequence_header};

pub async fn handle_heartbeat(Extension(node): Extension<Arc<ReplicaNode>>) -> Response {
    match node.heartbeat() {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn handle_config(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    json_reply(node.configure(req).await)
}

pub async fn handle_add_shard(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<ShardRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    json_reply(node.add_shard(&req.shard).await)
}

pub async fn handle_copy(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<ShardRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };

    match node.snapshot(&req.shard).await {
        Ok(snapshot) => {
            let mut headers = HeaderMap::new();
            headers.insert(HEADER_COMMIT_INDEX, HeaderValue::from(snapshot.commit_index));
            (StatusCode::OK, headers, Json(snapshot)).into_response()
        }
        Err(e) => {
            tracing::error!("Copy of shard {} failed: {}", req.shard, e);
            e.into_response()
        }
    }
}

pub async fn handle_lenlog(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<ShardRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    json_reply(
        node.log_length(&req.shard)
            .await
            .map(|length| LogLength { length }),
    )
}

pub async fn handle_read(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<ReadRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    json_reply(node.read(&req).await.map(|data| ReadResponse {
        data,
        status: "success".to_string(),
    }))
}

async fn mutate(node: &ReplicaNode, headers: &HeaderMap, mutation: Mutation) -> Response {
    let sequence = match sequence_header(headers) {
        Ok(sequence) => sequence,
        Err(e) => return e.into_response(),
    };
    json_reply(node.mutate(mutation, sequence).await)
}

pub async fn handle_write(
    Extension(node): Extension<Arc<ReplicaNode>>,
    headers: HeaderMap,
    payload: Result<Json<WriteRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => mutate(&node, &headers, Mutation::Write(req)).await,
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_update(
    Extension(node): Extension<Arc<ReplicaNode>>,
    headers: HeaderMap,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => mutate(&node, &headers, Mutation::Update(req)).await,
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_delete(
    Extension(node): Extension<Arc<ReplicaNode>>,
    headers: HeaderMap,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => mutate(&node, &headers, Mutation::Delete(req)).await,
        Err(rejection) => malformed_json(rejection),
    }
}

pub async fn handle_update_psinfo(
    Extension(node): Extension<Arc<ReplicaNode>>,
    payload: Result<Json<PrimaryUpdate>, JsonRejection>,
) -> Response {
    let Json(update) = match payload {
        Ok(json) => json,
        Err(rejection) => return malformed_json(rejection),
    };
    node.update_primaries(update).await;
    (
        StatusCode::OK,
        Json(MessageResponse::success("Updated shard server map")),
    )
        .into_response()
}

pub async fn handle_getall(Extension(node): Extension<Arc<ReplicaNode>>) -> Response {
    json_reply(node.dump_all().await)
}
