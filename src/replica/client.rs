use async_trait::async_trait;
use reqwest::Method;

use super::protocol::*;
use crate::error::{ClusterError, Result};
use crate::net::{HEADER_COMMIT_INDEX, HEADER_REQUEST_COUNT, HttpTransport};
use crate::store::StudentRecord;
use crate::wal::Sequence;

/// Calls one replica by server name.
///
/// Used by primaries to fan out, by catching-up replicas to copy snapshots,
/// by the shard manager for health, election and configuration, and by the
/// load balancer for routing.
#[async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    async fn heartbeat(&self, server: &str) -> Result<()>;

    async fn configure(&self, server: &str, request: &ConfigRequest) -> Result<MessageResponse>;

    async fn add_shard(&self, server: &str, shard: &str) -> Result<MessageResponse>;

    async fn copy(&self, server: &str, shard: &str) -> Result<Snapshot>;

    async fn log_length(&self, server: &str, shard: &str) -> Result<usize>;

    async fn read(&self, server: &str, request: &ReadRequest) -> Result<Vec<StudentRecord>>;

    async fn mutate(
        &self,
        server: &str,
        mutation: &Mutation,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse>;

    async fn update_primaries(&self, server: &str, update: &PrimaryUpdate) -> Result<()>;

    async fn dump(&self, server: &str) -> Result<ShardDump>;
}

pub struct HttpReplicaClient {
    http: HttpTransport,
}

impl HttpReplicaClient {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn heartbeat(&self, server: &str) -> Result<()> {
        let request = self.http.request(Method::GET, server, ENDPOINT_HEARTBEAT);
        self.http.send(server, request).await.map(|_| ())
    }

    async fn configure(&self, server: &str, request: &ConfigRequest) -> Result<MessageResponse> {
        let request = self
            .http
            .request(Method::POST, server, ENDPOINT_CONFIG)
            .json(request);
        self.http.call(server, request).await
    }

    async fn add_shard(&self, server: &str, shard: &str) -> Result<MessageResponse> {
        let request = self
            .http
            .request(Method::POST, server, ENDPOINT_ADD_SHARD)
            .json(&ShardRequest {
                shard: shard.to_string(),
            });
        self.http.call(server, request).await
    }

    async fn copy(&self, server: &str, shard: &str) -> Result<Snapshot> {
        let request = self
            .http
            .request(Method::GET, server, ENDPOINT_COPY)
            .json(&ShardRequest {
                shard: shard.to_string(),
            });
        let response = self.http.send(server, request).await?;

        let commit_index = response
            .headers()
            .get(HEADER_COMMIT_INDEX)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .ok_or_else(|| ClusterError::Remote {
                server: server.to_string(),
                status: 502,
                message: "missing Commit-Index header".to_string(),
            })?;

        let mut snapshot: Snapshot = self.http.decode(server, response).await?;
        snapshot.commit_index = commit_index;
        Ok(snapshot)
    }

    async fn log_length(&self, server: &str, shard: &str) -> Result<usize> {
        let request = self
            .http
            .request(Method::POST, server, ENDPOINT_LENLOG)
            .json(&ShardRequest {
                shard: shard.to_string(),
            });
        let length: LogLength = self.http.call(server, request).await?;
        Ok(length.length)
    }

    async fn read(&self, server: &str, request: &ReadRequest) -> Result<Vec<StudentRecord>> {
        let request = self
            .http
            .request(Method::POST, server, ENDPOINT_READ)
            .json(request);
        let response: ReadResponse = self.http.call(server, request).await?;
        Ok(response.data)
    }

    async fn mutate(
        &self,
        server: &str,
        mutation: &Mutation,
        sequence: Option<Sequence>,
    ) -> Result<MessageResponse> {
        let body = mutation
            .body()
            .map_err(|e| ClusterError::invalid(format!("unencodable mutation: {}", e)))?;
        let mut request = self
            .http
            .request(mutation.method(), server, mutation.endpoint())
            .json(&body);
        if let Some(seq) = sequence {
            request = request.header(HEADER_REQUEST_COUNT, seq.to_string());
        }
        self.http.call(server, request).await
    }

    async fn update_primaries(&self, server: &str, update: &PrimaryUpdate) -> Result<()> {
        let request = self
            .http
            .request(Method::POST, server, ENDPOINT_UPDATE_PSINFO)
            .json(update);
        self.http.send(server, request).await.map(|_| ())
    }

    async fn dump(&self, server: &str) -> Result<ShardDump> {
        let request = self.http.request(Method::GET, server, ENDPOINT_GETALL);
        self.http.call(server, request).await
    }
}
