use async_trait::async_trait;
use reqwest::Method;

use super::protocol::*;
use crate::error::Result;
use crate::membership::PrimaryMap;
use crate::net::HttpTransport;

/// Name the shard manager is registered under in the balancer's address book.
pub const MANAGER_NAME: &str = "shard_manager";

/// The load balancer's view of the shard manager.
#[async_trait]
pub trait ManagerClient: Send + Sync + 'static {
    async fn init(&self, request: &InitRequest) -> Result<ManagerResponse>;

    async fn add(&self, request: &AddRequest) -> Result<ManagerResponse>;

    async fn remove(&self, request: &RemoveRequest) -> Result<ManagerResponse>;

    async fn primary_map(&self) -> Result<PrimaryMap>;
}

pub struct HttpManagerClient {
    http: HttpTransport,
}

impl HttpManagerClient {
    pub fn new(http: HttpTransport, manager_url: &str) -> Self {
        http.addresses().register(MANAGER_NAME, manager_url);
        Self { http }
    }
}

#[async_trait]
impl ManagerClient for HttpManagerClient {
    async fn init(&self, request: &InitRequest) -> Result<ManagerResponse> {
        let request = self
            .http
            .request(Method::POST, MANAGER_NAME, ENDPOINT_INIT)
            .json(request);
        self.http.call(MANAGER_NAME, request).await
    }

    async fn add(&self, request: &AddRequest) -> Result<ManagerResponse> {
        let request = self
            .http
            .request(Method::POST, MANAGER_NAME, ENDPOINT_ADD)
            .json(request);
        self.http.call(MANAGER_NAME, request).await
    }

    async fn remove(&self, request: &RemoveRequest) -> Result<ManagerResponse> {
        let request = self
            .http
            .request(Method::POST, MANAGER_NAME, ENDPOINT_RM)
            .json(request);
        self.http.call(MANAGER_NAME, request).await
    }

    async fn primary_map(&self) -> Result<PrimaryMap> {
        let request = self.http.request(Method::GET, MANAGER_NAME, ENDPOINT_PSINFO);
        self.http.call(MANAGER_NAME, request).await
    }
}
