use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{ClusterError, Result};

/// Starts and stops replica processes by server name.
#[async_trait]
pub trait Provisioner: Send + Sync + 'static {
    /// (Re)starts `name` from a clean slate and returns its base URL.
    async fn start(&self, name: &str) -> Result<String>;

    /// Stops `name`. Stopping an unknown server is not an error.
    async fn stop(&self, name: &str) -> Result<()>;
}

/// Runs each replica as a child process of the manager, on a port that stays
/// stable for a given name across restarts.
pub struct ProcessProvisioner {
    binary: PathBuf,
    host: String,
    data_root: PathBuf,
    next_port: AtomicU16,
    ports: DashMap<String, u16>,
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessProvisioner {
    pub fn new(binary: PathBuf, host: &str, data_root: PathBuf, base_port: u16) -> Self {
        Self {
            binary,
            host: host.to_string(),
            data_root,
            next_port: AtomicU16::new(base_port),
            ports: DashMap::new(),
            children: Mutex::new(HashMap::new()),
        }
    }

    fn port_for(&self, name: &str) -> u16 {
        *self
            .ports
            .entry(name.to_string())
            .or_insert_with(|| self.next_port.fetch_add(1, Ordering::SeqCst))
    }

    fn provision_error(name: &str, reason: impl ToString) -> ClusterError {
        ClusterError::Provision {
            server: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Provisioner for ProcessProvisioner {
    async fn start(&self, name: &str) -> Result<String> {
        self.stop(name).await?;

        // A replacement never reuses the previous instance's log.
        let data_dir = self.data_root.join(name);
        match tokio::fs::remove_dir_all(&data_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Self::provision_error(name, e)),
        }
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| Self::provision_error(name, e))?;

        let port = self.port_for(name);
        let child = Command::new(&self.binary)
            .arg("replica")
            .arg("--bind")
            .arg(format!("{}:{}", self.host, port))
            .arg("--name")
            .arg(name)
            .arg("--data-dir")
            .arg(&data_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::provision_error(name, e))?;

        self.children.lock().await.insert(name.to_string(), child);
        let address = format!("http://{}:{}", self.host, port);
        tracing::info!("{} spawned at {}", name, address);
        Ok(address)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let Some(mut child) = self.children.lock().await.remove(name) else {
            return Ok(());
        };
        child
            .kill()
            .await
            .map_err(|e| Self::provision_error(name, e))?;
        tracing::info!("{} stopped", name);
        Ok(())
    }
}
