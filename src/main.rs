use anyhow::Context;
use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sharded_store::balancer::{self, LoadBalancer};
use sharded_store::config::{BalancerArgs, Cli, CommonArgs, LogFormat, ManagerArgs, ReplicaArgs, Role};
use sharded_store::manager::{self, HttpManagerClient, ProcessProvisioner, ShardManager};
use sharded_store::net::{AddressBook, HttpTransport};
use sharded_store::replica::{self, HttpReplicaClient, ReplicaNode};
use sharded_store::store::MemoryTableStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.common);

    let (shutdown_tx, shutdown) = watch::channel(false);
    let common = cli.common.clone();

    let app = match cli.role {
        Role::Balancer(args) => balancer_app(&common, args, shutdown.clone()),
        Role::Manager(args) => manager_app(&common, args, shutdown.clone())?,
        Role::Replica(args) => replica_app(&common, args, shutdown.clone()),
    };

    let listener = tokio::net::TcpListener::bind(common.bind)
        .await
        .with_context(|| format!("failed to bind {}", common.bind))?;
    tracing::info!("Listening on {}", common.bind);

    axum::serve(listener, app.layer(TraceLayer::new_for_http()))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            tracing::info!("Shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing(common: &CommonArgs) {
    let filter = EnvFilter::try_new(&common.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    match common.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn transport(common: &CommonArgs) -> HttpTransport {
    let addresses = Arc::new(AddressBook::new(&common.peer_url_template));
    HttpTransport::new(addresses, common.request_timeout())
}

fn balancer_app(common: &CommonArgs, args: BalancerArgs, shutdown: watch::Receiver<bool>) -> Router {
    let http = transport(common);
    let manager = Arc::new(HttpManagerClient::new(http.clone(), &args.manager_url));
    let replicas = Arc::new(HttpReplicaClient::new(http.clone()));

    let lb = LoadBalancer::new(manager, replicas)
        .with_addresses(http.addresses().clone())
        .with_retry(common.retry_policy())
        .with_shutdown(shutdown);

    tracing::info!("Load balancer using shard manager at {}", args.manager_url);
    balancer::router(Arc::new(lb))
}

fn manager_app(
    common: &CommonArgs,
    args: ManagerArgs,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Router> {
    let http = transport(common);
    let replicas = Arc::new(HttpReplicaClient::new(http.clone()));

    let binary = match args.replica_bin.clone() {
        Some(path) => path,
        None => std::env::current_exe().context("cannot locate replica binary")?,
    };
    let provisioner = Arc::new(ProcessProvisioner::new(
        binary,
        &args.replica_host,
        args.data_root.clone(),
        args.base_port,
    ));

    let manager = Arc::new(
        ShardManager::new(replicas, provisioner)
            .with_addresses(http.addresses().clone())
            .with_retry(common.retry_policy())
            .with_shutdown(shutdown),
    );

    let interval = args.heartbeat_interval();
    tracing::info!("Shard manager heartbeat every {:?}", interval);
    tokio::spawn(manager.clone().run_heartbeat(interval));

    Ok(manager::router(manager))
}

fn replica_app(common: &CommonArgs, args: ReplicaArgs, shutdown: watch::Receiver<bool>) -> Router {
    let http = transport(common);
    let peers = Arc::new(HttpReplicaClient::new(http.clone()));

    let mut node = ReplicaNode::new(&args.name, Arc::new(MemoryTableStore::new()), peers)
        .with_addresses(http.addresses().clone())
        .with_retry(common.retry_policy())
        .with_shutdown(shutdown);
    match &args.data_dir {
        Some(dir) => {
            tracing::info!("Replica {} logging to {}", args.name, dir.display());
            node = node.with_data_dir(dir);
        }
        None => tracing::info!("Replica {} keeping logs in memory", args.name),
    }

    replica::router(Arc::new(node))
}
