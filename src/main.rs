//! Dynamically-configurable HTTP reverse proxy.
//!
//! Routing configuration lives in etcd; this process snapshots it at
//! boot, builds the routing tree, then applies store deltas to the
//! tree live, without restarts and without dropping in-flight requests.

mod health;
mod model;
mod proxy;
mod reconcile;
mod routing;
mod store;
mod watch;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use pingora_proxy::http_proxy_service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::health::HealthState;
use crate::proxy::GatewayProxy;
use crate::reconcile::Reconciler;
use crate::routing::HostRouter;
use crate::store::{ConfigStore, EtcdStore};

/// Process configuration, all overridable from the environment.
struct Settings {
    listen: String,
    health_listen: String,
    etcd_endpoints: Vec<String>,
    etcd_root: String,
}

impl Settings {
    fn from_env() -> Self {
        Self {
            listen: env_or("FLUXGATE_LISTEN", "0.0.0.0:8080"),
            health_listen: env_or("FLUXGATE_HEALTH_LISTEN", "127.0.0.1:8081"),
            etcd_endpoints: split_endpoints(&env_or(
                "FLUXGATE_ETCD_ENDPOINTS",
                "http://127.0.0.1:2379",
            )),
            etcd_root: env_or("FLUXGATE_ETCD_ROOT", "/fluxgate"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("fluxgate starting");

    let settings = Settings::from_env();
    let health_addr: SocketAddr = settings
        .health_listen
        .parse()
        .context("invalid health listen address")?;

    // Shared routing tree: the reconciler writes, request handlers read.
    let tree = Arc::new(HostRouter::new());
    let health = Arc::new(HealthState::new(Arc::clone(&tree)));

    let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    let store: Arc<dyn ConfigStore> = Arc::new(
        rt.block_on(EtcdStore::connect(&settings.etcd_endpoints, &settings.etcd_root))
            .context("failed to connect to config store")?,
    );

    // Boot-time snapshot failure is fatal; a supervisor restart retries
    // against a fresh snapshot.
    let mut reconciler = Reconciler::new(Arc::clone(&tree));
    rt.block_on(watch::bootstrap(store.as_ref(), &mut reconciler))
        .context("initial store snapshot failed")?;
    health.mark_ready();

    // Control plane runs on its own thread; Pingora owns the main one.
    {
        let health = Arc::clone(&health);
        std::thread::spawn(move || {
            rt.block_on(async move {
                tokio::spawn(async move {
                    if let Err(e) = health::start_health_server(health_addr, health).await {
                        tracing::error!(error = %e, "health server failed");
                    }
                });

                if let Err(error) = watch::stream_changes(store, reconciler).await {
                    tracing::error!(%error, "change stream failed, shutting down");
                }
                // Store loss is unrecoverable in-process: restart and
                // rebuild from a fresh snapshot.
                std::process::exit(1);
            });
        });
    }

    // Create Pingora server
    let opt = Opt::default();
    let mut server = Server::new(Some(opt))?;
    server.bootstrap();

    let gateway = GatewayProxy::new(tree);
    let mut proxy_service = http_proxy_service(&server.configuration, gateway);
    proxy_service.add_tcp(&settings.listen);

    tracing::info!(addr = %settings.listen, "HTTP proxy listening");

    server.add_service(proxy_service);
    server.run_forever();
}
