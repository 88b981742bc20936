use anyhow::Result;
use control::apis::ingress::IngressReconciler;
use control::config::ControllerConfig;
use control::dag::BuildOutcome;
use control::server::DebugServer;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// SILTA Control Plane
///
/// Watches Ingress resources and keeps an up-to-date routing DAG.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (needed for Kubernetes TLS client)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok(); // Ignore error if already installed

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ControllerConfig::from_env()?;
    info!(
        controller = %config.controller_name,
        ingress_class = ?config.ingress_class_name,
        "SILTA control plane starting"
    );

    let (publisher, dag) = watch::channel(Arc::new(BuildOutcome::default()));
    let server = DebugServer::new(config.debug_bind_addr.clone(), dag);

    let reconciler = IngressReconciler::try_default(config, publisher).await?;

    tokio::select! {
        result = reconciler.run() => {
            if let Err(e) = result {
                error!("Ingress reconciler error: {}", e);
                return Err(e.into());
            }
        }
        result = server.serve() => {
            if let Err(e) = result {
                error!("Debug server error: {}", e);
                return Err(e.into());
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("SILTA control plane stopped");
    Ok(())
}
