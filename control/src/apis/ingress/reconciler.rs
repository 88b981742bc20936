//! Ingress reconciler
//!
//! Watches Ingresses, Secrets, Services and TLSCertificateDelegations, and
//! rebuilds the DAG from a fresh snapshot whenever any of them change. The
//! first build waits until every watch has completed its initial list.
//!
//! Rebuilds are debounced: a burst of events produces one rebuild once the
//! cluster has been quiet for `debounce`. Steady churn cannot postpone a
//! rebuild for longer than `max_wait` after the first unbuilt change.

use super::stores::{ResourceKind, ResourceStores};
use crate::apis::delegation::TLSCertificateDelegation;
use crate::apis::metrics::record_dag_build;
use crate::config::ControllerConfig;
use crate::dag::{BuildOutcome, Builder};
use crate::error::SiltaError;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::{api::Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Something changed for one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WatchSignal {
    kind: ResourceKind,
    /// The watch finished its initial list
    synced: bool,
}

type SignalStream = BoxStream<'static, Result<WatchSignal, watcher::Error>>;

/// Ingress reconciler
pub struct IngressReconciler {
    client: Client,
    config: ControllerConfig,
    builder: Builder,
    publisher: watch::Sender<Arc<BuildOutcome>>,
}

impl IngressReconciler {
    pub fn new(
        client: Client,
        config: ControllerConfig,
        publisher: watch::Sender<Arc<BuildOutcome>>,
    ) -> Self {
        Self {
            client,
            config,
            builder: Builder::default(),
            publisher,
        }
    }

    /// Reconciler using the in-cluster or kubeconfig client
    pub async fn try_default(
        config: ControllerConfig,
        publisher: watch::Sender<Arc<BuildOutcome>>,
    ) -> Result<Self, SiltaError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, config, publisher))
    }

    /// Watch cluster state and publish a new DAG after every change.
    ///
    /// Runs until the watch streams end.
    pub async fn run(self) -> Result<(), SiltaError> {
        let (ingresses, ingress_signals) =
            reflect::<Ingress>(self.client.clone(), ResourceKind::Ingress);
        let (secrets, secret_signals) =
            reflect::<Secret>(self.client.clone(), ResourceKind::Secret);
        let (services, service_signals) =
            reflect::<Service>(self.client.clone(), ResourceKind::Service);
        let (delegations, delegation_signals) = reflect::<TLSCertificateDelegation>(
            self.client.clone(),
            ResourceKind::TLSCertificateDelegation,
        );

        let stores = ResourceStores {
            ingresses,
            secrets,
            services,
            delegations,
        };
        let signals = stream::select_all([
            ingress_signals,
            secret_signals,
            service_signals,
            delegation_signals,
        ]);

        info!(
            controller = %self.config.controller_name,
            ingress_class = ?self.config.ingress_class_name,
            "Starting Ingress reconciler"
        );

        debounce_rebuilds(
            signals,
            self.config.rebuild.debounce(),
            self.config.rebuild.max_wait(),
            || self.rebuild(&stores),
        )
        .await;

        warn!("watch streams ended");
        Ok(())
    }

    fn rebuild(&self, stores: &ResourceStores) {
        let start = Instant::now();
        let snapshot = stores.snapshot(self.config.ingress_class_name.clone());
        let outcome = self.builder.run(&snapshot);
        let elapsed = start.elapsed();

        record_dag_build(&outcome, elapsed.as_secs_f64());
        info!(
            virtual_hosts = outcome.dag.virtual_hosts.len(),
            secure_virtual_hosts = outcome.dag.secure_virtual_hosts.len(),
            clusters = outcome.dag.clusters().len(),
            diagnostics = outcome.diagnostics.len(),
            duration_ms = elapsed.as_millis() as u64,
            "DAG rebuilt"
        );

        self.publisher.send_replace(Arc::new(outcome));
    }
}

/// Call `rebuild` as change signals arrive, until `signals` ends.
///
/// Nothing is built until every [`ResourceKind`] has reported its initial
/// sync. After that a pending change is built at the earlier of
/// `last_event + debounce` and `first_dirty + max_wait`.
async fn debounce_rebuilds<S, E, F>(
    mut signals: S,
    debounce: Duration,
    max_wait: Duration,
    mut rebuild: F,
) where
    S: Stream<Item = Result<WatchSignal, E>> + Unpin,
    E: Display,
    F: FnMut(),
{
    let mut synced: BTreeSet<ResourceKind> = BTreeSet::new();
    let mut first_dirty: Option<Instant> = None;
    let mut last_event = Instant::now();

    loop {
        let ready = synced.len() == ResourceKind::ALL.len();
        let next = match first_dirty {
            Some(first) if ready => {
                let deadline = (last_event + debounce).min(first + max_wait);
                tokio::select! {
                    _ = time::sleep_until(deadline) => {
                        rebuild();
                        first_dirty = None;
                        continue;
                    }
                    next = signals.next() => next,
                }
            }
            _ => signals.next().await,
        };

        match next {
            Some(Ok(signal)) => {
                if signal.synced && synced.insert(signal.kind) {
                    info!(kind = %signal.kind, "initial sync complete");
                }
                last_event = Instant::now();
                first_dirty.get_or_insert(last_event);
            }
            Some(Err(e)) => {
                warn!(error = %e, "watch error");
            }
            None => break,
        }
    }
}

/// Start a cluster-wide reflector for `K`, returning its store and a stream
/// of change signals
fn reflect<K>(client: Client, kind: ResourceKind) -> (Store<K>, SignalStream)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let api: Api<K> = Api::all(client);
    let (store, writer) = reflector::store::<K>();

    let signals = reflector::reflector(
        writer,
        watcher::watcher(api, WatcherConfig::default()).default_backoff(),
    )
    .map(move |event| {
        event.map(|event| {
            let synced = matches!(event, watcher::Event::InitDone);
            if synced {
                debug!(kind = %kind, "watch initialized");
            }
            WatchSignal { kind, synced }
        })
    })
    .boxed();

    (store, signals)
}
