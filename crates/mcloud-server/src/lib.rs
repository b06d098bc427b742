//! Bootstraps the daemon: builds the shared collaborators (store, engine,
//! deployments, manifest parser), registers every task handler, and starts
//! the websocket transport. Kept as a library so both the production
//! binary and integration tests can stand up the same wiring.

use std::net::SocketAddr;
use std::sync::Arc;

use mcloud_core::{
    register_handlers, ApplicationStore, HandlerRegistry, InMemoryDeploymentController, InMemoryEngine,
    InMemoryKvStore, KvStore, Settings, TaskEngine, TicketRegistry, Transport, YamlManifestParser,
};
use mcloud_transport::EventBus;

/// Everything a running daemon owns. Holding this alive keeps the
/// transport's listener task alive; dropping it does not itself stop the
/// listener (see [`ServerHandle::stop`] for a graceful shutdown).
pub struct ServerHandle {
    pub settings: Settings,
    pub transport: Arc<Transport>,
    pub registry: Arc<TicketRegistry>,
    listener: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Builds every collaborator with the in-memory reference
    /// implementations of the container engine, deployment controller,
    /// and key/value store, registers all task handlers, and starts
    /// serving the websocket transport on `settings.bind_port`.
    ///
    /// The in-memory collaborators are reference implementations meant
    /// for local development and the test suite; a production deployment
    /// swaps in real `ContainerEngine`/`DeploymentController`/`KvStore`
    /// implementations without touching this wiring.
    pub async fn bootstrap(settings: Settings) -> std::io::Result<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let events = Arc::new(EventBus::new());
        let parser = Arc::new(YamlManifestParser);
        let engine = Arc::new(InMemoryEngine::new());
        let deployments = Arc::new(InMemoryDeploymentController::new());

        let apps = Arc::new(ApplicationStore::new(
            Arc::clone(&kv),
            parser.clone(),
            engine.clone(),
            settings.dns_search_suffix.clone(),
        ));

        let task_engine = Arc::new(TaskEngine::new(
            Arc::clone(&apps),
            Arc::clone(&kv),
            parser,
            engine,
            deployments,
            settings.clone(),
        ));

        let mut handlers = HandlerRegistry::new();
        register_handlers(&mut handlers, task_engine);

        let registry = Arc::new(TicketRegistry::new(Arc::new(handlers), events, kv));
        let transport = Arc::new(Transport::new());

        let addr: SocketAddr = ([0, 0, 0, 0], settings.bind_port).into();
        let serve_transport = Arc::clone(&transport);
        let serve_registry: Arc<TicketRegistry> = Arc::clone(&registry);
        let listener = tokio::spawn(async move {
            mcloud_transport::serve(addr, serve_transport, serve_registry).await
        });

        Ok(Self { settings, transport, registry, listener })
    }

    /// Aborts the listener task. The transport itself has no separate
    /// drain phase: in-flight tickets are left to the registry's own
    /// disconnect-on-drop bookkeeping, matching the spec's "a restart
    /// cancels in-flight tickets" non-goal.
    pub async fn stop(self) {
        self.listener.abort();
        let _ = self.listener.await;
    }
}
