//! Thin top-level facade re-exporting the pieces `mcloud-server` (and any
//! other embedder) needs to stand up the daemon: settings, the
//! ticket/event machinery, and the task engine with its handler table.
//! Each concern's actual implementation lives in its own crate; this one
//! only wires the public names together.

pub use mcloud_process::{ProcessEvent, ProcessRunner};
pub use mcloud_registry::{HandlerRegistry, TaskContext, TaskHandler, TicketRegistry};
pub use mcloud_service::Service;
pub use mcloud_shared::{
    ClientId, InMemoryCounter, InMemoryKvStore, KvStore, McloudError, McloudResult, Settings, TicketId,
};
pub use mcloud_store::{
    Application, ApplicationRecord, ApplicationStore, ContainerEngine, ContainerInspection, DeploymentController,
    DeploymentRecord, InMemoryDeploymentController, InMemoryEngine, Manifest, ManifestParser, ServiceDef, Wait,
    YamlManifestParser,
};
pub use mcloud_tasks::{register_handlers, TaskEngine};
pub use mcloud_transport::{Envelope, EventBus, MessageHandler, Transport};
