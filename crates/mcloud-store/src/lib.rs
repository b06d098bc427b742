//! Application records, manifest parsing, and the container-engine /
//! deployment collaborator traits the task engine drives.

pub mod application;
pub mod deployment;
pub mod engine;
pub mod manifest;

pub use application::{Application, ApplicationRecord, ApplicationStore};
pub use deployment::{DeploymentController, DeploymentRecord, InMemoryDeploymentController};
pub use engine::{ContainerEngine, ContainerInspection, InMemoryEngine};
pub use manifest::{Manifest, ManifestParser, ServiceDef, Wait, YamlManifestParser};
