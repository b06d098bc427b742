//! Shared ambient stack: errors, configuration, ids, and logging.

pub mod config;
pub mod error;
pub mod ids;
pub mod kv;
pub mod logging;

pub use config::Settings;
pub use error::{McloudError, McloudResult};
pub use ids::{ClientId, InMemoryCounter, TicketId};
pub use kv::{InMemoryKvStore, KvStore};
