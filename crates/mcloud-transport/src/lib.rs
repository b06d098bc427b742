//! Event bus and websocket wire transport.

pub mod envelope;
pub mod event_bus;
pub mod transport;

pub use envelope::Envelope;
pub use event_bus::{EventBus, Payload};
pub use transport::{router, serve, ClientRegistry, MessageHandler, Transport};
