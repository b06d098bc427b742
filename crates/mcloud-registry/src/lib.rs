//! Ticket minting, task dispatch, and the handler table tasks register
//! themselves into.

pub mod handler;
pub mod registry;
pub mod ticket;

pub use handler::{HandlerRegistry, TaskContext, TaskHandler};
pub use registry::{wait_for_result, TicketRegistry};
pub use ticket::{Ticket, TicketState};
