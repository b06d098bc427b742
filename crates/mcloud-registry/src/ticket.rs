//! A ticket is the unit of client-visible progress: one is minted per
//! accepted task request, and every `task.progress`/`task.success`/
//! `task.failure` event fired for it is addressed by its id.

use mcloud_shared::{ClientId, TicketId};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    Running,
    Succeeded,
    Failed,
    /// The owning client disconnected before the task settled.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: TicketId,
    pub client: ClientId,
    pub task: String,
    pub state: TicketState,
}

impl Ticket {
    pub fn new(id: TicketId, client: ClientId, task: impl Into<String>) -> Self {
        Self {
            id,
            client,
            task: task.into(),
            state: TicketState::Running,
        }
    }
}

pub fn progress_channel(id: TicketId) -> String {
    format!("task.progress.{id}")
}

pub fn success_channel(id: TicketId) -> String {
    format!("task.success.{id}")
}

pub fn failure_channel(id: TicketId) -> String {
    format!("task.failure.{id}")
}

pub fn success_payload(id: TicketId, result: Value) -> Value {
    let _ = id;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_embed_the_ticket_id() {
        assert_eq!(progress_channel(TicketId(7)), "task.progress.7");
        assert_eq!(success_channel(TicketId(7)), "task.success.7");
        assert_eq!(failure_channel(TicketId(7)), "task.failure.7");
    }

    #[test]
    fn new_ticket_starts_running() {
        let ticket = Ticket::new(TicketId(1), ClientId::new(), "ping");
        assert_eq!(ticket.state, TicketState::Running);
    }
}
