//! The task handler contract each `mcloud-tasks` `task_*` function
//! implements, plus the name-keyed table the registry dispatches through.

use std::collections::HashMap;

use async_trait::async_trait;
use mcloud_shared::{ClientId, McloudResult, TicketId};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::ticket::progress_channel;
use mcloud_transport::EventBus;

/// Everything a running task needs besides its own arguments: who asked,
/// under which ticket, and the event bus to stream progress through.
#[derive(Clone)]
pub struct TaskContext {
    pub ticket_id: TicketId,
    pub client: ClientId,
    pub events: Arc<EventBus>,
}

impl TaskContext {
    pub fn new(ticket_id: TicketId, client: ClientId, events: Arc<EventBus>) -> Self {
        Self { ticket_id, client, events }
    }

    /// Equivalent of the original `TaskService.task_log`: fire a progress
    /// event scoped to this ticket.
    pub fn log(&self, message: impl Into<Value>) {
        self.events.fire(&progress_channel(self.ticket_id), message.into());
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn call(&self, ctx: &TaskContext, args: &[Value], kwargs: &Map<String, Value>) -> McloudResult<Value>;
}

#[async_trait]
impl<F, Fut> TaskHandler for F
where
    F: Fn(TaskContext, Vec<Value>, Map<String, Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McloudResult<Value>> + Send,
{
    async fn call(&self, ctx: &TaskContext, args: &[Value], kwargs: &Map<String, Value>) -> McloudResult<Value> {
        (self)(ctx.clone(), args.to_vec(), kwargs.clone()).await
    }
}

/// Name-keyed table of task handlers, populated once at startup by
/// `mcloud-tasks` via explicit `register` calls (no reflection, matching
/// the original's plain `self.tasks[name] = fn` dictionary).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_closure_handler_runs() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "echo",
            Arc::new(|_ctx: TaskContext, args: Vec<Value>, _kwargs: Map<String, Value>| async move {
                Ok(Value::Array(args))
            }),
        );
        assert!(registry.contains("echo"));
        let handler = registry.get("echo").unwrap();
        let ctx = TaskContext::new(mcloud_shared::TicketId(1), ClientId::new(), Arc::new(EventBus::new()));
        let result = handler.call(&ctx, &[Value::from(1)], &Map::new()).await.unwrap();
        assert_eq!(result, Value::Array(vec![Value::from(1)]));
    }

    #[test]
    fn unknown_handler_is_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get("nope").is_none());
    }
}
