//! Ticket minting and request dispatch: the Rust shape of the original
//! `ApiRpcServer`/`Server.on_message` pair, merged into one type because
//! nothing else in this codebase needs them split.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mcloud_shared::{ClientId, InMemoryCounter, KvStore, McloudError, McloudResult, TicketId};
use serde_json::{Map, Value};

use mcloud_transport::{Envelope, EventBus, MessageHandler, Transport};

use crate::handler::{HandlerRegistry, TaskContext};
use crate::ticket::{failure_channel, progress_channel, success_channel, Ticket, TicketState};

const TICKET_COUNTER_KEY: &str = "mcloud-ticket-id";

pub struct TicketRegistry {
    handlers: Arc<HandlerRegistry>,
    events: Arc<EventBus>,
    kv: Arc<dyn KvStore>,
    fallback_counter: InMemoryCounter,
    tickets: Arc<DashMap<TicketId, Ticket>>,
    client_tickets: DashMap<ClientId, Vec<TicketId>>,
}

impl TicketRegistry {
    pub fn new(handlers: Arc<HandlerRegistry>, events: Arc<EventBus>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            handlers,
            events,
            kv,
            fallback_counter: InMemoryCounter::new(),
            tickets: Arc::new(DashMap::new()),
            client_tickets: DashMap::new(),
        }
    }

    async fn next_ticket_id(&self) -> TicketId {
        match self.kv.incr(TICKET_COUNTER_KEY).await {
            Ok(n) => TicketId(n),
            Err(e) => {
                tracing::warn!(error = %e, "ticket counter store unavailable, falling back to in-memory counter");
                TicketId(self.fallback_counter.next())
            }
        }
    }

    pub fn ticket_state(&self, id: TicketId) -> Option<TicketState> {
        self.tickets.get(&id).map(|t| t.state)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Mint a ticket, register it against `client`, and run `task_name` in
    /// the background. Always returns a ticket id, even for an unknown
    /// task: the failure then surfaces asynchronously as a `task.failure`
    /// event, matching the original's ticket-first, validate-after order.
    pub async fn task_start(
        &self,
        client: ClientId,
        transport: Arc<Transport>,
        task_name: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> TicketId {
        let ticket_id = self.next_ticket_id().await;
        self.tickets.insert(ticket_id, Ticket::new(ticket_id, client, task_name.clone()));
        self.client_tickets.entry(client).or_default().push(ticket_id);

        // Progress is forwarded for the ticket's whole run, but must stop the
        // instant a terminal event fires: both the success and failure
        // closures below unsubscribe it, so no progress is ever delivered
        // after the client has already seen the task finish.
        let progress_events = Arc::clone(&self.events);
        let transport_progress = Arc::clone(&transport);
        let progress_sub_id = Arc::new(std::sync::Mutex::new(0u64));
        let progress_sub_id_for_handler = Arc::clone(&progress_sub_id);
        let sub = progress_events.on(progress_channel(ticket_id), move |_channel, data| {
            transport_progress.send_event(client, progress_channel(ticket_id), data.clone());
        });
        *progress_sub_id_for_handler.lock().unwrap() = sub;

        let success_events = Arc::clone(&self.events);
        let failure_events = Arc::clone(&self.events);
        let transport_success = Arc::clone(&transport);
        let transport_failure = Arc::clone(&transport);
        let tickets_success = Arc::clone(&self.tickets);
        let tickets_failure = Arc::clone(&self.tickets);
        let progress_sub_for_success = Arc::clone(&progress_sub_id);
        let progress_events_for_success = Arc::clone(&self.events);
        let progress_sub_for_failure = Arc::clone(&progress_sub_id);
        let progress_events_for_failure = Arc::clone(&self.events);
        success_events.once(success_channel(ticket_id), move |_channel, data| {
            tickets_success.remove(&ticket_id);
            progress_events_for_success.unsubscribe(*progress_sub_for_success.lock().unwrap());
            transport_success.send_event(client, success_channel(ticket_id), data.clone());
        });
        failure_events.once(failure_channel(ticket_id), move |_channel, data| {
            tickets_failure.remove(&ticket_id);
            progress_events_for_failure.unsubscribe(*progress_sub_for_failure.lock().unwrap());
            transport_failure.send_event(client, failure_channel(ticket_id), data.clone());
        });

        let handler = self.handlers.get(&task_name);
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            let ctx = TaskContext::new(ticket_id, client, Arc::clone(&events));
            let outcome = match handler {
                Some(handler) => handler.call(&ctx, &args, &kwargs).await,
                None => Err(McloudError::UnknownTask(task_name.clone())),
            };
            match outcome {
                Ok(result) => events.fire(&success_channel(ticket_id), result),
                Err(e) => events.fire(&failure_channel(ticket_id), Value::String(e.to_string())),
            }
        });

        ticket_id
    }

    /// Drop tracking for a disconnected client and mark its still-running
    /// tickets cancelled. The transport itself already no-ops sends to a
    /// client whose socket is gone; this keeps `ticket_state` honest for
    /// anyone still polling it directly.
    fn forget_client(&self, client: ClientId) {
        if let Some((_, ticket_ids)) = self.client_tickets.remove(&client) {
            for ticket_id in ticket_ids {
                if let Some(mut ticket) = self.tickets.get_mut(&ticket_id) {
                    if ticket.state == TicketState::Running {
                        ticket.state = TicketState::Cancelled;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MessageHandler for TicketRegistry {
    async fn on_message(&self, client: ClientId, envelope: Envelope, transport: Arc<Transport>) {
        let Envelope::Request { id, task, args, kwargs } = envelope else {
            tracing::warn!(%client, "ignoring non-request frame from client");
            return;
        };

        if task == "ping" {
            transport.send_response(client, id, true, Value::String("pong".into()));
            return;
        }

        if task == "task_start" {
            let mut args = args;
            if args.is_empty() {
                transport.send_response(client, id, false, Value::String("Unknown command".into()));
                return;
            }
            let task_name = match args.remove(0) {
                Value::String(s) => s,
                other => {
                    tracing::warn!(%client, ?other, "task_start's first arg was not a task name");
                    transport.send_response(client, id, false, Value::String("Unknown command".into()));
                    return;
                }
            };
            let ticket_id = self
                .task_start(client, Arc::clone(&transport), task_name, args, kwargs)
                .await;
            transport.send_response(client, id, true, Value::from(ticket_id.0));
            return;
        }

        transport.send_response(client, id, false, Value::String("Unknown command".into()));
    }

    async fn on_disconnect(&self, client: ClientId) {
        self.forget_client(client);
    }
}

pub async fn wait_for_result(
    events: &EventBus,
    ticket_id: TicketId,
    timeout_seconds: f64,
) -> McloudResult<Value> {
    events.wait_for_event(&success_channel(ticket_id), timeout_seconds).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcloud_shared::InMemoryKvStore;

    fn registry_with_echo() -> (Arc<TicketRegistry>, Arc<Transport>) {
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            "echo",
            Arc::new(|ctx: TaskContext, args: Vec<Value>, _kwargs: Map<String, Value>| async move {
                ctx.log("echoing");
                Ok(Value::Array(args))
            }),
        );
        let events = Arc::new(EventBus::new());
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let registry = Arc::new(TicketRegistry::new(Arc::new(handlers), Arc::clone(&events), kv));
        let transport = Arc::new(Transport::new());
        (registry, transport)
    }

    #[tokio::test]
    async fn task_start_mints_increasing_ticket_ids() {
        let (registry, transport) = registry_with_echo();
        let client = ClientId::new();
        let first = registry
            .task_start(client, Arc::clone(&transport), "echo".into(), vec![], Map::new())
            .await;
        let second = registry
            .task_start(client, Arc::clone(&transport), "echo".into(), vec![], Map::new())
            .await;
        assert!(second.0 > first.0);
    }

    #[tokio::test]
    async fn unknown_task_resolves_failure_event() {
        let (registry, transport) = registry_with_echo();
        let client = ClientId::new();
        let events = registry.events();
        let waiter = tokio::spawn(async move { events.wait_for_event("task.failure.*", 1.0).await });
        let ticket_id = registry
            .task_start(client, transport, "does-not-exist".into(), vec![], Map::new())
            .await;
        let message = waiter.await.unwrap().unwrap();
        assert!(message.as_str().unwrap().contains("does-not-exist"));
        assert_eq!(registry.ticket_state(ticket_id), None);
    }

    #[tokio::test]
    async fn disconnect_cancels_the_client_s_running_tickets() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            "never-finishes",
            Arc::new(|_ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>| async move {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }),
        );
        let events = Arc::new(EventBus::new());
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let registry = Arc::new(TicketRegistry::new(Arc::new(handlers), events, kv));
        let transport = Arc::new(Transport::new());
        let client = ClientId::new();

        let ticket_id = registry
            .task_start(client, Arc::clone(&transport), "never-finishes".into(), vec![], Map::new())
            .await;
        assert_eq!(registry.ticket_state(ticket_id), Some(TicketState::Running));

        MessageHandler::on_disconnect(registry.as_ref(), client).await;
        assert_eq!(registry.ticket_state(ticket_id), Some(TicketState::Cancelled));
    }

    #[tokio::test]
    async fn progress_is_forwarded_to_the_event_bus() {
        let mut handlers = HandlerRegistry::new();
        handlers.register(
            "logs-then-succeeds",
            Arc::new(|ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>| async move {
                ctx.log("step one");
                Ok(Value::Null)
            }),
        );
        let events = Arc::new(EventBus::new());
        let kv: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::new());
        let registry = Arc::new(TicketRegistry::new(Arc::new(handlers), Arc::clone(&events), kv));
        let transport = Arc::new(Transport::new());
        let client = ClientId::new();

        let progress_waiter = tokio::spawn(async move { events.wait_for_event("task.progress.*", 1.0).await });
        registry
            .task_start(client, transport, "logs-then-succeeds".into(), vec![], Map::new())
            .await;

        let progress = progress_waiter.await.unwrap().unwrap();
        assert_eq!(progress, Value::String("step one".into()));
    }

    #[tokio::test]
    async fn known_task_resolves_success_event_and_state() {
        let (registry, transport) = registry_with_echo();
        let client = ClientId::new();
        let events = registry.events();
        let waiter = tokio::spawn(async move { events.wait_for_event("task.success.*", 1.0).await });
        let ticket_id = registry
            .task_start(client, transport, "echo".into(), vec![Value::from(1)], Map::new())
            .await;
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, Value::Array(vec![Value::from(1)]));
        assert_eq!(registry.ticket_state(ticket_id), None);
    }
}
