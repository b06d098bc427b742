//! In-process pub/sub with trailing-wildcard patterns, used to fan ticket
//! progress/success/failure events out to both the transport (for delivery
//! to clients) and internal waiters such as a task's log follower.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcloud_shared::{McloudError, McloudResult};
use serde_json::Value;
use tokio::sync::oneshot;

pub type Payload = Value;
type Callback = Arc<dyn Fn(&str, &Payload) + Send + Sync>;

struct Subscription {
    id: u64,
    pattern: String,
    once: bool,
    handler: Callback,
}

/// `pattern` matches `channel` either exactly, or, if `pattern` ends in
/// `*`, as a prefix match (`"task.progress.*"` matches
/// `"task.progress.7"`).
fn matches(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[derive(Default)]
pub struct EventBus {
    subs: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribe(
        &self,
        pattern: impl Into<String>,
        once: bool,
        handler: impl Fn(&str, &Payload) + Send + Sync + 'static,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let sub = Subscription {
            id,
            pattern: pattern.into(),
            once,
            handler: Arc::new(handler),
        };
        self.subs.lock().unwrap().push(sub);
        id
    }

    /// Subscribe to every `fire` on a channel matching `pattern` until
    /// explicitly cancelled with [`EventBus::unsubscribe`].
    pub fn on(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&str, &Payload) + Send + Sync + 'static,
    ) -> u64 {
        self.subscribe(pattern, false, handler)
    }

    /// Subscribe for exactly one matching `fire`, then auto-unsubscribe.
    pub fn once(
        &self,
        pattern: impl Into<String>,
        handler: impl Fn(&str, &Payload) + Send + Sync + 'static,
    ) -> u64 {
        self.subscribe(pattern, true, handler)
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subs.lock().unwrap().retain(|s| s.id != id);
    }

    /// Deliver `data` to every subscription matching `channel`, in the
    /// order they were registered. A subscriber that panics is logged and
    /// does not prevent delivery to the rest.
    pub fn fire(&self, channel: &str, data: Payload) {
        let matched: Vec<(u64, bool, Callback)> = {
            let subs = self.subs.lock().unwrap();
            subs.iter()
                .filter(|s| matches(&s.pattern, channel))
                .map(|s| (s.id, s.once, Arc::clone(&s.handler)))
                .collect()
        };
        if matched.is_empty() {
            return;
        }

        let mut to_drop = Vec::new();
        for (id, once, handler) in matched {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(channel, &data)));
            if outcome.is_err() {
                tracing::warn!(subscriber_id = id, channel, "event subscriber panicked");
            }
            if once {
                to_drop.push(id);
            }
        }
        if !to_drop.is_empty() {
            self.subs.lock().unwrap().retain(|s| !to_drop.contains(&s.id));
        }
    }

    /// Wait for the next event matching `pattern`. `timeout_seconds == 0`
    /// waits indefinitely; otherwise returns `McloudError::Timeout` once
    /// the deadline passes without a match.
    pub async fn wait_for_event(&self, pattern: &str, timeout_seconds: f64) -> McloudResult<Payload> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let id = self.once(pattern, move |_channel, data| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(data.clone());
            }
        });

        let result = if timeout_seconds <= 0.0 {
            rx.await.map_err(|_| McloudError::Internal("event bus dropped waiter".into()))
        } else {
            match tokio::time::timeout(Duration::from_secs_f64(timeout_seconds), rx).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(McloudError::Internal("event bus dropped waiter".into())),
                Err(_) => Err(McloudError::Timeout {
                    pattern: pattern.to_string(),
                }),
            }
        };
        self.unsubscribe(id);
        result
    }
}
