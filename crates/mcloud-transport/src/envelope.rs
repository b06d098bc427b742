//! The three wire shapes carried over the websocket connection: a client
//! request, a server response tied to that request's id, and a
//! fire-and-forget server event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Request {
        id: i64,
        task: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        kwargs: Map<String, Value>,
    },
    Response {
        id: i64,
        success: bool,
        response: Value,
    },
    Event {
        name: String,
        data: Value,
    },
}

impl Envelope {
    pub fn response(id: i64, success: bool, response: Value) -> Self {
        Envelope::Response { id, success, response }
    }

    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Envelope::Event { name: name.into(), data }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let text = r#"{"type":"request","id":1,"task":"ping","args":[],"kwargs":{}}"#;
        let envelope = Envelope::from_json(text).unwrap();
        match envelope {
            Envelope::Request { id, task, .. } => {
                assert_eq!(id, 1);
                assert_eq!(task, "ping");
            }
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn request_defaults_missing_args_and_kwargs() {
        let text = r#"{"type":"request","id":2,"task":"status"}"#;
        let envelope = Envelope::from_json(text).unwrap();
        match envelope {
            Envelope::Request { args, kwargs, .. } => {
                assert!(args.is_empty());
                assert!(kwargs.is_empty());
            }
            _ => panic!("expected a request"),
        }
    }

    #[test]
    fn response_serializes_with_tag() {
        let envelope = Envelope::response(1, true, serde_json::json!("pong"));
        let text = envelope.to_json().unwrap();
        assert!(text.contains(r#""type":"response""#));
        assert!(text.contains(r#""success":true"#));
    }

    #[test]
    fn event_serializes_with_tag() {
        let envelope = Envelope::event("task.progress.7", serde_json::json!("building"));
        let text = envelope.to_json().unwrap();
        assert!(text.contains(r#""type":"event""#));
        assert!(text.contains(r#""name":"task.progress.7""#));
    }
}
