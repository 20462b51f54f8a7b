use serde_json::{json, Map, Value};

use crate::logical::{auth::Auth, secret::SecretData};

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub data: Option<Map<String, Value>>,
    pub auth: Option<Auth>,
    pub secret: Option<SecretData>,
}

impl Response {
    pub fn new() -> Self {
        Self { ..Default::default() }
    }

    pub fn data_response(data: Option<Map<String, Value>>) -> Self {
        let mut resp = Response::new();
        resp.data = data;
        resp
    }

    pub fn list_response(keys: &[String]) -> Self {
        let mut resp = Response::new();
        resp.data = json!({
            "keys": keys,
        })
        .as_object()
        .cloned();
        resp
    }

    /// Renders a request-shape violation the way transports expect it:
    /// the message as the `error` field of the reply data.
    pub fn error_response(text: &str) -> Self {
        let mut resp = Response::new();
        resp.data = json!({
            "error": text.to_string(),
        })
        .as_object()
        .cloned();
        resp
    }
}
