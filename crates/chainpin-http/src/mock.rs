//! In-memory [`RestClient`] for connector tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use chainpin_core::PluginError;

use crate::client::{Method, RestClient, RestRequest, RestResponse};

/// Canned responses keyed by `(method, path)`, with a log of every request.
///
/// Unregistered routes answer 404. Registering a route again replaces it.
#[derive(Default)]
pub struct MockRestClient {
    routes: Mutex<HashMap<(Method, String), RestResponse>>,
    calls: Mutex<Vec<RestRequest>>,
}

impl MockRestClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.on_text(method, path, status, &body.to_string())
    }

    pub fn on_text(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method, path.to_string()), RestResponse::new(status, body));
        self
    }

    pub fn calls(&self) -> Vec<RestRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests sent to `(method, path)`, in order.
    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RestRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    /// Body of the last request sent to `(method, path)`.
    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.calls_to(method, path).pop().and_then(|r| r.body)
    }
}

#[async_trait]
impl RestClient for MockRestClient {
    async fn execute(&self, req: RestRequest) -> Result<RestResponse, PluginError> {
        self.calls.lock().unwrap().push(req.clone());
        let found = self
            .routes
            .lock()
            .unwrap()
            .get(&(req.method, req.path.clone()))
            .cloned();
        Ok(found.unwrap_or_else(|| {
            RestResponse::new(
                404,
                serde_json::json!({ "error": format!("no route for {} {}", req.method, req.path) })
                    .to_string(),
            )
        }))
    }
}
