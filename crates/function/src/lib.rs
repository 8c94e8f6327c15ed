//! Function-as-a-service adapter.
//!
//! Accepts API-gateway style proxy events (payload v1 `httpMethod`/`path` or
//! v2 `requestContext.http.method`/`rawPath`) and routes them to the same
//! [`AutoReplyService`] the long-running server uses.

use autodm_core::service::AutoReplyService;
use autodm_core::verify::{VerifyQuery, SIGNATURE_HEADER};
use autodm_server::pages;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpContext {
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub http: Option<HttpContext>,
}

/// Incoming invocation: method, path, query, headers and body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionEvent {
    #[serde(default)]
    pub request_context: Option<RequestContext>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub raw_path: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Usually a string; some test harnesses send the JSON object inline.
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl FunctionEvent {
    pub fn method(&self) -> String {
        self.request_context
            .as_ref()
            .and_then(|c| c.http.as_ref())
            .and_then(|h| h.method.clone())
            .or_else(|| self.http_method.clone())
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase()
    }

    pub fn path(&self) -> &str {
        self.raw_path
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("/")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.as_ref().and_then(|h| {
            h.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        })
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.query_string_parameters
            .as_ref()
            .and_then(|q| q.get(name).cloned())
    }

    pub fn verify_query(&self) -> VerifyQuery {
        VerifyQuery {
            mode: self.query_param("hub.mode"),
            verify_token: self.query_param("hub.verify_token"),
            challenge: self.query_param("hub.challenge"),
        }
    }

    /// Raw body bytes, base64-decoded when flagged.
    pub fn body_bytes(&self) -> Result<Vec<u8>, String> {
        let raw = match &self.body {
            None | Some(Value::Null) => return Ok(b"{}".to_vec()),
            Some(Value::String(s)) => s.clone().into_bytes(),
            Some(other) => serde_json::to_vec(other).map_err(|e| e.to_string())?,
        };
        if self.is_base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(&raw)
                .map_err(|e| format!("invalid base64 body: {}", e))
        } else {
            Ok(raw)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FunctionResponse {
    fn new(status_code: u16, content_type: &str, body: String) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn json(status_code: u16, body: &Value) -> Self {
        Self::new(status_code, "application/json", body.to_string())
    }

    pub fn text(status_code: u16, body: String) -> Self {
        Self::new(status_code, "text/plain", body)
    }

    pub fn html(body: String) -> Self {
        Self::new(200, "text/html", body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Root,
    Webhook,
    Health,
    Stats,
    NotFound,
}

/// Stage prefixes (`/prod/webhook`) and trailing slashes are tolerated.
fn route_of(path: &str) -> Route {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Route::Root
    } else if trimmed.ends_with("/webhook") {
        Route::Webhook
    } else if trimmed.ends_with("/health") {
        Route::Health
    } else if trimmed.ends_with("/stats") {
        Route::Stats
    } else {
        Route::NotFound
    }
}

pub struct FunctionHandler {
    service: Arc<AutoReplyService>,
}

impl FunctionHandler {
    pub fn new(service: Arc<AutoReplyService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, event: FunctionEvent) -> FunctionResponse {
        let method = event.method();
        let route = route_of(event.path());
        info!(method = %method, path = %event.path(), "function invocation");

        match (route, method.as_str()) {
            (Route::Webhook, "GET") => self.verify(&event),
            (Route::Root, "GET") if event.query_param("hub.mode").is_some() => self.verify(&event),
            (Route::Webhook | Route::Root, "POST") => self.delivery(&event).await,
            (Route::Root, "GET") => {
                let config = self.service.config();
                FunctionResponse::html(pages::status_page(config, &self.service.metrics()))
            }
            (Route::Health, "GET") => FunctionResponse::json(200, &self.service.health()),
            (Route::Stats, "GET") => match serde_json::to_value(self.service.stats().await) {
                Ok(v) => FunctionResponse::json(200, &v),
                Err(e) => FunctionResponse::json(500, &json!({ "error": e.to_string() })),
            },
            (Route::NotFound, _) => FunctionResponse::json(404, &json!({ "error": "not found" })),
            _ => FunctionResponse::json(405, &json!({ "error": "method not allowed" })),
        }
    }

    fn verify(&self, event: &FunctionEvent) -> FunctionResponse {
        match self.service.verify(&event.verify_query()) {
            Ok(challenge) => FunctionResponse::text(200, challenge),
            Err(e) => FunctionResponse::text(e.status_code(), "Forbidden".to_string()),
        }
    }

    async fn delivery(&self, event: &FunctionEvent) -> FunctionResponse {
        let body = match event.body_bytes() {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "undecodable invocation body");
                return FunctionResponse::json(400, &json!({ "error": e }));
            }
        };
        let signature = event.header(SIGNATURE_HEADER);
        match self.service.handle_delivery(&body, signature).await {
            Ok(_) => FunctionResponse::json(200, &json!({ "status": "ok" })),
            Err(e) => FunctionResponse::json(e.status_code(), &json!({ "error": e.to_string() })),
        }
    }
}
