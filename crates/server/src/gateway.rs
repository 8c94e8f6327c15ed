use autodm_core::service::AutoReplyService;
use autodm_core::verify::{VerifyQuery, SIGNATURE_HEADER};
use autodm_core::WebhookError;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::pages;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<AutoReplyService>,
}

pub struct Gateway {
    service: Arc<AutoReplyService>,
    addr: SocketAddr,
}

impl Gateway {
    pub fn new(service: Arc<AutoReplyService>, addr: SocketAddr) -> Self {
        Self { service, addr }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = router(self.service.clone());

        let config = self.service.config();
        info!(
            brand = %config.brand_name,
            account_id = %config.account_id,
            api_version = %config.api_version,
            endpoint = %config.messages_endpoint(),
            "Gateway listening on {}",
            self.addr
        );

        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// All routes of the long-running service.
pub fn router(service: Arc<AutoReplyService>) -> Router {
    let state = AppState { service };
    Router::new()
        .route("/", get(status_page))
        .route("/test", get(test_page))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/webhook", get(webhook_verify).post(webhook_event))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install Ctrl-C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn webhook_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    info!(
        mode = query.mode.as_deref().unwrap_or_default(),
        has_challenge = query.challenge.is_some(),
        "webhook verification request"
    );
    match state.service.verify(&query) {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(e) => (status_of(&e), "Forbidden").into_response(),
    }
}

async fn webhook_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.service.handle_delivery(&body, signature).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => (status_of(&e), Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

fn status_of(err: &WebhookError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(state.service.health())
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.stats().await)
}

async fn status_page(State(state): State<AppState>) -> Html<String> {
    let config = state.service.config();
    let metrics = state.service.metrics();
    Html(pages::status_page(config, &metrics))
}

async fn test_page(State(state): State<AppState>) -> Html<String> {
    Html(pages::test_page(state.service.config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autodm_core::channel::{MessageSender, SendError, SendReceipt};
    use autodm_core::config::AppConfig;
    use autodm_core::verify::sign_body;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct CountingSender {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MessageSender for CountingSender {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send_text(&self, _recipient_id: &str, _text: &str) -> Result<SendReceipt, SendError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SendError::Api {
                    status: 500,
                    code: "2".into(),
                    message: "Service temporarily unavailable".into(),
                })
            } else {
                Ok(SendReceipt { message_id: None })
            }
        }
    }

    fn setup(fail: bool, app_secret: Option<&str>) -> (Router, Arc<CountingSender>, Arc<AutoReplyService>) {
        let sender = Arc::new(CountingSender {
            sent: AtomicUsize::new(0),
            fail,
        });
        let config = AppConfig {
            access_token: "token".into(),
            account_id: "1784".into(),
            verify_token: "verify-me".into(),
            brand_name: "Acme <Shop>".into(),
            app_secret: app_secret.map(str::to_string),
            ..AppConfig::default()
        };
        let service = Arc::new(AutoReplyService::new(config, sender.clone()));
        (router(service.clone()), sender, service)
    }

    fn delivery(mid: &str, text: &str) -> String {
        json!({
            "object": "instagram",
            "entry": [{"id": "1784", "messaging": [{
                "sender": {"id": "u1"},
                "recipient": {"id": "1784"},
                "message": {"mid": mid, "text": text}
            }]}]
        })
        .to_string()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    fn post_webhook(body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn verify_echoes_challenge() {
        let (app, _, _) = setup(false, None);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=X123")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "X123");
    }

    #[tokio::test]
    async fn verify_rejects_bad_token_and_mode() {
        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=X",
            "/webhook?hub.mode=unsubscribe&hub.verify_token=verify-me&hub.challenge=X",
            "/webhook",
        ] {
            let (app, _, _) = setup(false, None);
            let resp = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "uri: {uri}");
        }
    }

    #[tokio::test]
    async fn post_event_replies_and_returns_ok() {
        let (app, sender, _) = setup(false, None);
        let resp = app
            .oneshot(post_webhook(delivery("mid.1", "hello")))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).expect("json");
        assert_eq!(body, json!({"status": "ok"}));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_failure_still_returns_ok() {
        let (app, sender, service) = setup(true, None);
        let resp = app
            .oneshot(post_webhook(delivery("mid.1", "hello")))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
        assert_eq!(service.metrics().total_errors, 1);
    }

    #[tokio::test]
    async fn malformed_body_returns_500_with_error() {
        let (app, sender, service) = setup(false, None);
        let resp = app
            .oneshot(post_webhook("not json".to_string()))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_string(resp).await).expect("json");
        assert!(body["error"].as_str().expect("error").starts_with("malformed payload"));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 0);
        let m = service.metrics();
        assert_eq!((m.total_received, m.total_errors), (1, 1));
    }

    #[tokio::test]
    async fn unsigned_delivery_is_rejected_when_secret_set() {
        let (app, sender, _) = setup(false, Some("app-secret"));
        let resp = app
            .clone()
            .oneshot(post_webhook(delivery("mid.1", "hello")))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sender.sent.load(Ordering::SeqCst), 0);

        let body = delivery("mid.1", "hello");
        let signed = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, sign_body(body.as_bytes(), "app-secret"))
            .body(Body::from(body))
            .expect("request");
        let resp = app.oneshot(signed).await.expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stats_reports_counters_and_recent() {
        let (app, _, _) = setup(false, None);
        for mid in ["mid.1", "mid.1", "mid.2"] {
            app.clone()
                .oneshot(post_webhook(delivery(mid, "price?")))
                .await
                .expect("response");
        }
        let resp = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).expect("json");
        assert_eq!(body["stats"]["total_received"], 3);
        assert_eq!(body["stats"]["total_sent"], 2);
        assert_eq!(body["messages_processed"], 2);
        assert_eq!(body["conversations"], 2);
        assert_eq!(body["config"]["account_id"], "1784");
        assert_eq!(body["config"]["ig_id"], "1784");
        assert_eq!(body["config"]["token_type"], "Instagram User Access Token");
        assert_eq!(body["recent_conversations"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn health_and_pages_render() {
        let (app, _, _) = setup(false, None);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let body: Value = serde_json::from_str(&body_string(resp).await).expect("json");
        assert_eq!(body["status"], "healthy");

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("Acme &lt;Shop&gt;"));
        assert!(!html.contains("Acme <Shop>"));

        let resp = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let html = body_string(resp).await;
        assert!(html.contains("fetch('/webhook'"));
        assert!(html.contains("\"1784\""));
    }
}
