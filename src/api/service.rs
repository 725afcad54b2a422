//! Chat and health handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

use crate::context::Message;
use crate::pipeline::{ChatPipeline, ChatResult, FailureKind};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<Message>,
}

#[derive(Clone)]
struct ApiState {
    pipeline: Arc<ChatPipeline>,
    trusted_proxy_hops: usize,
}

/// Build the application router.
///
/// `trusted_proxy_hops` is the number of reverse proxies that append to
/// `X-Forwarded-For` before a request reaches this service.
pub fn router(pipeline: Arc<ChatPipeline>, trusted_proxy_hops: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(ApiState {
            pipeline,
            trusted_proxy_hops,
        })
}

/// Opaque client identity used as the rate limit key.
///
/// Each trusted proxy appends the address it received the request from, so
/// the entry `trusted_proxy_hops` from the right is the last one a client
/// could not forge. Falls back to the peer IP when the header is absent or
/// shorter than expected.
pub fn client_id(headers: &HeaderMap, peer: SocketAddr, trusted_proxy_hops: usize) -> String {
    let forwarded = match trusted_proxy_hops {
        0 => None,
        hops => headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                let hops_seen: Vec<&str> = v.split(',').map(str::trim).collect();
                hops_seen
                    .len()
                    .checked_sub(hops)
                    .map(|i| hops_seen[i])
            })
            .filter(|v| !v.is_empty()),
    };

    forwarded
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

async fn chat_handler(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> (StatusCode, Json<ChatResult>) {
    let client = client_id(&headers, peer, state.trusted_proxy_hops);

    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            debug!(
                client = %client,
                status = %rejection.status(),
                error = %rejection.body_text(),
                "Rejected unreadable chat request"
            );
            let result = ChatResult::Failure {
                kind: FailureKind::InvalidRequest,
            };
            return (StatusCode::BAD_REQUEST, Json(result));
        }
    };

    debug!(
        client = %client,
        history = payload.history.len(),
        "Received chat request"
    );

    let result = state
        .pipeline
        .process_message(&payload.message, &payload.history, &client)
        .await;

    let status = match result.failure_kind() {
        Some(FailureKind::InvalidRequest) => StatusCode::BAD_REQUEST,
        Some(FailureKind::TooFast) | Some(FailureKind::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
        Some(FailureKind::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(FailureKind::Failed) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };

    (status, Json(result))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConciergeConfig;
    use crate::context::KnowledgeBase;
    use crate::provider::{
        ChatRequest, Credential, CredentialPool, Transport, TransportError, TransportResponse,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    struct FixedTransport {
        status: u16,
        body: String,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(
            &self,
            _credential: &Credential,
            _request: &ChatRequest<'_>,
        ) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn app(status: u16, body: &str) -> Router {
        let pool = CredentialPool::new(vec![Credential::new("key")]).unwrap();
        let transport = Arc::new(FixedTransport {
            status,
            body: body.to_string(),
        });
        let pipeline = ChatPipeline::from_config(
            &ConciergeConfig::default(),
            "instructions",
            &KnowledgeBase::new(),
            transport,
            pool,
        );
        router(Arc::new(pipeline), 1)
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))))
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const COMPLETION: &str = r#"{"choices":[{"message":{"content":"Hello!"}}]}"#;

    #[tokio::test]
    async fn test_health() {
        let response = app(200, COMPLETION)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_chat_success() {
        let response = app(200, COMPLETION)
            .oneshot(chat_request(serde_json::json!({
                "message": "What projects are listed?",
                "history": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Hello!");
    }

    #[tokio::test]
    async fn test_chat_empty_message() {
        let response = app(200, COMPLETION)
            .oneshot(chat_request(serde_json::json!({"message": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], FailureKind::EmptyInput.message());
    }

    #[tokio::test]
    async fn test_chat_exhausted_maps_to_503() {
        let response = app(429, "{}")
            .oneshot(chat_request(serde_json::json!({"message": "Tell me about the blog"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], FailureKind::Unavailable.message());
    }

    #[tokio::test]
    async fn test_chat_fatal_hides_provider_text() {
        let response = app(400, "{\"error\":\"internal model detail\"}")
            .oneshot(chat_request(serde_json::json!({"message": "Tell me about the blog"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(!json.to_string().contains("internal model detail"));
    }

    #[tokio::test]
    async fn test_chat_unknown_role_gets_fixed_error() {
        let response = app(200, COMPLETION)
            .oneshot(chat_request(serde_json::json!({
                "message": "hi",
                "history": [{"role": "tool", "content": "x"}]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": FailureKind::InvalidRequest.message()
            })
        );
    }

    #[tokio::test]
    async fn test_chat_malformed_json_gets_fixed_error() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from("{\"message\": \"hi\""))
            .unwrap();

        let response = app(200, COMPLETION).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], FailureKind::InvalidRequest.message());
    }

    #[tokio::test]
    async fn test_spoofed_first_hop_shares_rate_limit() {
        let app = app(200, COMPLETION);
        let mut allowed = 0;
        let mut too_fast = 0;

        for i in 0..5 {
            let mut request = chat_request(serde_json::json!({"message": "What projects are listed?"}));
            request.headers_mut().insert(
                "x-forwarded-for",
                format!("1.1.1.{}, 198.51.100.9", i).parse().unwrap(),
            );
            let response = app.clone().oneshot(request).await.unwrap();
            match response.status() {
                StatusCode::OK => allowed += 1,
                StatusCode::TOO_MANY_REQUESTS => {
                    let json = body_json(response).await;
                    assert_eq!(json["error"], FailureKind::TooFast.message());
                    too_fast += 1;
                }
                other => panic!("unexpected status {}", other),
            }
        }

        assert_eq!(allowed, 1);
        assert_eq!(too_fast, 4);
    }

    #[test]
    fn test_client_id_uses_last_trusted_hop() {
        let peer = SocketAddr::from(([127, 0, 0, 1], 5000));
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers, peer, 1), "127.0.0.1");

        headers.insert("x-forwarded-for", "6.6.6.6, 203.0.113.7".parse().unwrap());
        assert_eq!(client_id(&headers, peer, 1), "203.0.113.7");

        headers.insert(
            "x-forwarded-for",
            "6.6.6.6, 203.0.113.7, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(client_id(&headers, peer, 2), "203.0.113.7");
    }

    #[test]
    fn test_client_id_falls_back_to_peer() {
        let peer = SocketAddr::from(([192, 0, 2, 1], 5000));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());

        // No trusted proxies: the header is ignored
        assert_eq!(client_id(&headers, peer, 0), "192.0.2.1");
        // Fewer hops than trusted proxies
        assert_eq!(client_id(&headers, peer, 2), "192.0.2.1");
    }
}
