use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use tracing::{info, warn};

use rewear_agent::runtime::ConversationRuntime;
use rewear_sms::inbound::InboundSms;

#[derive(Clone)]
pub struct WebhookState {
    pub runtime: Arc<ConversationRuntime>,
}

pub fn router(runtime: Arc<ConversationRuntime>) -> Router {
    Router::new()
        .route("/webhook/sms", post(receive_sms))
        .with_state(WebhookState { runtime })
}

/// Inbound gateway webhook. The response body is the reply to text back;
/// an empty body means "send nothing" (duplicate delivery).
pub async fn receive_sms(
    State(state): State<WebhookState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, String) {
    let inbound = match InboundSms::from_form(&form) {
        Ok(inbound) => inbound,
        Err(parse_error) => {
            warn!(
                event_name = "server.webhook.bad_payload",
                error = %parse_error,
                "rejected malformed webhook payload"
            );
            return (StatusCode::BAD_REQUEST, parse_error.to_string());
        }
    };

    info!(
        event_name = "server.webhook.received",
        phone = %inbound.from,
        message_id = %inbound.message_id,
        media_count = inbound.media.len(),
        "inbound message accepted"
    );

    let turn = state.runtime.handle(&inbound).await;
    let body = turn.reply.map(|reply| reply.body).unwrap_or_default();
    (StatusCode::OK, body)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::util::ServiceExt;

    use rewear_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    async fn test_router() -> axum::Router {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                gateway_auth_token: Some("gw-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap test app");
        super::router(app.runtime.clone())
    }

    fn form_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook/sms")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn webhook_replies_with_the_greeting_for_a_new_phone() {
        let router = test_router().await;

        let response = router
            .oneshot(form_request("MessageSid=SM-1&From=%2B15550100&Body=hello"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("seller account"), "greeting expected: {body}");
    }

    #[tokio::test]
    async fn webhook_returns_an_empty_body_for_a_replayed_message_id() {
        let router = test_router().await;

        let first = router
            .clone()
            .oneshot(form_request("MessageSid=SM-9&From=%2B15550101&Body=hello"))
            .await
            .expect("first response");
        assert_eq!(first.status(), StatusCode::OK);
        assert!(!body_text(first).await.is_empty());

        let replay = router
            .oneshot(form_request("MessageSid=SM-9&From=%2B15550101&Body=hello"))
            .await
            .expect("replayed response");
        assert_eq!(replay.status(), StatusCode::OK);
        assert_eq!(body_text(replay).await, "", "duplicate delivery sends nothing");
    }

    #[tokio::test]
    async fn webhook_rejects_payloads_without_a_sender() {
        let router = test_router().await;

        let response = router
            .oneshot(form_request("MessageSid=SM-2&Body=hello"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
