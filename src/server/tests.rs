use super::*;
use crate::config::default_allowed_origins;
use crate::llm::{ChatEventStream, ChatMessage, ImageQuality, StreamEvent, ToolDef};
use crate::relay::{ChatBackend, ImageGenerator};
use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use std::sync::Mutex;
use tower::ServiceExt;

struct OneRound {
    events: Mutex<Option<Vec<Result<StreamEvent>>>>,
    fail_open: bool,
}

#[async_trait]
impl ChatBackend for OneRound {
    async fn open_stream(
        &self,
        _model: &str,
        _messages: Vec<ChatMessage>,
        _tools: Vec<ToolDef>,
    ) -> Result<ChatEventStream> {
        if self.fail_open {
            anyhow::bail!("chat error: 401 Unauthorized - invalid api key");
        }
        let events = self.events.lock().unwrap().take().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

struct BrokenImages;

#[async_trait]
impl ImageGenerator for BrokenImages {
    async fn generate_image(&self, _prompt: &str, _quality: ImageQuality) -> Result<String> {
        anyhow::bail!("image error: 500 - upstream down")
    }
}

fn app_with(events: Vec<Result<StreamEvent>>, fail_open: bool) -> Router {
    let chat = Arc::new(OneRound {
        events: Mutex::new(Some(events)),
        fail_open,
    });
    let relay = Relay::new(chat, Arc::new(BrokenImages), "gpt-test");
    let state = AppState {
        relay: Arc::new(relay),
    };
    build_router(state, cors_layer(&default_allowed_origins()).unwrap())
}

fn chat_request(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn data_lines(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test]
async fn root_returns_message() {
    let app = app_with(vec![], false);
    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["message"], "chat-relay API");
}

#[tokio::test]
async fn chat_streams_sse_events() {
    let app = app_with(
        vec![
            Ok(StreamEvent::TextDelta("Hello".into())),
            Ok(StreamEvent::TextDelta(" world".into())),
            Ok(StreamEvent::Completion {
                finish_reason: "stop".into(),
            }),
        ],
        false,
    );
    let resp = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let events = data_lines(&body_text(resp).await);
    assert_eq!(
        events,
        vec![
            json!({"status": "streaming", "content": "Hello"}),
            json!({"status": "streaming", "content": " world"}),
            json!({"status": "done"}),
        ]
    );
}

#[tokio::test]
async fn chat_accepts_image_data() {
    let app = app_with(
        vec![Ok(StreamEvent::Completion {
            finish_reason: "stop".into(),
        })],
        false,
    );
    let resp = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"what is this","image_data":["iVBORw0KGgo="]}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(data_lines(&body_text(resp).await), vec![json!({"status": "done"})]);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let app = app_with(vec![], false);
    let resp = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"robot","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(v["detail"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn broken_json_is_rejected() {
    let app = app_with(vec![], false);
    let resp = app.oneshot(chat_request("{\"messages\": [")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_json_content_type_is_rejected() {
    let app = app_with(vec![], false);
    let req = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .body(Body::from(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(v["detail"].as_str().unwrap().contains("Content-Type"));
}

#[tokio::test]
async fn failure_before_first_event_is_500() {
    let app = app_with(vec![], true);
    let resp = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"hi"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v: Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert!(v["detail"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn failure_after_first_event_is_terminal_error_event() {
    let app = app_with(
        vec![
            Ok(StreamEvent::TextDelta("Drawing".into())),
            Ok(StreamEvent::ToolCallDelta {
                id: Some("call_1".into()),
                name: Some("generate_image".into()),
                arguments: Some("{\"prompt\":\"a cat\"}".into()),
            }),
        ],
        false,
    );
    let resp = app
        .oneshot(chat_request(
            r#"{"messages":[{"role":"user","content":"draw a cat"}]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let events = data_lines(&body_text(resp).await);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], json!({"status": "streaming", "content": "Drawing"}));
    assert_eq!(events[1], json!({"status": "generating_image"}));
    assert_eq!(events[2]["status"], "error");
    assert!(events[2]["message"].as_str().unwrap().contains("upstream down"));
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let app = app_with(vec![], false);
    let resp = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/chat")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn cors_ignores_unknown_origin() {
    let app = app_with(vec![], false);
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header(header::ORIGIN, "http://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[test]
fn invalid_origin_is_config_error() {
    assert!(cors_layer(&["http://ok.example.com".into(), "bad\norigin".into()]).is_err());
}
