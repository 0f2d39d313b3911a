#[cfg(test)]
mod router_tests {
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    use crate::api::{app_state::AppState, create_router};
    use crate::config::AppConfig;
    use crate::error::{AppError, Result};
    use crate::models::analysis::Usage;
    use crate::models::venue::VenueProfile;
    use crate::services::image::tests::png_bytes;
    use crate::services::llm_client::{ChatCompletion, ChatModel, ChatRequest};
    use crate::services::venue_matcher::VenueIndex;
    use crate::storage::AnalysisRepository;
    use crate::storage::memory::MemoryRepository;

    const KEY: &str = "test-key";
    const BOUNDARY: &str = "scan-invoice-test-boundary";

    /// Answers probe, extraction and quick calls with canned JSON
    #[derive(Default)]
    struct StubModel {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for StubModel {
        async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Upstream("status 503: overloaded".into()));
            }

            let system = request.messages[0].text();
            let content = if system.starts_with("Read the receipt image") {
                json!({"m": "Al Baik", "a": "Tahlia Street"})
            } else if request.json_mode {
                json!({"data": {
                    "MerchantName": "Al Baik",
                    "MerchantAddress": "Tahlia Street, Jeddah",
                    "TransactionDate": "2024-01-05 13:30:00",
                    "Subtotal": "100",
                    "Tax": "15",
                    "Total": "115"
                }})
            } else {
                json!({"data": {"MerchantName": "Kudu", "Subtotal": 100, "Tax": 10, "Total": 120}})
            };

            Ok(ChatCompletion {
                content: content.to_string(),
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    fn config(dir: &Path, api_keys: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.openai.api_key = "sk-test".into();
        config.data.prompt_path = dir.join("prompt.txt");
        config.data.quick_prompt_path = dir.join("quick_prompt.txt");
        config.data.venue_profiles_path = dir.join("venue_profiles.json");
        config.security.api_keys = api_keys.into();
        config
    }

    fn app_with(config: AppConfig, model: Arc<StubModel>) -> (Router, AppState) {
        let profiles: Vec<VenueProfile> = serde_json::from_value(json!([{
            "MerchantName_Keyword": "Al Baik",
            "MerchantAddress_Keyword": "Tahlia Street",
            "Spending Range (SAR)": "10-300"
        }]))
        .unwrap();
        let state = AppState::new(
            config,
            model,
            VenueIndex::new(profiles, 55.0),
            Arc::new(MemoryRepository::new()),
        );
        (create_router(state.clone()), state)
    }

    fn app(dir: &Path) -> Router {
        app_with(config(dir, KEY), Arc::new(StubModel::default())).0
    }

    fn multipart(field: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"receipt.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, field: &str, bytes: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("X-API-Key", KEY)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart(field, bytes)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("X-API-Key", KEY)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("X-API-Key", KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health_are_public() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(json_body(response).await, json!({"status": "ok"}));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["venue_profiles"], 1);
        assert_eq!(body["auth_enabled"], true);
        assert_eq!(body["system_prompt"]["active"], "fallback");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_protected_routes_require_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        for uri in ["/analyses", "/prompts/active"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            let body = json_body(response).await;
            assert_eq!(body["message"], "Invalid or missing API key");
        }

        let mut request = upload("/analyze/image", "file", &png_bytes(32, 32));
        request.headers_mut().insert("X-API-Key", "wrong".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_auth_disabled_without_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app_with(config(dir.path(), ""), Arc::new(StubModel::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/analyses")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_full_analysis_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(upload(
                "/analyze/image?reference=INV-42",
                "file",
                &png_bytes(64, 40),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["MerchantName"], "Al Baik");
        assert_eq!(body["data"]["TransactionDate"], "2024-01-05 13:30");
        assert_eq!(body["data"]["Total"], 115.0);
        assert_eq!(body["validation"]["fraudScore"], 0);
        assert_eq!(body["validation"]["confidenceScore"], 100);
        assert_eq!(body["reason"], "Checks passed.");
        assert_eq!(body["usage"]["total_tokens"], 30);
        assert_eq!(body["profile"]["name"], "Al Baik");

        let id = body["id"].as_str().unwrap().to_string();
        let response = app.clone().oneshot(get(&format!("/analyses/{}", id))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record = json_body(response).await;
        assert_eq!(record["reference"], "INV-42");
        assert_eq!(record["filename"], "receipt.png");
        assert_eq!(record["mode"], "full");
        assert_eq!(record["profile_matched"], true);

        let response = app.clone().oneshot(get("/analyses?limit=5")).await.unwrap();
        let list = json_body(response).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["limit"], 5);
        assert_eq!(list["items"][0]["id"], id.as_str());

        let response = app.oneshot(get("/analyses/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quick_analysis_fills_scores() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(upload("/analyze", "image", &png_bytes(40, 40)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let data = &body["data"];
        assert_eq!(data["MerchantName"], "Kudu");
        assert_eq!(data["MerchantAddress"], Value::Null);
        assert_eq!(data["fraudScore"], 50);
        assert_eq!(data["confidentScore"], 30);
        assert_eq!(
            data["reason"],
            "Subtotal + Tax != Total (±0.05); VAT not ~15% of Subtotal"
        );
    }

    #[tokio::test]
    async fn test_bad_uploads_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(upload("/analyze/image", "file", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(upload("/analyze/image", "attachment", &png_bytes(8, 8)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(upload("/analyze", "image", b"plain text, not a picture"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/analyze/base64",
                json!({"image_base64": "@@not-base64@@"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_base64_analysis() {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        let dir = tempfile::tempdir().unwrap();
        let encoded = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(png_bytes(50, 30))
        );
        let response = app(dir.path())
            .oneshot(post_json(
                "/analyze/base64",
                json!({"image_base64": encoded, "reference": "B-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["Tax"], 15.0);
    }

    #[tokio::test]
    async fn test_upstream_failure_maps_to_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(StubModel {
            fail: true,
            ..StubModel::default()
        });
        let (app, state) = app_with(config(dir.path(), KEY), model.clone());

        let response = app
            .oneshot(upload("/analyze/image", "file", &png_bytes(16, 16)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        let errors = state.repository.list_errors(5).await.unwrap();
        assert_eq!(errors[0].stage, "probe");
        assert!(state.metrics.gather().contains("upstream_errors_total 1"));
    }

    #[tokio::test]
    async fn test_prompt_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(post_json(
                "/prompts/active",
                json!({"system_prompt": "Extract receipts as JSON."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"message": "Prompt updated", "version": 1})
        );

        let response = app.clone().oneshot(get("/prompts/active")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["system_prompt"], "Extract receipts as JSON.");
        assert_eq!(body["source"], "file");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("prompt.txt")).unwrap(),
            "Extract receipts as JSON.\n"
        );

        let response = app.clone().oneshot(get("/prompts/quick")).await.unwrap();
        assert_eq!(json_body(response).await["source"], "fallback");

        let response = app
            .oneshot(post_json("/prompts/quick", json!({"system_prompt": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_prompt_kind_returns_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app.clone().oneshot(get("/prompts/bogus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = json_body(response).await;
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["message"].as_str().unwrap().contains("bogus"));

        let response = app
            .oneshot(post_json("/prompts/bogus", json!({"system_prompt": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_venue_reload() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        std::fs::write(
            dir.path().join("venue_profiles.json"),
            r#"[{"MerchantName_Keyword": "Kudu"}, {"MerchantName_Keyword": "Herfy"}]"#,
        )
        .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/venues/reload")
                    .header("X-API-Key", KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"profiles": 2}));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), KEY);
        config.server.max_request_size = 1024;
        let (app, _) = app_with(config, Arc::new(StubModel::default()));

        let body = multipart("file", &vec![0u8; 4096]);
        let request = Request::builder()
            .method("POST")
            .uri("/analyze/image")
            .header("X-API-Key", KEY)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        app.clone()
            .oneshot(upload("/analyze", "image", &png_bytes(20, 20)))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("receipt_analyses_total{mode=\"quick\"} 1"));
        assert!(text.contains("model_tokens_total 15"));
    }
}
