//! Integration tests for the NeoLearn backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::auth::{TokenSigner, TOKEN_TTL_DAYS};
use crate::client::{ApiClient, ChatSession, Entry, SendState, SessionStore, FILES_ONLY_CONTENT};
use crate::config::{Config, Environment, GeminiConfig, LogFormat};
use crate::db::init_database;
use crate::errors::REDACTED_MESSAGE;
use crate::gateway::{GatewayError, GenerationGateway};
use crate::{create_router, AppState};

const TEST_SECRET: &str = "integration-test-secret";

/// Generation gateway with a swappable canned reply and a call counter.
struct MockGateway {
    reply: Mutex<Result<String, GatewayError>>,
    calls: AtomicUsize,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            reply: Mutex::new(Ok("Mock reply".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    fn set_reply(&self, reply: Result<&str, GatewayError>) {
        *self.reply.lock().unwrap() = reply.map(str::to_string);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationGateway for MockGateway {
    async fn generate(&self, _prompt: &str) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.lock().unwrap().clone()
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    gateway: Arc<MockGateway>,
    pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_environment(Environment::Development).await
    }

    async fn with_environment(environment: Environment) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");

        // Create config
        let config = Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            db_path,
            upload_dir: temp_dir.path().join("uploads"),
            jwt_secret: TEST_SECRET.to_string(),
            environment,
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
            frontend_origin: None,
            min_password_len: 6,
            max_messages_per_conversation: 50,
            chat_rate_limit: 60,
            chat_rate_window: Duration::from_secs(60),
            gemini: GeminiConfig {
                api_key: None,
                model: "test-model".to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
                timeout: Duration::from_secs(1),
            },
        };

        let gateway = Arc::new(MockGateway::new());
        let state = AppState::new(config, pool.clone(), gateway.clone())
            .await
            .expect("Failed to build state");
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        TestFixture {
            client: Client::new(),
            base_url,
            gateway,
            pool,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register a user and return their token.
    async fn register(&self, email: &str) -> String {
        let resp = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": "secret1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn chat(&self, message: &str) -> reqwest::Response {
        self.client
            .post(self.url("/chat"))
            .json(&json!({ "message": message }))
            .send()
            .await
            .unwrap()
    }

    async fn create_conversation(&self, token: &str, title: &str) -> Value {
        let resp = self
            .post(token, "/conversations", json!({ "title": title }))
            .await;
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

// ==================== HEALTH & ROUTING ====================

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture.client.get(fixture.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/api/nothing-here"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["path"], "/api/nothing-here");
    assert!(body.get("details").is_none());
}

// ==================== AUTH ====================

#[tokio::test]
async fn test_register_and_login() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    assert!(TokenSigner::new(TEST_SECRET).verify(&token).is_ok());

    // Duplicate in a different case
    let resp = fixture
        .client
        .post(fixture.url("/auth/register"))
        .json(&json!({ "email": "ADA@Example.com", "password": "secret2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "email_exists");

    let resp = fixture
        .client
        .post(fixture.url("/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "secret1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["token"].as_str().is_some());

    for (email, password) in [("ada@example.com", "wrong-pw"), ("bob@example.com", "secret1")] {
        let resp = fixture
            .client
            .post(fixture.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "invalid_credentials");
    }
}

#[tokio::test]
async fn test_register_validation() {
    let fixture = TestFixture::new().await;

    let cases = [
        json!({ "email": "not-an-email", "password": "secret1" }),
        json!({ "email": "ada@example.com", "password": "short" }),
        json!({ "email": "ada@example.com" }),
    ];
    for body in cases {
        let resp = fixture
            .client
            .post(fixture.url("/auth/register"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", body);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    let resp = fixture
        .client
        .post(fixture.url("/auth/register"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_protected_routes_require_valid_token() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    let user_id = TokenSigner::new(TEST_SECRET).verify(&token).unwrap();

    let resp = fixture
        .client
        .get(fixture.url("/conversations"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let expired = TokenSigner::new(TEST_SECRET)
        .issue_at(
            &user_id,
            chrono::Utc::now() - chrono::Duration::days(TOKEN_TTL_DAYS + 1),
        )
        .unwrap();
    let wrong_key = TokenSigner::new("some-other-secret").issue(&user_id).unwrap();

    for bad in [expired.as_str(), wrong_key.as_str(), "garbage"] {
        for path in ["/conversations", "/quiz/history", "/flashcards"] {
            assert_eq!(fixture.get(bad, path).await.status(), 401, "{}", path);
        }
    }

    assert_eq!(fixture.get(&token, "/conversations").await.status(), 200);
}

// ==================== CONVERSATIONS ====================

#[tokio::test]
async fn test_conversation_lifecycle() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;

    let resp = fixture.post(&token, "/conversations", json!({})).await;
    assert_eq!(resp.status(), 200);
    let conv: Value = resp.json().await.unwrap();
    assert_eq!(conv["title"], "New Conversation");
    assert_eq!(conv["messages"].as_array().unwrap().len(), 0);
    assert_eq!(conv["createdAt"], conv["updatedAt"]);
    let id = conv["id"].as_str().unwrap();

    for (role, content) in [("user", "What is osmosis?"), ("assistant", "Diffusion of water.")] {
        let resp = fixture
            .post(
                &token,
                &format!("/conversations/{}/messages", id),
                json!({ "role": role, "content": content }),
            )
            .await;
        assert_eq!(resp.status(), 200);
    }

    let resp = fixture.get(&token, &format!("/conversations/{}", id)).await;
    let conv: Value = resp.json().await.unwrap();
    let messages = conv["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "What is osmosis?");
    assert_eq!(messages[1]["role"], "assistant");

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/conversations/{}/title", id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "Osmosis" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let renamed: Value = resp.json().await.unwrap();
    assert_eq!(renamed["title"], "Osmosis");
    assert_eq!(renamed["messages"].as_array().unwrap().len(), 2);

    let resp = fixture
        .client
        .patch(fixture.url(&format!("/conversations/{}/title", id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .post(
            &token,
            &format!("/conversations/{}/messages", id),
            json!({ "role": "narrator", "content": "x" }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/conversations/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().is_some());

    assert_eq!(
        fixture.get(&token, &format!("/conversations/{}", id)).await.status(),
        404
    );
}

#[tokio::test]
async fn test_conversations_are_owner_scoped() {
    let fixture = TestFixture::new().await;
    let alice = fixture.register("alice@example.com").await;
    let bob = fixture.register("bob@example.com").await;

    let mine = fixture.create_conversation(&alice, "Alice's notes").await;
    let theirs = fixture.create_conversation(&bob, "Bob's notes").await;
    let theirs_id = theirs["id"].as_str().unwrap();

    let resp = fixture.chat("Hello there").await;
    assert_eq!(resp.status(), 200);
    let legacy: Value = resp.json().await.unwrap();

    let listed: Vec<Value> = fixture
        .get(&alice, "/conversations")
        .await
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = listed.iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&mine["id"].as_str().unwrap()));
    assert!(ids.contains(&legacy["id"].as_str().unwrap()));
    assert!(!ids.contains(&theirs_id));

    // Cross-user access is indistinguishable from absence
    assert_eq!(
        fixture.get(&alice, &format!("/conversations/{}", theirs_id)).await.status(),
        404
    );
    let resp = fixture
        .post(
            &alice,
            &format!("/conversations/{}/messages", theirs_id),
            json!({ "role": "user", "content": "sneaky" }),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let resp = fixture
        .client
        .patch(fixture.url(&format!("/conversations/{}/title", theirs_id)))
        .bearer_auth(&alice)
        .json(&json!({ "title": "Mine now" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let resp = fixture
        .client
        .delete(fixture.url(&format!("/conversations/{}", theirs_id)))
        .bearer_auth(&alice)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Legacy conversations are listed but not addressable
    let legacy_id = legacy["id"].as_str().unwrap();
    assert_eq!(
        fixture.get(&alice, &format!("/conversations/{}", legacy_id)).await.status(),
        404
    );

    // Bob's conversation is untouched
    let resp = fixture.get(&bob, &format!("/conversations/{}", theirs_id)).await;
    let conv: Value = resp.json().await.unwrap();
    assert_eq!(conv["title"], "Bob's notes");
    assert!(conv["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_and_serve() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;

    let bytes = b"\x89PNG\r\n\x1a\nfake image".to_vec();
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(bytes.clone())
            .file_name("cell.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/conversations/upload"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let attachment: Value = resp.json().await.unwrap();
    assert_eq!(attachment["name"], "cell.png");
    assert_eq!(attachment["mimeType"], "image/png");
    assert_eq!(attachment["sizeBytes"], bytes.len());
    assert_eq!(attachment["previewUrl"], attachment["url"]);

    let url = attachment["url"].as_str().unwrap().to_string();
    let served = fixture.client.get(fixture.url(&url)).send().await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().to_vec(), bytes);

    // The attachment can be carried by a message
    let conv = fixture.create_conversation(&token, "With files").await;
    let resp = fixture
        .post(
            &token,
            &format!("/conversations/{}/messages", conv["id"].as_str().unwrap()),
            json!({ "role": "user", "content": "See diagram", "files": [attachment] }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let conv: Value = resp.json().await.unwrap();
    assert_eq!(conv["messages"][0]["files"][0]["url"], url.as_str());

    // Disallowed type
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"echo hi".to_vec())
            .file_name("run.sh")
            .mime_str("text/x-shellscript")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/conversations/upload"))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // No token
    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"%PDF".to_vec())
            .file_name("a.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );
    let resp = fixture
        .client
        .post(fixture.url("/conversations/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

// ==================== QUIZ ====================

#[tokio::test]
async fn test_quiz_generate() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;

    fixture.gateway.set_reply(Ok(
        r#"[{"question":"Powerhouse of the cell?","options":["Nucleus","Mitochondria","Ribosome","Golgi"],"correctIndex":1}]"#,
    ));
    let resp = fixture
        .post(&token, "/quiz/generate", json!({ "topic": "Cells", "numQuestions": 1 }))
        .await;
    assert_eq!(resp.status(), 200);
    let quiz: Value = resp.json().await.unwrap();
    assert_eq!(quiz["topic"], "Cells");
    assert_eq!(quiz["questions"][0]["correctIndex"], 1);

    fixture.gateway.set_reply(Ok("Here are some questions about cells!"));
    let resp = fixture
        .post(&token, "/quiz/generate", json!({ "topic": "Cells" }))
        .await;
    assert_eq!(resp.status(), 200);
    let quiz: Value = resp.json().await.unwrap();
    assert_eq!(quiz["questions"], json!([]));

    let calls = fixture.gateway.calls();
    for body in [
        json!({ "topic": "Cells", "numQuestions": 0 }),
        json!({ "topic": "Cells", "numQuestions": 21 }),
        json!({ "topic": "  " }),
    ] {
        let resp = fixture.post(&token, "/quiz/generate", body).await;
        assert_eq!(resp.status(), 400);
    }
    assert_eq!(fixture.gateway.calls(), calls);

    fixture.gateway.set_reply(Err(GatewayError::Timeout));
    let resp = fixture
        .post(&token, "/quiz/generate", json!({ "topic": "Cells" }))
        .await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "gemini_error");
}

#[tokio::test]
async fn test_quiz_submit_and_history() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    let other = fixture.register("bob@example.com").await;

    for (total, correct, expected) in [(10, 8, 80), (3, 1, 33), (8, 1, 13)] {
        let resp = fixture
            .post(
                &token,
                "/quiz/submit",
                json!({ "topic": "Cells", "totalQuestions": total, "correct": correct }),
            )
            .await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["score"], expected);
        assert!(body["id"].as_str().is_some());
    }

    for body in [
        json!({ "topic": "Cells", "totalQuestions": 0, "correct": 0 }),
        json!({ "topic": "Cells", "totalQuestions": 5, "correct": 6 }),
        json!({ "topic": "Cells", "totalQuestions": 5, "correct": -1 }),
        json!({ "topic": "", "totalQuestions": 5, "correct": 1 }),
    ] {
        let resp = fixture.post(&token, "/quiz/submit", body).await;
        assert_eq!(resp.status(), 400);
    }

    let history: Vec<Value> = fixture
        .get(&token, "/quiz/history")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0]["score"], 13);
    assert_eq!(history[2]["score"], 80);
    assert_eq!(history[0]["totalQuestions"], 8);

    let history: Vec<Value> = fixture
        .get(&other, "/quiz/history")
        .await
        .json()
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_quiz_submit_huge_totals() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;

    let total: i64 = 100_000_000_000_000_000;
    let resp = fixture
        .post(
            &token,
            "/quiz/submit",
            json!({ "topic": "Cells", "totalQuestions": total, "correct": total }),
        )
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["score"], 100);
}

// ==================== FLASHCARDS ====================

#[tokio::test]
async fn test_flashcards() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    let other = fixture.register("bob@example.com").await;

    fixture.gateway.set_reply(Ok(
        "```json\n[{\"front\":\"ATP\",\"back\":\"Energy currency\"},{\"front\":\"DNA\",\"back\":\"Genetic code\"}]\n```",
    ));
    let resp = fixture
        .post(&token, "/flashcards/generate", json!({ "topic": "Biology", "numCards": 3 }))
        .await;
    assert_eq!(resp.status(), 201);
    let set: Value = resp.json().await.unwrap();
    assert_eq!(set["topic"], "Biology");
    assert_eq!(set["cards"].as_array().unwrap().len(), 2);
    let set_id = set["id"].as_str().unwrap().to_string();

    fixture.gateway.set_reply(Ok("no cards today"));
    let resp = fixture
        .post(&token, "/flashcards/generate", json!({ "topic": "Chemistry" }))
        .await;
    assert_eq!(resp.status(), 201);
    let empty: Value = resp.json().await.unwrap();
    assert_eq!(empty["cards"], json!([]));

    for num_cards in [2, 51] {
        let resp = fixture
            .post(
                &token,
                "/flashcards/generate",
                json!({ "topic": "Biology", "numCards": num_cards }),
            )
            .await;
        assert_eq!(resp.status(), 400);
    }

    let sets: Vec<Value> = fixture.get(&token, "/flashcards").await.json().await.unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0]["topic"], "Chemistry");
    let sets: Vec<Value> = fixture.get(&other, "/flashcards").await.json().await.unwrap();
    assert!(sets.is_empty());

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/flashcards/{}", set_id)))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .client
        .delete(fixture.url(&format!("/flashcards/{}", set_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true }));

    let sets: Vec<Value> = fixture.get(&token, "/flashcards").await.json().await.unwrap();
    assert_eq!(sets.len(), 1);
}

// ==================== CHAT RELAY ====================

#[tokio::test]
async fn test_chat_relay() {
    let fixture = TestFixture::new().await;

    fixture.gateway.set_reply(Ok("Mitochondria make ATP."));
    let resp = fixture.chat("What do mitochondria do?").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["reply"], "Mitochondria make ATP.");
    assert!(body["id"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());

    let row: (Option<String>, String, String) =
        sqlx::query_as("SELECT owner_id, title, messages FROM conversations WHERE id = ?")
            .bind(body["id"].as_str().unwrap())
            .fetch_one(&fixture.pool)
            .await
            .unwrap();
    assert!(row.0.is_none());
    assert_eq!(row.1, "Legacy Chat");
    let messages: Vec<Value> = serde_json::from_str(&row.2).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_chat_relay_errors() {
    let fixture = TestFixture::new().await;

    let resp = fixture.chat("").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let resp = fixture.chat(&"a".repeat(4001)).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(fixture.gateway.calls(), 0);

    assert_eq!(fixture.chat(&"a".repeat(4000)).await.status(), 200);

    fixture.gateway.set_reply(Err(GatewayError::Timeout));
    let resp = fixture.chat("hello").await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "gemini_error");

    fixture.gateway.set_reply(Err(GatewayError::Status {
        status: 503,
        message: "model overloaded".to_string(),
    }));
    let resp = fixture.chat("hello").await;
    assert_eq!(resp.status(), 503);

    fixture.gateway.set_reply(Ok("   "));
    let resp = fixture.chat("hello").await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "empty_response_from_model");

    // Only the one successful exchange was stored
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations")
        .fetch_one(&fixture.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_chat_rate_limit() {
    let fixture = TestFixture::new().await;

    for i in 0..60 {
        let resp = fixture.chat(&format!("question {}", i)).await;
        assert_eq!(resp.status(), 200, "request {}", i);
    }

    let resp = fixture.chat("one too many").await;
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(fixture.gateway.calls(), 60);

    // Authenticated routes are not affected
    let token = fixture.register("ada@example.com").await;
    assert_eq!(fixture.get(&token, "/conversations").await.status(), 200);
}

// ==================== ERROR REDACTION ====================

async fn insert_corrupt_conversation(pool: &SqlitePool, owner_id: Option<&str>) {
    sqlx::query(
        "INSERT INTO conversations (id, owner_id, title, messages, created_at, updated_at, version) VALUES ('corrupt', ?, 'Broken', 'not json', '2024-05-01T12:00:00.000000Z', '2024-05-01T12:00:00.000000Z', 1)",
    )
    .bind(owner_id)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_internal_errors_redacted_in_production() {
    let fixture = TestFixture::with_environment(Environment::Production).await;
    let token = fixture.register("ada@example.com").await;
    let owner = TokenSigner::new(TEST_SECRET).verify(&token).unwrap();
    insert_corrupt_conversation(&fixture.pool, Some(&owner)).await;

    let resp = fixture.get(&token, "/conversations").await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "internal_error");
    assert_eq!(body["message"], REDACTED_MESSAGE);
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_internal_errors_detailed_in_development() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    let owner = TokenSigner::new(TEST_SECRET).verify(&token).unwrap();
    insert_corrupt_conversation(&fixture.pool, Some(&owner)).await;

    let resp = fixture.get(&token, "/conversations").await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "internal_error");
    assert_ne!(body["message"], REDACTED_MESSAGE);
    assert!(body["details"]["detail"].as_str().unwrap().contains("JSON"));
}

#[tokio::test]
async fn test_corrupt_legacy_row_skipped_in_list() {
    let fixture = TestFixture::new().await;
    let token = fixture.register("ada@example.com").await;
    fixture.create_conversation(&token, "Mine").await;
    assert_eq!(fixture.chat("Hello").await.status(), 200);
    insert_corrupt_conversation(&fixture.pool, None).await;

    let resp = fixture.get(&token, "/conversations").await;
    assert_eq!(resp.status(), 200);
    let listed: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|c| c["id"] != "corrupt"));
}

// ==================== CLIENT ====================

#[tokio::test]
async fn test_client_session_against_server() {
    let fixture = TestFixture::new().await;

    let client = ApiClient::new(fixture.base_url.clone(), SessionStore::in_memory()).unwrap();
    client.register("ada@example.com", "secret1").await.unwrap();
    client.session().set_topic("Osmosis").unwrap();

    let conversation = client
        .create_conversation(Some("Osmosis"), None)
        .await
        .unwrap();
    client
        .session()
        .set_active_conversation(Some(conversation.id.clone()))
        .unwrap();

    let mut session = ChatSession::from_conversation(&conversation);
    fixture.gateway.set_reply(Ok("Water moves across a membrane."));
    let reply = session
        .send(&client, fixture.gateway.as_ref(), "What is osmosis?", vec![])
        .await
        .unwrap();
    assert_eq!(reply.content, "Water moves across a membrane.");
    assert_eq!(session.state(), SendState::Settled);

    let stored = client.get_conversation(&conversation.id).await.unwrap();
    assert_eq!(stored.messages.len(), 2);

    // A failed send keeps the user's message locally and on the server
    fixture.gateway.set_reply(Err(GatewayError::Timeout));
    assert!(session
        .send(&client, fixture.gateway.as_ref(), "And diffusion?", vec![])
        .await
        .is_err());
    assert_eq!(session.state(), SendState::Errored);
    assert_eq!(session.entries().len(), 4);
    assert!(matches!(session.entries()[3], Entry::Error(_)));

    let stored = client.get_conversation(&conversation.id).await.unwrap();
    assert_eq!(stored.messages.len(), 3);
    assert_eq!(stored.messages[2].content, "And diffusion?");

    client.logout().unwrap();
    assert!(client.session().token().unwrap().is_none());
    assert!(client.session().topic().unwrap().is_none());
    assert!(client.list_conversations().await.is_err());
}

#[tokio::test]
async fn test_client_send_stays_private() {
    let fixture = TestFixture::new().await;
    let bob = fixture.register("bob@example.com").await;

    let client = ApiClient::new(fixture.base_url.clone(), SessionStore::in_memory()).unwrap();
    client.register("ada@example.com", "secret1").await.unwrap();
    let conversation = client.create_conversation(None, None).await.unwrap();

    let private_text = "my private question about my diagnosis";
    let mut session = ChatSession::from_conversation(&conversation);
    fixture.gateway.set_reply(Ok("A private answer."));
    session
        .send(&client, fixture.gateway.as_ref(), private_text, vec![])
        .await
        .unwrap();

    let listed: Vec<Value> = fixture
        .get(&bob, "/conversations")
        .await
        .json()
        .await
        .unwrap();
    let listed = serde_json::to_string(&listed).unwrap();
    assert!(!listed.contains(private_text));
    assert!(!listed.contains("A private answer."));

    let legacy: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE owner_id IS NULL")
        .fetch_one(&fixture.pool)
        .await
        .unwrap();
    assert_eq!(legacy, 0);
}

#[tokio::test]
async fn test_client_files_only_send() {
    let fixture = TestFixture::new().await;

    let client = ApiClient::new(fixture.base_url.clone(), SessionStore::in_memory()).unwrap();
    client.register("ada@example.com", "secret1").await.unwrap();
    let attachment = client
        .upload("cell.png", "image/png", b"\x89PNG\r\n\x1a\nfake image".to_vec())
        .await
        .unwrap();
    let conversation = client.create_conversation(None, None).await.unwrap();

    let mut session = ChatSession::from_conversation(&conversation);
    session
        .send(&client, fixture.gateway.as_ref(), "", vec![attachment.clone()])
        .await
        .unwrap();
    assert_eq!(session.state(), SendState::Settled);

    let stored = client.get_conversation(&conversation.id).await.unwrap();
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].content, FILES_ONLY_CONTENT);
    assert_eq!(stored.messages[0].files, vec![attachment]);
    assert_eq!(stored.messages[1].content, "Mock reply");
}
