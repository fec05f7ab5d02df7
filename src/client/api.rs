//! Typed HTTP client for the NeoLearn API.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::{ClientError, SessionStore};
use crate::errors::ErrorResponse;
use crate::models::{
    Attachment, ChatRequest, ChatResponse, Conversation, Credentials, FlashcardSet,
    GeneratedFlashcards, GeneratedQuiz, Message, OkResponse, QuizAttempt, SubmitQuizResponse,
    TokenResponse,
};

/// Calls the API on behalf of the session held in a [`SessionStore`].
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self, ClientError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    // ==================== AUTH ====================

    /// Register and keep the returned token.
    pub async fn register(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: TokenResponse = self
            .send_json(self.request(Method::POST, "/auth/register", false)?.json(&body))
            .await?;
        self.session.set_token(response.token)
    }

    /// Log in and keep the returned token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: TokenResponse = self
            .send_json(self.request(Method::POST, "/auth/login", false)?.json(&body))
            .await?;
        self.session.set_token(response.token)
    }

    /// Discard the token locally. The server keeps no session to end.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.session.logout()
    }

    // ==================== CHAT ====================

    /// Anonymous relay. The server keeps every exchange as an ownerless
    /// "Legacy Chat" conversation listed to all users, so never send text
    /// from a private conversation here.
    pub async fn chat(&self, message: &str) -> Result<ChatResponse, ClientError> {
        let body = ChatRequest {
            message: message.to_string(),
        };
        self.post("/chat", &body, false).await
    }

    // ==================== CONVERSATIONS ====================

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        self.get("/conversations").await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, ClientError> {
        self.get(&format!("/conversations/{}", id)).await
    }

    pub async fn create_conversation(
        &self,
        title: Option<&str>,
        first_message: Option<&Message>,
    ) -> Result<Conversation, ClientError> {
        let body = json!({ "title": title, "firstMessage": first_message });
        self.post("/conversations", &body, true).await
    }

    pub async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<Conversation, ClientError> {
        self.post(
            &format!("/conversations/{}/messages", conversation_id),
            message,
            true,
        )
        .await
    }

    pub async fn rename_conversation(
        &self,
        id: &str,
        title: &str,
    ) -> Result<Conversation, ClientError> {
        let request = self
            .request(Method::PATCH, &format!("/conversations/{}/title", id), true)?
            .json(&json!({ "title": title }));
        self.send_json(request).await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &format!("/conversations/{}", id), true)?;
        let _: serde_json::Value = self.send_json(request).await?;
        Ok(())
    }

    pub async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<Attachment, ClientError> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .request(Method::POST, "/conversations/upload", true)?
            .multipart(form);
        self.send_json(request).await
    }

    // ==================== QUIZ ====================

    pub async fn generate_quiz(
        &self,
        topic: &str,
        num_questions: i64,
    ) -> Result<GeneratedQuiz, ClientError> {
        let body = json!({ "topic": topic, "numQuestions": num_questions });
        self.post("/quiz/generate", &body, true).await
    }

    pub async fn submit_quiz(
        &self,
        topic: &str,
        total_questions: i64,
        correct: i64,
    ) -> Result<SubmitQuizResponse, ClientError> {
        let body = json!({
            "topic": topic,
            "totalQuestions": total_questions,
            "correct": correct,
        });
        self.post("/quiz/submit", &body, true).await
    }

    pub async fn quiz_history(&self) -> Result<Vec<QuizAttempt>, ClientError> {
        self.get("/quiz/history").await
    }

    // ==================== FLASHCARDS ====================

    pub async fn generate_flashcards(
        &self,
        topic: &str,
        num_cards: i64,
    ) -> Result<GeneratedFlashcards, ClientError> {
        let body = json!({ "topic": topic, "numCards": num_cards });
        self.post("/flashcards/generate", &body, true).await
    }

    pub async fn list_flashcards(&self) -> Result<Vec<FlashcardSet>, ClientError> {
        self.get("/flashcards").await
    }

    pub async fn delete_flashcards(&self, id: &str) -> Result<(), ClientError> {
        let request = self.request(Method::DELETE, &format!("/flashcards/{}", id), true)?;
        let _: OkResponse = self.send_json(request).await?;
        Ok(())
    }

    // ==================== PLUMBING ====================

    fn request(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
    ) -> Result<RequestBuilder, ClientError> {
        let request = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if !authenticated {
            return Ok(request);
        }
        match self.session.token()? {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(ClientError::NotAuthenticated),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send_json(self.request(Method::GET, path, true)?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<T, ClientError> {
        let request = self.request(Method::POST, path, authenticated)?.json(body);
        self.send_json(request).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into [`ClientError::Api`].
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => {
            let message = body.message.unwrap_or_else(|| body.error.clone());
            (body.error, message)
        }
        Err(_) => (
            "http_error".to_string(),
            if text.is_empty() {
                format!("Request failed with status {}", status.as_u16())
            } else {
                text
            },
        ),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
