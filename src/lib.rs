//! NeoLearn Backend
//!
//! REST backend for the NeoLearn study assistant: accounts, owner-scoped
//! conversations, generated quizzes and flashcards, and an anonymous chat
//! relay, with SQLite persistence and a pluggable text-generation gateway.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod rate_limit;
pub mod services;
pub mod uploads;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use errors::AppError;
use gateway::GenerationGateway;
use rate_limit::RateLimiter;
use services::conversations::ConversationService;
use uploads::{UploadStore, MAX_UPLOAD_BYTES, UPLOADS_ROUTE};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub conversations: ConversationService,
    pub auth: Arc<auth::AuthService>,
    pub gateway: Arc<dyn GenerationGateway>,
    pub uploads: UploadStore,
    pub chat_limiter: RateLimiter,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(
        config: Config,
        pool: SqlitePool,
        gateway: Arc<dyn GenerationGateway>,
    ) -> Result<Self, AppError> {
        let repo = Repository::new(pool);
        let uploads = UploadStore::new(config.upload_dir.clone()).await?;

        Ok(Self {
            conversations: ConversationService::new(
                repo.clone(),
                config.max_messages_per_conversation,
            ),
            repo,
            auth: Arc::new(auth::AuthService::new(
                &config.jwt_secret,
                config.min_password_len,
            )),
            gateway,
            uploads,
            chat_limiter: RateLimiter::new(config.chat_rate_limit, config.chat_rate_window),
            config: Arc::new(config),
            started_at: Instant::now(),
        })
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.frontend_origin.as_deref());

    // Bearer token required
    let protected_routes = Router::new()
        // Conversations
        .route(
            "/conversations",
            get(api::list_conversations).post(api::create_conversation),
        )
        .route(
            "/conversations/upload",
            post(api::upload_attachment)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        )
        .route(
            "/conversations/{id}",
            get(api::get_conversation).delete(api::delete_conversation),
        )
        .route("/conversations/{id}/messages", post(api::append_message))
        .route("/conversations/{id}/title", patch(api::rename_conversation))
        // Quiz
        .route("/quiz/generate", post(api::generate_quiz))
        .route("/quiz/submit", post(api::submit_quiz))
        .route("/quiz/history", get(api::quiz_history))
        // Flashcards
        .route("/flashcards", get(api::list_flashcards))
        .route("/flashcards/generate", post(api::generate_flashcards))
        .route("/flashcards/{id}", delete(api::delete_flashcards))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_auth,
        ));

    // Anonymous, rate limited
    let chat_routes = Router::new()
        .route("/chat", post(api::send_chat))
        .route_layer(middleware::from_fn_with_state(
            state.chat_limiter.clone(),
            rate_limit::chat_rate_limit,
        ));

    let public_routes = Router::new()
        .route("/auth/register", post(api::register))
        .route("/auth/login", post(api::login))
        .route("/health", get(api::health_check));

    Router::new()
        .merge(protected_routes)
        .merge(chat_routes)
        .merge(public_routes)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.uploads.base_path()))
        .fallback(errors::not_found)
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(middleware::from_fn_with_state(
            state.config.environment,
            errors::redact_internal_errors,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match frontend_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(AllowOrigin::exact(origin)),
        Some(Err(_)) => {
            tracing::warn!("NEOLEARN_FRONTEND_ORIGIN is not a valid header value; allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests;
