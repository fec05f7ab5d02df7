//! Authentication: credential checks, session tokens and the bearer-token gate.

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenSigner, TOKEN_TTL_DAYS};

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::db::Repository;
use crate::errors::AppError;

const MAX_EMAIL_LEN: usize = 254;

/// Identity bound to a request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
}

/// Registers users, checks credentials and verifies tokens.
pub struct AuthService {
    signer: TokenSigner,
    min_password_len: usize,
}

impl AuthService {
    pub fn new(jwt_secret: &str, min_password_len: usize) -> Self {
        Self {
            signer: TokenSigner::new(jwt_secret),
            min_password_len,
        }
    }

    /// Create an account and return a session token for it.
    pub async fn register(
        &self,
        repo: &Repository,
        email: &str,
        password: &str,
    ) -> Result<String, AppError> {
        let email = normalize_email(email)?;
        self.check_password(password)?;

        if repo.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict {
                code: crate::errors::codes::EMAIL_EXISTS,
                message: "An account with this email already exists".to_string(),
            });
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

        // A racing registration still loses at the unique index.
        let user = repo.create_user(&email, &password_hash).await?;
        tracing::info!(user_id = %user.id, "Registered new user");
        self.signer.issue(&user.id)
    }

    /// Check credentials and return a fresh session token.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(
        &self,
        repo: &Repository,
        email: &str,
        password: &str,
    ) -> Result<String, AppError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }

        let Some(user) = repo.find_user_by_email(&email).await? else {
            return Err(AppError::InvalidCredentials);
        };

        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let matches =
            tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
                .await
                .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))??;

        if !matches {
            return Err(AppError::InvalidCredentials);
        }
        self.signer.issue(&user.id)
    }

    /// Return the identity id of a valid token.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        self.signer.verify(token)
    }

    fn check_password(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < self.min_password_len {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                self.min_password_len
            )));
        }
        Ok(())
    }
}

/// Trim and lower-case an email, rejecting anything that is not shaped like one.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let invalid = || AppError::Validation("Invalid email address".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid());
    }
    Ok(email)
}

/// Bearer-token gate for protected routes.
///
/// Runs before the handler: on failure it answers 401 and the handler (and
/// therefore any store access) never runs. On success the [`Caller`] is
/// inserted into the request extensions.
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let Some(token) = token else {
        return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    match auth.verify(&token) {
        Ok(user_id) => {
            request.extensions_mut().insert(Caller { user_id });
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
