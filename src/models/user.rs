//! User identity and credential models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. Never serialized; the hash stays server-side.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for register and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
