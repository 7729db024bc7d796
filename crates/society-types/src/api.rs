use serde::{Deserialize, Serialize};

use crate::models::{Message, Role};

// -- JWT Claims --

/// Bearer token claims shared by the relay's REST middleware and its gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub user_id: String,
    pub token: String,
}

// -- Comments --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostCommentRequest {
    pub message: String,
}

/// Body of a successful history fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub comments: Vec<Message>,
    /// The caller's own user id, when the server reports it.
    #[serde(default)]
    pub me: Option<String>,
}

/// Body of a failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

/// Either outcome of the history endpoint, decided by the payload shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HistoryReply {
    Page(HistoryResponse),
    Failure(ApiError),
}
