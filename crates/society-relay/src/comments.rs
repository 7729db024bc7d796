use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use society_types::api::{ApiError, Claims, HistoryResponse, PostCommentRequest};
use society_types::models::{Author, ComplaintId};

use crate::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            message: message.to_string(),
        }),
    )
}

fn complaint_id(raw: String) -> ApiResult<ComplaintId> {
    ComplaintId::new(raw).ok_or_else(|| bad_request("Complaint id is required"))
}

pub async fn get_comments(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let complaint_id = complaint_id(raw_id)?;
    let comments = state.dispatcher.history(&complaint_id).await;

    Ok(Json(HistoryResponse {
        comments,
        me: Some(claims.sub),
    }))
}

/// REST path for posting, as the portal's list view does it. The comment is
/// delivered to live viewers the same way a gateway send is.
pub async fn post_comment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PostCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let complaint_id = complaint_id(raw_id)?;
    if req.message.trim().is_empty() {
        return Err(bad_request("Message cannot be empty"));
    }

    info!("{} ({}) commented on {} via REST", claims.name, claims.sub, complaint_id);
    let author = Author {
        id: claims.sub,
        display_name: claims.name,
        role: claims.role,
    };
    let message = state
        .dispatcher
        .post_message(complaint_id, author, req.message)
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}
