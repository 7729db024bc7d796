use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info};
use uuid::Uuid;

use society_types::api::{Claims, TokenRequest, TokenResponse};
use society_types::models::Role;

use crate::AppState;

/// Issue a signed bearer token valid for 30 days.
pub fn create_token(secret: &str, user_id: &str, name: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| debug!("Rejected token: {}", e))
    .ok()
}

/// Bearer token from the `Authorization` header, if present.
pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Validate the bearer token and stash its claims in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = decode_token(&state.jwt_secret, token).ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Development login: anyone can ask for a token under any name and role.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = Uuid::new_v4().to_string();
    let token = create_token(&state.jwt_secret, &user_id, name, req.role)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("Issued dev token for {} ({}, {})", name, user_id, req.role.as_str());
    Ok(Json(TokenResponse { user_id, token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let token = create_token("secret", "u-1", "Asha", Role::Admin).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.name, "Asha");
        assert_eq!(claims.role, Role::Admin);

        assert!(decode_token("other-secret", &token).is_none());
        assert!(decode_token("secret", "garbage").is_none());
    }

    #[test]
    fn bearer_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer(&headers), None);
    }
}
