use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tower_cookies::Cookies;

use crate::{database::Database, utils::verify_token};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CurrentUser {
    pub id: i32,
    pub name: String,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }
}

/// Resolve the requester from a `Authorization: Bearer` header or the
/// `auth_token` cookie. The user row is re-read on every request so role
/// changes and deletions take effect immediately.
pub async fn get_current_user(
    headers: &HeaderMap,
    cookies: &Cookies,
    db: &Database,
) -> Option<CurrentUser> {
    let token = bearer_token(headers)
        .or_else(|| cookies.get("auth_token").map(|c| c.value().to_string()))?;

    let claims = verify_token(&token).ok()?;
    let user_id: i32 = claims.sub.parse().ok()?;

    sqlx::query_as::<_, CurrentUser>("SELECT id, name, role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
        .ok()?
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}
