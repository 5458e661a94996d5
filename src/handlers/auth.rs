use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;
use tower_cookies::{Cookie, Cookies};

use crate::{
    database::Database,
    error::ApiError,
    middleware::get_current_user,
    models::{CreateUser, LoginRequest, User, UserResponse},
    utils::{create_token, hash_password, verify_password},
};

pub async fn login(
    State(db): State<Database>,
    cookies: Cookies,
    Json(form): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&form.email)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    if !verify_password(&form.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = create_token(user.id, user.role.clone())
        .map_err(|_| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    // Set secure HTTP-only cookie alongside the bearer token in the body
    let cookie = Cookie::build(("auth_token", token.clone()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(24))
        .build();
    cookies.add(cookie);

    Ok(Json(json!({
        "user": UserResponse::from(user),
        "token": token,
    })))
}

pub async fn logout(cookies: Cookies) -> Json<Value> {
    cookies.remove(Cookie::from("auth_token"));
    Json(json!({ "message": "Logged out successfully" }))
}

pub async fn me(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<UserResponse>, ApiError> {
    let current = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(current.id)
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

pub async fn create_user(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(form): Json<CreateUser>,
) -> Result<Json<Value>, ApiError> {
    let current = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    if !current.is_admin() {
        return Err(ApiError::Forbidden(
            "You don't have permission to create users.".to_string(),
        ));
    }

    if form.name.is_empty() || form.email.is_empty() || form.password.is_empty() || form.role.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".to_string()));
    }

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&form.email)
        .fetch_optional(&db)
        .await?;

    if existing.is_some() {
        return Err(ApiError::BadRequest("Email already exists".to_string()));
    }

    let password_hash = hash_password(&form.password)?;

    let (user_id,): (i32,) = sqlx::query_as(
        "INSERT INTO users (name, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(&form.name)
    .bind(&form.email)
    .bind(&password_hash)
    .bind(&form.role)
    .fetch_one(&db)
    .await?;

    Ok(Json(json!({
        "message": "User created successfully",
        "userId": user_id,
    })))
}

#[derive(Debug, Serialize, FromRow)]
pub struct UserListItem {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

// Everyone logged in can see the user list
pub async fn list_users(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Vec<UserListItem>>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let users = sqlx::query_as::<_, UserListItem>(
        "SELECT id, name, email, role, created_at FROM users ORDER BY id DESC",
    )
    .fetch_all(&db)
    .await?;

    Ok(Json(users))
}

pub async fn delete_user(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let current = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    if !current.is_admin() {
        return Err(ApiError::Forbidden(
            "You do not have permission to delete users.".to_string(),
        ));
    }

    if id == current.id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account.".to_string(),
        ));
    }

    let target: Option<(i32, String)> = sqlx::query_as("SELECT id, role FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&db)
        .await?;

    let (target_id, target_role) =
        target.ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if target_role.eq_ignore_ascii_case("admin") {
        return Err(ApiError::Forbidden("Admin users cannot be deleted.".to_string()));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(target_id)
        .execute(&db)
        .await?;

    Ok(Json(json!({ "message": "User deleted" })))
}
