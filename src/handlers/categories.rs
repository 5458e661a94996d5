use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    error::ApiError,
    middleware::get_current_user,
    models::{
        CategoryStyle, ExpenseCategory, ExpenseCategoryInput, IncomeCategory, IncomeCategoryInput,
    },
};

/// Resolve display metadata for a category pair. First match wins; duplicate
/// rows resolve to an arbitrary one. Missing categories yield null icon/color
/// rather than an error.
pub async fn expense_style(
    db: &Database,
    main_category: &str,
    sub_category: &str,
) -> Result<CategoryStyle, sqlx::Error> {
    let style = sqlx::query_as::<_, CategoryStyle>(
        "SELECT icon, color FROM expense_category
         WHERE main_category = $1 AND sub_category = $2 LIMIT 1",
    )
    .bind(main_category)
    .bind(sub_category)
    .fetch_optional(db)
    .await?;

    Ok(style.unwrap_or_default())
}

pub async fn income_style(db: &Database, category_name: &str) -> Result<CategoryStyle, sqlx::Error> {
    let style = sqlx::query_as::<_, CategoryStyle>(
        "SELECT icon, color FROM income_category WHERE category_name = $1 LIMIT 1",
    )
    .bind(category_name)
    .fetch_optional(db)
    .await?;

    Ok(style.unwrap_or_default())
}

pub async fn expense_categories(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Vec<ExpenseCategory>>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let categories = sqlx::query_as::<_, ExpenseCategory>(
        "SELECT id, main_category, sub_category, icon, color FROM expense_category ORDER BY id DESC",
    )
    .fetch_all(&db)
    .await?;

    Ok(Json(categories))
}

pub async fn income_categories(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Vec<IncomeCategory>>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let categories = sqlx::query_as::<_, IncomeCategory>(
        "SELECT id, category_name AS name, icon, color FROM income_category ORDER BY id DESC",
    )
    .fetch_all(&db)
    .await?;

    Ok(Json(categories))
}

pub async fn create_expense_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(input): Json<ExpenseCategoryInput>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query(
        "INSERT INTO expense_category (main_category, sub_category, icon, color)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&input.main_category)
    .bind(&input.sub_category)
    .bind(&input.icon)
    .bind(&input.color)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Expense category added" })))
}

pub async fn create_income_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(input): Json<IncomeCategoryInput>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query("INSERT INTO income_category (category_name, icon, color) VALUES ($1, $2, $3)")
        .bind(&input.name)
        .bind(&input.icon)
        .bind(&input.color)
        .execute(&db)
        .await?;

    Ok(Json(json!({ "message": "Income category added" })))
}

pub async fn update_expense_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
    Json(input): Json<ExpenseCategoryInput>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query(
        "UPDATE expense_category
         SET main_category = $1, sub_category = $2, icon = $3, color = $4
         WHERE id = $5",
    )
    .bind(&input.main_category)
    .bind(&input.sub_category)
    .bind(&input.icon)
    .bind(&input.color)
    .bind(id)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Expense category updated" })))
}

pub async fn update_income_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
    Json(input): Json<IncomeCategoryInput>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query("UPDATE income_category SET category_name = $1, icon = $2, color = $3 WHERE id = $4")
        .bind(&input.name)
        .bind(&input.icon)
        .bind(&input.color)
        .bind(id)
        .execute(&db)
        .await?;

    Ok(Json(json!({ "message": "Income category updated" })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteCategoryOptions {
    #[serde(rename = "deleteMain")]
    delete_main: Option<String>,
}

/// Delete one sub-category, or the whole main category when `deleteMain=true`.
pub async fn delete_expense_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
    Query(options): Query<DeleteCategoryOptions>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    if options.delete_main.as_deref() == Some("true") {
        let main_category: Option<(String,)> =
            sqlx::query_as("SELECT main_category FROM expense_category WHERE id = $1")
                .bind(id)
                .fetch_optional(&db)
                .await?;

        let (main_category,) =
            main_category.ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

        sqlx::query("DELETE FROM expense_category WHERE main_category = $1")
            .bind(&main_category)
            .execute(&db)
            .await?;

        return Ok(Json(json!({
            "message": format!("Main category '{}' and all sub-categories deleted", main_category)
        })));
    }

    sqlx::query("DELETE FROM expense_category WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await?;

    Ok(Json(json!({ "message": "Sub-category deleted" })))
}

pub async fn delete_income_category(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query("DELETE FROM income_category WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await?;

    Ok(Json(json!({ "message": "Income category deleted" })))
}
