use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    error::ApiError,
    middleware::{get_current_user, CurrentUser},
    models::{Vendor, VendorInput, WalletEntry},
};

use super::transactions::Pagination;

/// Wallet rows plus the user's expenses presented in the same shape, so the
/// ledger view shows both sides of the balance.
const EXPENSES_AS_WALLET: &str = "SELECT id, user_id, NULL::integer AS approval_id,
    sub_category AS category, total AS amount, 'expense' AS type, main_category,
    sub_category, branch, date, icon, color, invoice, gst, transaction_from,
    transaction_to, vendor_name, vendor_number, vendor_gst, NULL::date AS end_date,
    description AS note, created_at
 FROM expenses WHERE user_id = $1";

fn ensure_can_view(user: &CurrentUser, target_user_id: i32) -> Result<(), ApiError> {
    if user.is_admin() || user.id == target_user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not allowed".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct AddWallet {
    amount: Option<Decimal>,
    date: Option<NaiveDate>,
    user_id: Option<i32>,
    branch: Option<String>,
    note: Option<String>,
}

/// Manual income credit, not tied to any approval.
pub async fn add_wallet(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(form): Json<AddWallet>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (amount, date, user_id) = match (form.amount, form.date, form.user_id) {
        (Some(amount), Some(date), Some(user_id)) => (amount, date, user_id),
        _ => return Err(ApiError::BadRequest("All fields are required".to_string())),
    };

    sqlx::query(
        "INSERT INTO wallet (user_id, amount, type, date, branch, note)
         VALUES ($1, $2, 'income', $3, $4, $5)",
    )
    .bind(user_id)
    .bind(amount)
    .bind(date)
    .bind(&form.branch)
    .bind(&form.note)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Wallet amount added successfully" })))
}

/// Full ledger for one user: wallet credits merged with their expenses, plus
/// income/expense/balance totals.
pub async fn get_wallet_entries(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(user_id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    ensure_can_view(&user, user_id)?;

    let income: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM wallet WHERE user_id = $1 AND type = 'income'",
    )
    .bind(user_id)
    .fetch_one(&db)
    .await?;

    let expense: Decimal =
        sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM expenses WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&db)
            .await?;

    let mut entries: Vec<WalletEntry> =
        sqlx::query_as("SELECT * FROM wallet WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&db)
            .await?;

    let expense_entries: Vec<WalletEntry> = sqlx::query_as(EXPENSES_AS_WALLET)
        .bind(user_id)
        .fetch_all(&db)
        .await?;

    entries.extend(expense_entries);
    entries.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(Json(json!({
        "entries": entries,
        "wallet": income - expense,
        "income": income,
        "expense": expense,
    })))
}

pub async fn get_wallet_paginated(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(user_id): Path<i32>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    ensure_can_view(&user, user_id)?;

    let (page, limit, offset) = pagination.resolve();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&db)
        .await?;
    let total_pages = (total + limit - 1) / limit;

    let entries: Vec<WalletEntry> = sqlx::query_as(
        "SELECT * FROM wallet WHERE user_id = $1 ORDER BY date DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "totalPages": total_pages,
        "entries": entries,
    })))
}

#[derive(Debug, Deserialize)]
pub struct WalletDetailsQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

/// Per-user received/spend/balance rollup for every non-admin account,
/// optionally limited to a date range.
pub async fn get_wallet_details(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(range): Query<WalletDetailsQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin only".to_string()));
    }

    let users: Vec<(i32, String, String)> =
        sqlx::query_as("SELECT id, name, email FROM users WHERE role != 'admin'")
            .fetch_all(&db)
            .await?;

    let mut details = Vec::with_capacity(users.len());
    for (id, name, email) in users {
        let (received, spend): (Decimal, Decimal) = match (range.start_date, range.end_date) {
            (Some(from), Some(to)) => {
                let received = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(amount), 0) FROM wallet
                     WHERE user_id = $1 AND type = 'income' AND date >= $2 AND date <= $3",
                )
                .bind(id)
                .bind(from)
                .bind(to)
                .fetch_one(&db)
                .await?;
                let spend = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(total), 0) FROM expenses
                     WHERE user_id = $1 AND date >= $2 AND date <= $3",
                )
                .bind(id)
                .bind(from)
                .bind(to)
                .fetch_one(&db)
                .await?;
                (received, spend)
            }
            _ => {
                let received = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(amount), 0) FROM wallet
                     WHERE user_id = $1 AND type = 'income'",
                )
                .bind(id)
                .fetch_one(&db)
                .await?;
                let spend = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(total), 0) FROM expenses WHERE user_id = $1",
                )
                .bind(id)
                .fetch_one(&db)
                .await?;
                (received, spend)
            }
        };

        details.push(json!({
            "id": id,
            "name": name,
            "email": email,
            "received": received,
            "spend": spend,
            "balance": received - spend,
        }));
    }

    Ok(Json(Value::Array(details)))
}

pub async fn get_all_wallet_transactions(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin only".to_string()));
    }

    let entries: Vec<WalletEntry> = sqlx::query_as("SELECT * FROM wallet ORDER BY date DESC")
        .fetch_all(&db)
        .await?;

    Ok(Json(json!({ "entries": entries })))
}

pub async fn get_vendors(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Vec<Vendor>>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let vendors = sqlx::query_as::<_, Vendor>("SELECT * FROM vendors ORDER BY name ASC")
        .fetch_all(&db)
        .await?;

    Ok(Json(vendors))
}

pub async fn add_vendor(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(form): Json<VendorInput>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let name = match form.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ApiError::BadRequest("Vendor name is required".to_string())),
    };

    sqlx::query(
        "INSERT INTO vendors (name, number, company_name, gst, email, address)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(name)
    .bind(&form.number)
    .bind(&form.company_name)
    .bind(&form.gst)
    .bind(&form.email)
    .bind(&form.address)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Vendor added successfully" })))
}
