use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use axum_extra::extract::Multipart;
use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    error::ApiError,
    handlers::categories,
    middleware::{get_current_user, CurrentUser},
    models::{
        encode_invoice, Approval, ApprovalWithUser, Expense, ExpenseWithUser, IncomeWithUser,
    },
    reconcile::{self, Actor, Located, RecordPatch, Transition},
    utils::{save_invoices, UploadedFile},
};

#[derive(Debug, Default)]
struct TransactionForm {
    user_id: Option<i32>,
    branch: Option<String>,
    date: Option<NaiveDate>,
    total: Option<Decimal>,
    main_category: Option<String>,
    sub_category: Option<String>,
    description: Option<String>,
    spend_mode: Option<String>,
    gst: Option<String>,
    transaction_from: Option<String>,
    transaction_to: Option<String>,
    vendor_name: Option<String>,
    vendor_number: Option<String>,
    vendor_gst: Option<String>,
    end_date: Option<NaiveDate>,
    expense_id: Option<i32>,
    updates: Option<String>,
}

/// The `updates` payload of an edit, submitted as a JSON-encoded form field.
#[derive(Debug, Default, Deserialize)]
struct EditUpdates {
    total: Option<Decimal>,
    branch: Option<String>,
    date: Option<NaiveDate>,
    #[serde(rename = "mainCategory")]
    main_category: Option<String>,
    #[serde(rename = "subCategory")]
    sub_category: Option<String>,
    description: Option<String>,
    spend_mode: Option<String>,
    gst: Option<String>,
    transaction_from: Option<String>,
    transaction_to: Option<String>,
    vendor_name: Option<String>,
    vendor_number: Option<String>,
    vendor_gst: Option<String>,
    end_date: Option<NaiveDate>,
    source_type: Option<String>,
    #[serde(rename = "existingInvoices")]
    existing_invoices: Option<String>,
}

/// Pull text fields and `invoices` file parts out of a multipart submission.
async fn parse_transaction_multipart(
    mut multipart: Multipart,
) -> Result<(TransactionForm, Vec<UploadedFile>), ApiError> {
    let mut form = TransactionForm::default();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid form data".to_string()))?
    {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        if name == "invoices" {
            let filename = field.file_name().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid form data".to_string()))?;
            if let Some(filename) = filename {
                if !data.is_empty() {
                    files.push(UploadedFile { filename, data });
                }
            }
            continue;
        }

        let text_value = String::from_utf8(
            field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid form data".to_string()))?
                .to_vec(),
        )
        .map_err(|_| ApiError::BadRequest("Invalid form data".to_string()))?;

        if text_value.is_empty() {
            continue;
        }

        match name.as_str() {
            "user_id" => form.user_id = text_value.parse().ok(),
            "branch" => form.branch = Some(text_value),
            "date" => form.date = NaiveDate::parse_from_str(&text_value, "%Y-%m-%d").ok(),
            "total" => form.total = Decimal::from_str_radix(&text_value, 10).ok(),
            "mainCategory" => form.main_category = Some(text_value),
            "subCategory" => form.sub_category = Some(text_value),
            "description" => form.description = Some(text_value),
            "spend_mode" => form.spend_mode = Some(text_value),
            "gst" => form.gst = Some(text_value),
            "transaction_from" => form.transaction_from = Some(text_value),
            "transaction_to" => form.transaction_to = Some(text_value),
            "vendor_name" => form.vendor_name = Some(text_value),
            "vendor_number" => form.vendor_number = Some(text_value),
            "vendor_gst" => form.vendor_gst = Some(text_value),
            "end_date" => form.end_date = NaiveDate::parse_from_str(&text_value, "%Y-%m-%d").ok(),
            "expense_id" => form.expense_id = text_value.parse().ok(),
            "updates" => form.updates = Some(text_value),
            _ => (),
        }
    }

    Ok((form, files))
}

/// Direct expense submission: lands in `expenses` already approved, no
/// approval step.
pub async fn add_expense(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (form, files) = parse_transaction_multipart(multipart).await?;

    let (branch, date, total, main_category, sub_category) = match (
        form.branch,
        form.date,
        form.total,
        form.main_category,
        form.sub_category,
    ) {
        (Some(b), Some(d), Some(t), Some(m), Some(s)) => (b, d, t, m, s),
        _ => return Err(ApiError::BadRequest("Required fields missing".to_string())),
    };

    let style = categories::expense_style(&db, &main_category, &sub_category).await?;
    let invoice = encode_invoice(&save_invoices(files).await?);
    let user_id = form.user_id.unwrap_or(user.id);

    sqlx::query(
        "INSERT INTO expenses
            (user_id, branch, date, total, main_category, sub_category, description,
             icon, color, invoice, spend_mode, gst, status, transaction_from,
             transaction_to, vendor_name, vendor_number, vendor_gst)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'approved',
                 $13, $14, $15, $16, $17)",
    )
    .bind(user_id)
    .bind(&branch)
    .bind(date)
    .bind(total)
    .bind(&main_category)
    .bind(&sub_category)
    .bind(&form.description)
    .bind(&style.icon)
    .bind(&style.color)
    .bind(&invoice)
    .bind(&form.spend_mode)
    .bind(form.gst.as_deref().unwrap_or("No"))
    .bind(&form.transaction_from)
    .bind(&form.transaction_to)
    .bind(&form.vendor_name)
    .bind(&form.vendor_number)
    .bind(&form.vendor_gst)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Expense added successfully!" })))
}

/// Submission for approval: lands in `approvals` as `pending`.
pub async fn add_approval(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (form, files) = parse_transaction_multipart(multipart).await?;

    let (branch, date, total, main_category, sub_category) = match (
        form.branch,
        form.date,
        form.total,
        form.main_category,
        form.sub_category,
    ) {
        (Some(b), Some(d), Some(t), Some(m), Some(s)) => (b, d, t, m, s),
        _ => return Err(ApiError::BadRequest("Required fields missing".to_string())),
    };

    let style = categories::expense_style(&db, &main_category, &sub_category).await?;
    let invoice = encode_invoice(&save_invoices(files).await?);
    let user_id = form.user_id.unwrap_or(user.id);

    sqlx::query(
        "INSERT INTO approvals
            (user_id, original_expense_id, branch, date, amount, main_category,
             sub_category, description, icon, color, invoice, gst, status, is_edit,
             transaction_from, transaction_to, vendor_name, vendor_number, vendor_gst,
             end_date)
         VALUES ($1, NULL, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', FALSE,
                 $12, $13, $14, $15, $16, $17)",
    )
    .bind(user_id)
    .bind(&branch)
    .bind(date)
    .bind(total)
    .bind(&main_category)
    .bind(&sub_category)
    .bind(&form.description)
    .bind(&style.icon)
    .bind(&style.color)
    .bind(&invoice)
    .bind(form.gst.as_deref().unwrap_or("No"))
    .bind(&form.transaction_from)
    .bind(&form.transaction_to)
    .bind(&form.vendor_name)
    .bind(&form.vendor_number)
    .bind(&form.vendor_gst)
    .bind(form.end_date)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Approval request sent!" })))
}

pub async fn add_income(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (form, files) = parse_transaction_multipart(multipart).await?;

    let (branch, date, total, category) = match (form.branch, form.date, form.total, form.main_category) {
        (Some(b), Some(d), Some(t), Some(c)) => (b, d, t, c),
        _ => return Err(ApiError::BadRequest("Required fields missing".to_string())),
    };

    let style = categories::income_style(&db, &category).await?;
    let invoice = encode_invoice(&save_invoices(files).await?);
    let user_id = form.user_id.unwrap_or(user.id);

    sqlx::query(
        "INSERT INTO incomes (user_id, branch, date, total, category, description, invoice, icon, color)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(user_id)
    .bind(&branch)
    .bind(date)
    .bind(total)
    .bind(&category)
    .bind(&form.description)
    .bind(&invoice)
    .bind(&style.icon)
    .bind(&style.color)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "message": "Income added successfully" })))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    page: Option<i64>,
    limit: Option<i64>,
}

impl Pagination {
    pub(crate) fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(10).max(1);
        (page, limit, (page - 1) * limit)
    }
}

fn owner_scope(user: &CurrentUser) -> Option<i32> {
    if user.is_admin() {
        None
    } else {
        Some(user.id)
    }
}

async fn list_expenses(
    db: &Database,
    scope: Option<i32>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ExpenseWithUser>, sqlx::Error> {
    const COLUMNS: &str = "e.id, e.user_id, u.name AS user_name, e.branch, e.date, e.total,
        e.main_category, e.sub_category, e.description, e.invoice, e.icon, e.color,
        e.spend_mode, e.gst, e.status, e.transaction_from, e.transaction_to,
        e.vendor_name, e.vendor_number";

    match scope {
        Some(user_id) => {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM expenses e
                 LEFT JOIN users u ON u.id = e.user_id
                 WHERE e.user_id = $1
                 ORDER BY e.date DESC, e.id DESC
                 LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM expenses e
                 LEFT JOIN users u ON u.id = e.user_id
                 ORDER BY e.date DESC, e.id DESC
                 LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
    }
}

async fn count_expenses(db: &Database, scope: Option<i32>) -> Result<i64, sqlx::Error> {
    match scope {
        Some(user_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(db)
                .await
        }
        None => sqlx::query_scalar("SELECT COUNT(*) FROM expenses").fetch_one(db).await,
    }
}

async fn list_incomes(
    db: &Database,
    scope: Option<i32>,
    limit: i64,
    offset: i64,
) -> Result<Vec<IncomeWithUser>, sqlx::Error> {
    const COLUMNS: &str = "i.id, i.user_id, u.name AS user_name, i.branch, i.date, i.total,
        i.category, i.description, i.invoice, i.icon, i.color";

    match scope {
        Some(user_id) => {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM incomes i
                 LEFT JOIN users u ON u.id = i.user_id
                 WHERE i.user_id = $1
                 ORDER BY i.date DESC, i.id DESC
                 LIMIT $2 OFFSET $3"
            ))
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {COLUMNS} FROM incomes i
                 LEFT JOIN users u ON u.id = i.user_id
                 ORDER BY i.date DESC, i.id DESC
                 LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(db)
            .await
        }
    }
}

async fn count_incomes(db: &Database, scope: Option<i32>) -> Result<i64, sqlx::Error> {
    match scope {
        Some(user_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM incomes WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(db)
                .await
        }
        None => sqlx::query_scalar("SELECT COUNT(*) FROM incomes").fetch_one(db).await,
    }
}

pub async fn get_all_expenses(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let scope = owner_scope(&user);
    let (page, limit, offset) = pagination.resolve();

    let rows = list_expenses(&db, scope, limit, offset).await?;
    let total = count_expenses(&db, scope).await?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

pub async fn get_all_income(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let scope = owner_scope(&user);
    let (page, limit, offset) = pagination.resolve();

    let rows = list_incomes(&db, scope, limit, offset).await?;
    let total = count_incomes(&db, scope).await?;

    Ok(Json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

pub async fn get_expenses_paginated(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let scope = owner_scope(&user);
    let (page, limit, offset) = pagination.resolve();

    let total = count_expenses(&db, scope).await?;
    let total_pages = (total + limit - 1) / limit;
    let rows = list_expenses(&db, scope, limit, offset).await?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "totalPages": total_pages,
        "data": rows,
    })))
}

pub async fn get_income_paginated(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let scope = owner_scope(&user);
    let (page, limit, offset) = pagination.resolve();

    let total = count_incomes(&db, scope).await?;
    let total_pages = (total + limit - 1) / limit;
    let rows = list_incomes(&db, scope, limit, offset).await?;

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "totalPages": total_pages,
        "data": rows,
    })))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

fn prev_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

async fn income_total_between(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM incomes WHERE date >= $1 AND date < $2")
        .bind(from)
        .bind(to)
        .fetch_one(db)
        .await
}

async fn expense_total_between(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Decimal, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(total), 0) FROM expenses WHERE date >= $1 AND date < $2")
        .bind(from)
        .bind(to)
        .fetch_one(db)
        .await
}

/// This-month vs last-month totals, using half-open month ranges.
pub async fn get_summary(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let today = Local::now().date_naive();
    let this_month = month_start(today);
    let next_month = next_month_start(this_month);
    let last_month = prev_month_start(this_month);

    let income = income_total_between(&db, this_month, next_month).await?;
    let expenses = expense_total_between(&db, this_month, next_month).await?;
    let last_month_income = income_total_between(&db, last_month, this_month).await?;
    let last_month_expenses = expense_total_between(&db, last_month, this_month).await?;

    Ok(Json(json!({
        "income": income,
        "expenses": expenses,
        "balance": income - expenses,
        "lastMonthIncome": last_month_income,
        "lastMonthExpenses": last_month_expenses,
        "lastMonthBalance": last_month_income - last_month_expenses,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    date: Option<String>,
}

/// Totals for the month containing the given date.
pub async fn get_last_month_summary(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Value>, ApiError> {
    get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let date = query
        .date
        .ok_or_else(|| ApiError::BadRequest("Date is required".to_string()))?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid date format".to_string()))?;

    let start = month_start(date);
    let end = next_month_start(start);

    let income = income_total_between(&db, start, end).await?;
    let expenses = expense_total_between(&db, start, end).await?;

    Ok(Json(json!({
        "monthStart": start,
        "monthEnd": end,
        "income": income,
        "expenses": expenses,
        "balance": income - expenses,
    })))
}

const APPROVAL_COLUMNS: &str = "a.id, a.user_id, u.name AS user_name, a.original_expense_id,
    a.branch, a.date, a.amount AS total, a.main_category, a.sub_category, a.description,
    a.invoice, a.icon, a.color, a.gst, a.status, a.is_edit, a.transaction_from,
    a.transaction_to, a.vendor_name, a.vendor_number, a.end_date";

/// Pending approvals, scoped to the requester unless they are an admin.
pub async fn get_approvals(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Vec<ApprovalWithUser>>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let rows = match owner_scope(&user) {
        Some(user_id) => {
            sqlx::query_as(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approvals a
                 LEFT JOIN users u ON u.id = a.user_id
                 WHERE a.status = 'pending' AND a.user_id = $1
                 ORDER BY a.id DESC"
            ))
            .bind(user_id)
            .fetch_all(&db)
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approvals a
                 LEFT JOIN users u ON u.id = a.user_id
                 WHERE a.status = 'pending'
                 ORDER BY a.id DESC"
            ))
            .fetch_all(&db)
            .await?
        }
    };

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalAction {
    id: i32,
}

/// Admin approval: mark the approval approved and create-or-refresh its
/// wallet row. Re-approving re-runs the upsert rather than duplicating.
pub async fn approve_expense(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(payload): Json<ApprovalAction>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin only".to_string()));
    }

    let approval = reconcile::fetch_approval(&db, payload.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Request not found".to_string()))?;

    let mut tx = db.begin().await?;

    sqlx::query("UPDATE approvals SET status = 'approved', updated_at = now() WHERE id = $1")
        .bind(approval.id)
        .execute(&mut *tx)
        .await?;

    let patch = RecordPatch::from_approval(&approval);
    let refreshed = reconcile::upsert_wallet(&mut tx, approval.user_id, approval.id, &patch).await?;

    tx.commit().await?;

    let message = if refreshed {
        "Approved expense updated in wallet!"
    } else {
        "Approved successfully and added to wallet!"
    };
    Ok(Json(json!({ "message": message })))
}

/// Admin rejection: a hard delete of the approval. Refused once the approval
/// has been credited to the wallet; deleting it then would orphan the ledger
/// row.
pub async fn reject_expense(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(payload): Json<ApprovalAction>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;
    if !user.is_admin() {
        return Err(ApiError::Forbidden("Admin only".to_string()));
    }

    let mut tx = db.begin().await?;

    if reconcile::wallet_exists_for(&mut tx, payload.id).await? {
        return Err(ApiError::Conflict(
            "Request is already credited to the wallet".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM approvals WHERE id = $1")
        .bind(payload.id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Request not found".to_string()));
    }

    tx.commit().await?;

    Ok(Json(json!({ "message": "Request rejected successfully!" })))
}

fn patch_from_approval(
    approval: &Approval,
    updates: &EditUpdates,
    invoice: Option<String>,
) -> RecordPatch {
    RecordPatch {
        amount: updates.total.unwrap_or(approval.amount),
        branch: updates.branch.clone().unwrap_or_else(|| approval.branch.clone()),
        date: updates.date.unwrap_or(approval.date),
        main_category: updates
            .main_category
            .clone()
            .unwrap_or_else(|| approval.main_category.clone()),
        sub_category: updates
            .sub_category
            .clone()
            .unwrap_or_else(|| approval.sub_category.clone()),
        description: updates.description.clone(),
        invoice,
        spend_mode: updates.spend_mode.clone(),
        gst: updates.gst.clone().unwrap_or_else(|| approval.gst.clone()),
        icon: approval.icon.clone(),
        color: approval.color.clone(),
        transaction_from: updates.transaction_from.clone(),
        transaction_to: updates.transaction_to.clone(),
        vendor_name: updates.vendor_name.clone(),
        vendor_number: updates.vendor_number.clone(),
        vendor_gst: updates.vendor_gst.clone(),
        end_date: updates.end_date,
    }
}

fn patch_from_expense(
    expense: &Expense,
    updates: &EditUpdates,
    invoice: Option<String>,
) -> RecordPatch {
    RecordPatch {
        amount: updates.total.unwrap_or(expense.total),
        branch: updates.branch.clone().unwrap_or_else(|| expense.branch.clone()),
        date: updates.date.unwrap_or(expense.date),
        main_category: updates
            .main_category
            .clone()
            .unwrap_or_else(|| expense.main_category.clone()),
        sub_category: updates
            .sub_category
            .clone()
            .unwrap_or_else(|| expense.sub_category.clone()),
        description: updates.description.clone(),
        invoice,
        spend_mode: updates.spend_mode.clone(),
        gst: updates.gst.clone().unwrap_or_else(|| expense.gst.clone()),
        icon: expense.icon.clone(),
        color: expense.color.clone(),
        transaction_from: updates.transaction_from.clone(),
        transaction_to: updates.transaction_to.clone(),
        vendor_name: updates.vendor_name.clone(),
        vendor_number: updates.vendor_number.clone(),
        vendor_gst: updates.vendor_gst.clone(),
        end_date: updates.end_date,
    }
}

enum EditTarget {
    Approval(Box<Approval>, Located),
    Expense(Box<Expense>),
}

/// Edit a record wherever it currently lives. The dispatch is resolved by
/// `reconcile::plan_edit`; everything here is lookup, merging, and applying
/// the resulting transition in one transaction.
pub async fn edit_expense(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (form, files) = parse_transaction_multipart(multipart).await?;

    let expense_id = form
        .expense_id
        .ok_or_else(|| ApiError::BadRequest("Required fields missing".to_string()))?;
    let raw_updates = form
        .updates
        .ok_or_else(|| ApiError::BadRequest("Invalid updates format".to_string()))?;
    let updates: EditUpdates = serde_json::from_str(&raw_updates)
        .map_err(|_| ApiError::BadRequest("Invalid updates format".to_string()))?;

    // Combine the invoices the client kept with any newly uploaded ones.
    let mut invoices: Vec<String> = updates
        .existing_invoices
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    invoices.extend(save_invoices(files).await?);
    let invoice = encode_invoice(&invoices);

    let actor = if user.is_admin() { Actor::Admin } else { Actor::Owner };
    let scope = owner_scope(&user);

    let target = if updates.source_type.as_deref() == Some("approval") {
        let approval = reconcile::fetch_approval_scoped(&db, expense_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("Approval request not found".to_string()))?;
        EditTarget::Approval(Box::new(approval), Located::ApprovalHinted)
    } else if let Some(expense) = reconcile::fetch_expense_scoped(&db, expense_id, scope).await? {
        EditTarget::Expense(Box::new(expense))
    } else {
        let approval = reconcile::fetch_approval_scoped(&db, expense_id, scope)
            .await?
            .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
        EditTarget::Approval(Box::new(approval), Located::ApprovalLegacy)
    };

    let located = match &target {
        EditTarget::Approval(_, located) => *located,
        EditTarget::Expense(expense) => Located::Expense {
            approved: expense.status == "approved",
        },
    };
    let plan = reconcile::plan_edit(actor, located);

    let mut patch = match &target {
        EditTarget::Approval(approval, _) => patch_from_approval(approval, &updates, invoice),
        EditTarget::Expense(expense) => patch_from_expense(expense, &updates, invoice),
    };

    // Re-approval recomputes display metadata from the (possibly changed)
    // category; every other path keeps the denormalized copy.
    if matches!(plan, Transition::ReapproveInPlace { .. }) {
        let style = categories::expense_style(&db, &patch.main_category, &patch.sub_category).await?;
        patch.icon = style.icon;
        patch.color = style.color;
    }

    let mut tx = db.begin().await?;

    match (plan, &target) {
        (Transition::ReapproveInPlace { sync_expense }, EditTarget::Approval(approval, _)) => {
            reconcile::write_approval(&mut tx, approval.id, &patch, "approved", false).await?;
            if sync_expense {
                reconcile::sync_expense_from_approval(&mut tx, approval, &patch).await?;
                reconcile::delete_wallet_for(&mut tx, approval.id).await?;
            } else {
                reconcile::upsert_wallet(&mut tx, approval.user_id, approval.id, &patch).await?;
            }
        }
        (Transition::OverwriteExpense, EditTarget::Expense(expense)) => {
            reconcile::write_expense(&mut tx, expense.id, &patch, "approved").await?;
            reconcile::propagate_to_companions(&mut tx, expense.id, &patch, false).await?;
        }
        (Transition::Resubmit, EditTarget::Approval(approval, _)) => {
            reconcile::write_approval(&mut tx, approval.id, &patch, "pending", true).await?;
            reconcile::delete_wallet_for(&mut tx, approval.id).await?;
        }
        (Transition::RewritePending, EditTarget::Expense(expense)) => {
            reconcile::write_expense(&mut tx, expense.id, &patch, "pending").await?;
            let companions =
                reconcile::propagate_to_companions(&mut tx, expense.id, &patch, true).await?;
            for approval_id in companions {
                reconcile::delete_wallet_for(&mut tx, approval_id).await?;
            }
        }
        (Transition::ForkReapproval, EditTarget::Expense(expense)) => {
            reconcile::fork_reapproval(&mut tx, expense, user.id, &patch).await?;
        }
        // plan_edit derives the transition from the target, so these arms
        // cannot pair up.
        _ => return Err(ApiError::NotFound("Not found".to_string())),
    }

    tx.commit().await?;

    let message = match (plan, located) {
        (Transition::ForkReapproval, _) => "Approved expense sent for re-approval!",
        (Transition::OverwriteExpense, _) => "Expense updated successfully!",
        (_, Located::ApprovalHinted) => "Approval request updated!",
        _ => "Pending expense updated!",
    };
    Ok(Json(json!({ "message": message })))
}

/// Hard delete of an expense, releasing any approval that referenced it back
/// into the pending queue.
pub async fn delete_expense(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let expense = reconcile::fetch_expense_scoped(&db, id, owner_scope(&user))
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;

    let mut tx = db.begin().await?;
    reconcile::release_companions(&mut tx, expense.id).await?;
    sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(expense.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(json!({ "message": "Expense deleted successfully!" })))
}

/// Merged view of approved approvals and expenses, newest first.
pub async fn get_user_all_expenses(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let scope = owner_scope(&user);

    let approvals: Vec<ApprovalWithUser> = match scope {
        Some(user_id) => {
            sqlx::query_as(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approvals a
                 LEFT JOIN users u ON u.id = a.user_id
                 WHERE a.status = 'approved' AND a.user_id = $1"
            ))
            .bind(user_id)
            .fetch_all(&db)
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approvals a
                 LEFT JOIN users u ON u.id = a.user_id
                 WHERE a.status = 'approved'"
            ))
            .fetch_all(&db)
            .await?
        }
    };

    let expenses = list_expenses(&db, scope, i64::MAX, 0).await?;

    let mut all: Vec<(NaiveDate, Value)> = Vec::with_capacity(approvals.len() + expenses.len());
    for approval in &approvals {
        if let Ok(value) = serde_json::to_value(approval) {
            all.push((approval.date, value));
        }
    }
    for expense in &expenses {
        if let Ok(value) = serde_json::to_value(expense) {
            all.push((expense.date, value));
        }
    }
    all.sort_by(|a, b| b.0.cmp(&a.0));
    let merged: Vec<Value> = all.into_iter().map(|(_, value)| value).collect();

    Ok(Json(json!({
        "approvals": approvals,
        "expenses": expenses,
        "all": merged,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_bounds_are_half_open() {
        let start = month_start(date(2024, 1, 10));
        assert_eq!(start, date(2024, 1, 1));
        assert_eq!(next_month_start(start), date(2024, 2, 1));
        assert_eq!(prev_month_start(start), date(2023, 12, 1));
    }

    #[test]
    fn month_bounds_roll_over_year_ends() {
        assert_eq!(next_month_start(date(2024, 12, 25)), date(2025, 1, 1));
        assert_eq!(prev_month_start(date(2024, 1, 5)), date(2023, 12, 1));
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        let pagination = Pagination { page: None, limit: None };
        assert_eq!(pagination.resolve(), (1, 10, 0));

        let pagination = Pagination { page: Some(3), limit: Some(25) };
        assert_eq!(pagination.resolve(), (3, 25, 50));

        let pagination = Pagination { page: Some(0), limit: Some(0) };
        assert_eq!(pagination.resolve(), (1, 1, 0));
    }

    #[test]
    fn malformed_updates_payload_is_a_client_error() {
        assert!(serde_json::from_str::<EditUpdates>("not json").is_err());

        let updates: EditUpdates =
            serde_json::from_str(r#"{"total": 500, "mainCategory": "Travel"}"#).unwrap();
        assert_eq!(updates.total, Some(Decimal::from(500)));
        assert_eq!(updates.main_category.as_deref(), Some("Travel"));
        assert!(updates.source_type.is_none());
    }
}
