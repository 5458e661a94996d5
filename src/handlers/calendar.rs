use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Datelike, Local, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::{
    database::Database,
    error::ApiError,
    middleware::get_current_user,
    models::{CalendarEvent, EventUpdate, NewEvent},
};

pub async fn add_event(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(payload): Json<NewEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (title, event_date) = match (payload.title, payload.event_date) {
        (Some(title), Some(date)) if !title.is_empty() => (title, date),
        _ => {
            return Err(ApiError::BadRequest(
                "Title and event date are required".to_string(),
            ))
        }
    };

    let event_date = NaiveDate::parse_from_str(&event_date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid date format".to_string()))?;

    let (event_id,): (i32,) = sqlx::query_as(
        "INSERT INTO calendar_events (user_id, title, description, event_date, notes, category)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
    )
    .bind(user.id)
    .bind(&title)
    .bind(&payload.description)
    .bind(event_date)
    .bind(&payload.notes)
    .bind(payload.category.as_deref().unwrap_or("general"))
    .fetch_one(&db)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Event added successfully",
            "event_id": event_id,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct EventFilters {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    category: Option<String>,
}

pub async fn get_events(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(filters): Query<EventFilters>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let mut query_builder = sqlx::QueryBuilder::new(
        "SELECT * FROM calendar_events WHERE is_deleted = FALSE AND user_id = ",
    );
    query_builder.push_bind(user.id);

    if let (Some(from), Some(to)) = (filters.start_date, filters.end_date) {
        query_builder.push(" AND event_date BETWEEN ");
        query_builder.push_bind(from);
        query_builder.push(" AND ");
        query_builder.push_bind(to);
    }

    if let Some(category) = &filters.category {
        query_builder.push(" AND category = ");
        query_builder.push_bind(category);
    }

    query_builder.push(" ORDER BY event_date ASC");

    let events: Vec<CalendarEvent> = query_builder.build_query_as().fetch_all(&db).await?;

    Ok(Json(json!({ "success": true, "events": events })))
}

async fn fetch_event(
    db: &Database,
    id: i32,
    user_id: i32,
) -> Result<Option<CalendarEvent>, sqlx::Error> {
    sqlx::query_as::<_, CalendarEvent>(
        "SELECT * FROM calendar_events WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn get_event_by_id(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let event = fetch_event(&db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    Ok(Json(json!({ "success": true, "event": event })))
}

/// Partial update. Changing the date re-arms the reminder by clearing
/// `alert_sent`.
pub async fn update_event(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
    Json(payload): Json<EventUpdate>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    fetch_event(&db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    sqlx::query(
        "UPDATE calendar_events SET
            title = COALESCE($1, title),
            description = COALESCE($2, description),
            event_date = COALESCE($3, event_date),
            notes = COALESCE($4, notes),
            category = COALESCE($5, category),
            alert_sent = CASE WHEN $3 IS NULL THEN alert_sent ELSE FALSE END,
            updated_at = now()
         WHERE id = $6 AND user_id = $7",
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(payload.event_date)
    .bind(&payload.notes)
    .bind(&payload.category)
    .bind(id)
    .bind(user.id)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "success": true, "message": "Event updated successfully" })))
}

/// Soft delete; the row stays for audit but vanishes from every query.
pub async fn delete_event(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let result = sqlx::query(
        "UPDATE calendar_events SET is_deleted = TRUE, updated_at = now()
         WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE",
    )
    .bind(id)
    .bind(user.id)
    .execute(&db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Event not found".to_string()));
    }

    Ok(Json(json!({ "success": true, "message": "Event deleted successfully" })))
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|d| d.pred_opt()).map(|d| d.day()).unwrap_or(28)
}

/// Same day next month, clamped to the target month's length
/// (Jan 31 -> Feb 28/29).
fn next_month_same_day(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

async fn move_event(
    db: &Database,
    id: i32,
    user_id: i32,
    new_date: NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE calendar_events SET event_date = $1, alert_sent = FALSE, updated_at = now()
         WHERE id = $2 AND user_id = $3",
    )
    .bind(new_date)
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn move_to_next_day(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let event = fetch_event(&db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let new_date = next_day(event.event_date);
    move_event(&db, id, user.id, new_date).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Event moved to next day",
        "new_date": new_date,
    })))
}

pub async fn move_to_next_month(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let event = fetch_event(&db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    let new_date = next_month_same_day(event.event_date);
    move_event(&db, id, user.id, new_date).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Event moved to next month",
        "new_date": new_date,
    })))
}

pub async fn mark_event_completed(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    fetch_event(&db, id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event not found".to_string()))?;

    sqlx::query(
        "UPDATE calendar_events SET status = 'completed', updated_at = now()
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.id)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "success": true, "message": "Event marked as completed" })))
}

/// Events happening today or tomorrow that have not been alerted yet.
pub async fn get_pending_alerts(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let today = Local::now().date_naive();
    let tomorrow = next_day(today);

    let alerts: Vec<CalendarEvent> = sqlx::query_as(
        "SELECT * FROM calendar_events
         WHERE user_id = $1
           AND (event_date = $2 OR event_date = $3)
           AND alert_sent = FALSE
           AND is_deleted = FALSE
           AND status != 'completed'
         ORDER BY event_date ASC",
    )
    .bind(user.id)
    .bind(today)
    .bind(tomorrow)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": alerts.len(),
        "alerts": alerts,
    })))
}

pub async fn mark_alert_sent(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    sqlx::query(
        "UPDATE calendar_events SET alert_sent = TRUE, updated_at = now()
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user.id)
    .execute(&db)
    .await?;

    Ok(Json(json!({ "success": true, "message": "Alert marked as sent" })))
}

#[derive(Debug, Deserialize)]
pub struct MonthViewQuery {
    month: Option<u32>,
    year: Option<i32>,
}

/// All of a month's events for the calendar grid.
pub async fn get_events_by_date_range(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(query): Query<MonthViewQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let (month, year) = match (query.month, query.year) {
        (Some(month), Some(year)) => (month, year),
        _ => return Err(ApiError::BadRequest("Month and year are required".to_string())),
    };

    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::BadRequest("Invalid date format".to_string()))?;
    let end = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
        .ok_or_else(|| ApiError::BadRequest("Invalid date format".to_string()))?;

    let events: Vec<CalendarEvent> = sqlx::query_as(
        "SELECT * FROM calendar_events
         WHERE user_id = $1 AND event_date BETWEEN $2 AND $3 AND is_deleted = FALSE
         ORDER BY event_date ASC",
    )
    .bind(user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({ "success": true, "events": events })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
}

pub async fn search_events(
    State(db): State<Database>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(search): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = get_current_user(&headers, &cookies, &db)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let query = match search.query.as_deref() {
        Some(query) if !query.is_empty() => query,
        _ => return Err(ApiError::BadRequest("Search query is required".to_string())),
    };
    let pattern = format!("%{}%", query);

    let events: Vec<CalendarEvent> = sqlx::query_as(
        "SELECT * FROM calendar_events
         WHERE user_id = $1
           AND is_deleted = FALSE
           AND (title ILIKE $2 OR notes ILIKE $2 OR description ILIKE $2)
         ORDER BY event_date ASC",
    )
    .bind(user.id)
    .bind(&pattern)
    .fetch_all(&db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": events.len(),
        "events": events,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn next_day_crosses_month_and_year_boundaries() {
        assert_eq!(next_day(date(2024, 1, 31)), date(2024, 2, 1));
        assert_eq!(next_day(date(2024, 12, 31)), date(2025, 1, 1));
    }

    #[test]
    fn next_month_keeps_the_day_when_it_fits() {
        assert_eq!(next_month_same_day(date(2024, 3, 15)), date(2024, 4, 15));
    }

    #[test]
    fn next_month_clamps_to_shorter_months() {
        assert_eq!(next_month_same_day(date(2024, 1, 31)), date(2024, 2, 29));
        assert_eq!(next_month_same_day(date(2023, 1, 31)), date(2023, 2, 28));
        assert_eq!(next_month_same_day(date(2024, 3, 31)), date(2024, 4, 30));
    }

    #[test]
    fn next_month_rolls_over_december() {
        assert_eq!(next_month_same_day(date(2024, 12, 31)), date(2025, 1, 31));
    }

    #[test]
    fn february_length_tracks_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
    }
}
