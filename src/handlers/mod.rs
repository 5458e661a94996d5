pub mod auth;
pub mod calendar;
pub mod categories;
pub mod transactions;
pub mod wallet;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
