use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Vendor {
    pub id: i32,
    pub name: String,
    pub number: Option<String>,
    pub company_name: Option<String>,
    pub gst: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct VendorInput {
    pub name: Option<String>,
    pub number: Option<String>,
    pub company_name: Option<String>,
    pub gst: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}
