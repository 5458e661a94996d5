//! The three physical shapes of a financial record: an `expenses` row, an
//! `approvals` row, and a `wallet` row. Which table currently holds the
//! authoritative row is workflow state; the transitions live in
//! `crate::reconcile`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use sqlx::FromRow;

/// An approved, user-owned spend record.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expense {
    pub id: i32,
    pub user_id: i32,
    pub branch: String,
    pub date: NaiveDate,
    pub total: Decimal,
    pub main_category: String,
    pub sub_category: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub spend_mode: Option<String>,
    pub gst: String,
    pub status: String,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
    pub vendor_gst: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pending or historical approval request. Doubles as the staging area for
/// edits awaiting re-approval (`is_edit`, `original_expense_id`).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Approval {
    pub id: i32,
    pub user_id: i32,
    pub original_expense_id: Option<i32>,
    pub branch: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub main_category: String,
    pub sub_category: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub gst: String,
    pub status: String,
    pub is_edit: bool,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
    pub vendor_gst: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A ledger row for realized income/credit. Presence means approved; there is
/// no status column. `approval_id` links back to the approval that produced
/// the entry, and is unique across the table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WalletEntry {
    pub id: i32,
    pub user_id: i32,
    pub approval_id: Option<i32>,
    pub category: Option<String>,
    pub amount: Decimal,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub branch: Option<String>,
    pub date: NaiveDate,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub gst: Option<String>,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
    pub vendor_gst: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Expense list item with the owner's name joined in.
#[derive(Debug, Serialize, FromRow)]
pub struct ExpenseWithUser {
    pub id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub branch: String,
    pub date: NaiveDate,
    pub total: Decimal,
    pub main_category: String,
    pub sub_category: String,
    pub description: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub spend_mode: Option<String>,
    pub gst: String,
    pub status: String,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
}

/// Approval list item with the owner's name joined in. `total` aliases the
/// approval's `amount` so approvals and expenses present the same shape.
#[derive(Debug, Serialize, FromRow)]
pub struct ApprovalWithUser {
    pub id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub original_expense_id: Option<i32>,
    pub branch: String,
    pub date: NaiveDate,
    pub total: Decimal,
    pub main_category: String,
    pub sub_category: String,
    pub description: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub gst: String,
    pub status: String,
    pub is_edit: bool,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct IncomeWithUser {
    pub id: i32,
    pub user_id: i32,
    pub user_name: Option<String>,
    pub branch: String,
    pub date: NaiveDate,
    pub total: Decimal,
    pub category: String,
    pub description: Option<String>,
    #[serde(serialize_with = "serialize_invoice")]
    pub invoice: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Decode a stored invoice column back into a list of file paths.
///
/// The column holds a JSON array written at submission time, but historical
/// rows may contain a bare path or other junk. Absent stays absent, a JSON
/// array comes back as-is, any other valid JSON value is wrapped as a single
/// element, and a string that fails to parse is returned wrapped, verbatim.
pub fn decode_invoice(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ),
        Ok(serde_json::Value::String(s)) => Some(vec![s]),
        Ok(other) => Some(vec![other.to_string()]),
        Err(_) => Some(vec![raw.to_string()]),
    }
}

/// Encode invoice paths for storage. An empty list encodes as SQL NULL,
/// never as `[]`.
pub fn encode_invoice(paths: &[String]) -> Option<String> {
    if paths.is_empty() {
        None
    } else {
        serde_json::to_string(paths).ok()
    }
}

pub fn serialize_invoice<S>(raw: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match decode_invoice(raw.as_deref()) {
        Some(paths) => serializer.serialize_some(&paths),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_invoice_stays_absent() {
        assert_eq!(decode_invoice(None), None);
    }

    #[test]
    fn json_array_decodes_to_list() {
        let decoded = decode_invoice(Some(r#"["/uploads/invoices/a.pdf","/uploads/invoices/b.png"]"#));
        assert_eq!(
            decoded,
            Some(vec![
                "/uploads/invoices/a.pdf".to_string(),
                "/uploads/invoices/b.png".to_string(),
            ])
        );
    }

    #[test]
    fn scalar_json_is_wrapped() {
        assert_eq!(
            decode_invoice(Some(r#""/uploads/invoices/a.pdf""#)),
            Some(vec!["/uploads/invoices/a.pdf".to_string()])
        );
    }

    #[test]
    fn unparseable_value_is_wrapped_verbatim() {
        assert_eq!(
            decode_invoice(Some("/uploads/invoices/legacy.pdf")),
            Some(vec!["/uploads/invoices/legacy.pdf".to_string()])
        );
    }

    #[test]
    fn empty_list_encodes_as_null() {
        assert_eq!(encode_invoice(&[]), None);
    }

    #[test]
    fn paths_round_trip_through_encode_and_decode() {
        let paths = vec!["/uploads/invoices/a.pdf".to_string()];
        let encoded = encode_invoice(&paths).unwrap();
        assert_eq!(decode_invoice(Some(&encoded)), Some(paths));
    }
}
