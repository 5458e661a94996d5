use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ExpenseCategory {
    pub id: i32,
    pub main_category: String,
    pub sub_category: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct IncomeCategory {
    pub id: i32,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Display metadata resolved at submission time and denormalized onto the
/// record. Not updated retroactively if the category changes later.
#[derive(Debug, Default, Clone, FromRow)]
pub struct CategoryStyle {
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseCategoryInput {
    #[serde(rename = "mainCategory")]
    pub main_category: String,
    #[serde(rename = "subCategory")]
    pub sub_category: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IncomeCategoryInput {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
}
