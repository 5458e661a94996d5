//! State transitions that keep the three representations of a financial
//! record — an `expenses` row, an `approvals` row, and a `wallet` row — in
//! agreement while it moves through the approval workflow.
//!
//! An edit is resolved in two steps: `plan_edit` maps (who is editing, where
//! the record currently lives) to a `Transition`, and the handler applies that
//! transition with the executor functions below inside a single database
//! transaction. Keeping the dispatch in one table makes the workflow
//! invariants checkable in one place instead of being scattered across
//! per-table SQL branches.

use rust_decimal::Decimal;
use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};

use crate::database::Database;
use crate::models::{Approval, Expense};

/// Who is performing an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Owner,
}

/// Where the record was located, and how it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Located {
    /// An `approvals` row named directly by the client (`source_type: "approval"`).
    ApprovalHinted,
    /// An `approvals` row reached through the fallback lookup, after the id
    /// missed the `expenses` table.
    ApprovalLegacy,
    /// An `expenses` row.
    Expense { approved: bool },
}

/// The transition an edit resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Admin edit of an approval: write the new values, force
    /// `approved`/`is_edit = 0`, and refresh the wallet row from the result.
    /// With `sync_expense` the approval is additionally mirrored into its
    /// `expenses` row (created and linked via `original_expense_id` when
    /// missing) and any stray wallet row is dropped instead of refreshed.
    ReapproveInPlace { sync_expense: bool },
    /// Admin edit of an expense: write the new values, force `approved`, and
    /// propagate the same fields to companion approvals.
    OverwriteExpense,
    /// Owner edit of an approval: write the new values, force
    /// `pending`/`is_edit = 1`, and pull the record out of the wallet until
    /// it is re-approved.
    Resubmit,
    /// Owner edit of a still-pending expense: rewrite the expense and its
    /// companion approvals in place.
    RewritePending,
    /// Owner edit of an approved expense: the canonical row is demoted to
    /// `pending` and a fresh approval is forked from it.
    ForkReapproval,
}

/// The single authoritative transition table for `edit_expense`.
pub fn plan_edit(actor: Actor, located: Located) -> Transition {
    match (actor, located) {
        (Actor::Admin, Located::ApprovalHinted) => Transition::ReapproveInPlace { sync_expense: false },
        (Actor::Admin, Located::ApprovalLegacy) => Transition::ReapproveInPlace { sync_expense: true },
        (Actor::Admin, Located::Expense { .. }) => Transition::OverwriteExpense,
        (Actor::Owner, Located::ApprovalHinted) => Transition::Resubmit,
        (Actor::Owner, Located::ApprovalLegacy) => Transition::Resubmit,
        (Actor::Owner, Located::Expense { approved: false }) => Transition::RewritePending,
        (Actor::Owner, Located::Expense { approved: true }) => Transition::ForkReapproval,
    }
}

/// The final field values a transition writes, after the client's `updates`
/// have been merged over the row being edited.
#[derive(Debug, Clone)]
pub struct RecordPatch {
    pub amount: Decimal,
    pub branch: String,
    pub date: NaiveDate,
    pub main_category: String,
    pub sub_category: String,
    pub description: Option<String>,
    pub invoice: Option<String>,
    pub spend_mode: Option<String>,
    pub gst: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub transaction_from: Option<String>,
    pub transaction_to: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_number: Option<String>,
    pub vendor_gst: Option<String>,
    pub end_date: Option<NaiveDate>,
}

impl RecordPatch {
    /// A patch that reproduces an approval's current values, used when the
    /// approval itself is untouched and only the wallet needs refreshing.
    pub fn from_approval(approval: &Approval) -> Self {
        Self {
            amount: approval.amount,
            branch: approval.branch.clone(),
            date: approval.date,
            main_category: approval.main_category.clone(),
            sub_category: approval.sub_category.clone(),
            description: approval.description.clone(),
            invoice: approval.invoice.clone(),
            spend_mode: None,
            gst: approval.gst.clone(),
            icon: approval.icon.clone(),
            color: approval.color.clone(),
            transaction_from: approval.transaction_from.clone(),
            transaction_to: approval.transaction_to.clone(),
            vendor_name: approval.vendor_name.clone(),
            vendor_number: approval.vendor_number.clone(),
            vendor_gst: approval.vendor_gst.clone(),
            end_date: approval.end_date,
        }
    }
}

pub async fn fetch_approval(db: &Database, id: i32) -> Result<Option<Approval>, sqlx::Error> {
    sqlx::query_as::<_, Approval>("SELECT * FROM approvals WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Fetch an approval, restricted to `owner_id` when the requester is not an
/// admin. A row outside that scope is indistinguishable from a missing one.
pub async fn fetch_approval_scoped(
    db: &Database,
    id: i32,
    owner_id: Option<i32>,
) -> Result<Option<Approval>, sqlx::Error> {
    match owner_id {
        Some(user_id) => {
            sqlx::query_as::<_, Approval>("SELECT * FROM approvals WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(db)
                .await
        }
        None => fetch_approval(db, id).await,
    }
}

pub async fn fetch_expense_scoped(
    db: &Database,
    id: i32,
    owner_id: Option<i32>,
) -> Result<Option<Expense>, sqlx::Error> {
    match owner_id {
        Some(user_id) => {
            sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(db)
                .await
        }
        None => {
            sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1")
                .bind(id)
                .fetch_optional(db)
                .await
        }
    }
}

/// Rewrite an approval row with the patched values and workflow flags.
pub async fn write_approval(
    tx: &mut Transaction<'_, Postgres>,
    approval_id: i32,
    patch: &RecordPatch,
    status: &str,
    is_edit: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE approvals SET
            amount = $1, branch = $2, date = $3, main_category = $4, sub_category = $5,
            description = $6, invoice = $7, gst = $8, icon = $9, color = $10,
            transaction_from = $11, transaction_to = $12, vendor_name = $13,
            vendor_number = $14, vendor_gst = $15, end_date = $16,
            status = $17, is_edit = $18, updated_at = now()
         WHERE id = $19",
    )
    .bind(patch.amount)
    .bind(&patch.branch)
    .bind(patch.date)
    .bind(&patch.main_category)
    .bind(&patch.sub_category)
    .bind(&patch.description)
    .bind(&patch.invoice)
    .bind(&patch.gst)
    .bind(&patch.icon)
    .bind(&patch.color)
    .bind(&patch.transaction_from)
    .bind(&patch.transaction_to)
    .bind(&patch.vendor_name)
    .bind(&patch.vendor_number)
    .bind(&patch.vendor_gst)
    .bind(patch.end_date)
    .bind(status)
    .bind(is_edit)
    .bind(approval_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Rewrite an expense row with the patched values and status.
pub async fn write_expense(
    tx: &mut Transaction<'_, Postgres>,
    expense_id: i32,
    patch: &RecordPatch,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE expenses SET
            total = $1, branch = $2, date = $3, main_category = $4, sub_category = $5,
            description = $6, invoice = $7, spend_mode = $8, gst = $9, icon = $10,
            color = $11, transaction_from = $12, transaction_to = $13, vendor_name = $14,
            vendor_number = $15, vendor_gst = $16, status = $17, updated_at = now()
         WHERE id = $18",
    )
    .bind(patch.amount)
    .bind(&patch.branch)
    .bind(patch.date)
    .bind(&patch.main_category)
    .bind(&patch.sub_category)
    .bind(&patch.description)
    .bind(&patch.invoice)
    .bind(&patch.spend_mode)
    .bind(&patch.gst)
    .bind(&patch.icon)
    .bind(&patch.color)
    .bind(&patch.transaction_from)
    .bind(&patch.transaction_to)
    .bind(&patch.vendor_name)
    .bind(&patch.vendor_number)
    .bind(&patch.vendor_gst)
    .bind(status)
    .bind(expense_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Create-or-refresh the single wallet row backing an approval. Returns true
/// when an existing row was refreshed. The partial unique index on
/// `wallet.approval_id` backs this check up at the schema level.
pub async fn upsert_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i32,
    approval_id: i32,
    patch: &RecordPatch,
) -> Result<bool, sqlx::Error> {
    let note = patch
        .description
        .clone()
        .unwrap_or_else(|| "Approved Expense".to_string());

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM wallet WHERE approval_id = $1")
        .bind(approval_id)
        .fetch_optional(&mut **tx)
        .await?;

    match existing {
        Some((wallet_id,)) => {
            sqlx::query(
                "UPDATE wallet SET
                    user_id = $1, category = $2, amount = $3, type = 'income',
                    main_category = $4, sub_category = $5, branch = $6, date = $7,
                    color = $8, icon = $9, invoice = $10, gst = $11,
                    transaction_from = $12, transaction_to = $13, vendor_name = $14,
                    vendor_number = $15, vendor_gst = $16, end_date = $17, note = $18
                 WHERE id = $19",
            )
            .bind(user_id)
            .bind(&patch.sub_category)
            .bind(patch.amount)
            .bind(&patch.main_category)
            .bind(&patch.sub_category)
            .bind(&patch.branch)
            .bind(patch.date)
            .bind(&patch.color)
            .bind(&patch.icon)
            .bind(&patch.invoice)
            .bind(&patch.gst)
            .bind(&patch.transaction_from)
            .bind(&patch.transaction_to)
            .bind(&patch.vendor_name)
            .bind(&patch.vendor_number)
            .bind(&patch.vendor_gst)
            .bind(patch.end_date)
            .bind(note)
            .bind(wallet_id)
            .execute(&mut **tx)
            .await?;

            Ok(true)
        }
        None => {
            sqlx::query(
                "INSERT INTO wallet
                    (user_id, category, amount, type, main_category, sub_category, branch,
                     date, color, icon, invoice, gst, transaction_from, transaction_to,
                     vendor_name, vendor_number, vendor_gst, end_date, note, approval_id)
                 VALUES ($1, $2, $3, 'income', $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                         $14, $15, $16, $17, $18, $19)",
            )
            .bind(user_id)
            .bind(&patch.sub_category)
            .bind(patch.amount)
            .bind(&patch.main_category)
            .bind(&patch.sub_category)
            .bind(&patch.branch)
            .bind(patch.date)
            .bind(&patch.color)
            .bind(&patch.icon)
            .bind(&patch.invoice)
            .bind(&patch.gst)
            .bind(&patch.transaction_from)
            .bind(&patch.transaction_to)
            .bind(&patch.vendor_name)
            .bind(&patch.vendor_number)
            .bind(&patch.vendor_gst)
            .bind(patch.end_date)
            .bind(note)
            .bind(approval_id)
            .execute(&mut **tx)
            .await?;

            Ok(false)
        }
    }
}

pub async fn wallet_exists_for(
    tx: &mut Transaction<'_, Postgres>,
    approval_id: i32,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM wallet WHERE approval_id = $1)")
        .bind(approval_id)
        .fetch_one(&mut **tx)
        .await
}

pub async fn delete_wallet_for(
    tx: &mut Transaction<'_, Postgres>,
    approval_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM wallet WHERE approval_id = $1")
        .bind(approval_id)
        .execute(&mut **tx)
        .await?;

    Ok(result.rows_affected())
}

/// Mirror an approval into its `expenses` row, creating the row and linking
/// `original_expense_id` when the approval does not have one yet. Used on the
/// legacy admin path, where the expense side is authoritative.
pub async fn sync_expense_from_approval(
    tx: &mut Transaction<'_, Postgres>,
    approval: &Approval,
    patch: &RecordPatch,
) -> Result<i32, sqlx::Error> {
    if let Some(expense_id) = approval.original_expense_id {
        write_expense(tx, expense_id, patch, "approved").await?;
        return Ok(expense_id);
    }

    let (expense_id,): (i32,) = sqlx::query_as(
        "INSERT INTO expenses
            (user_id, branch, date, total, main_category, sub_category, description,
             icon, color, invoice, spend_mode, gst, status, transaction_from,
             transaction_to, vendor_name, vendor_number, vendor_gst)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'approved',
                 $13, $14, $15, $16, $17)
         RETURNING id",
    )
    .bind(approval.user_id)
    .bind(&patch.branch)
    .bind(patch.date)
    .bind(patch.amount)
    .bind(&patch.main_category)
    .bind(&patch.sub_category)
    .bind(&patch.description)
    .bind(&patch.icon)
    .bind(&patch.color)
    .bind(&patch.invoice)
    .bind(&patch.spend_mode)
    .bind(&patch.gst)
    .bind(&patch.transaction_from)
    .bind(&patch.transaction_to)
    .bind(&patch.vendor_name)
    .bind(&patch.vendor_number)
    .bind(&patch.vendor_gst)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("UPDATE approvals SET original_expense_id = $1, updated_at = now() WHERE id = $2")
        .bind(expense_id)
        .bind(approval.id)
        .execute(&mut **tx)
        .await?;

    Ok(expense_id)
}

/// Propagate patched fields to every approval that references the expense.
/// With `force_pending` the companions are also pulled back into the pending
/// state (`is_edit = 1`). Returns the ids of the touched approvals so callers
/// can clear their wallet rows.
pub async fn propagate_to_companions(
    tx: &mut Transaction<'_, Postgres>,
    expense_id: i32,
    patch: &RecordPatch,
    force_pending: bool,
) -> Result<Vec<i32>, sqlx::Error> {
    let sql = if force_pending {
        "UPDATE approvals SET
            amount = $1, branch = $2, date = $3, main_category = $4, sub_category = $5,
            description = $6, invoice = $7, gst = $8, transaction_from = $9,
            transaction_to = $10, vendor_name = $11, vendor_number = $12, vendor_gst = $13,
            end_date = $14, status = 'pending', is_edit = TRUE, updated_at = now()
         WHERE original_expense_id = $15
         RETURNING id"
    } else {
        "UPDATE approvals SET
            amount = $1, branch = $2, date = $3, main_category = $4, sub_category = $5,
            description = $6, invoice = $7, gst = $8, transaction_from = $9,
            transaction_to = $10, vendor_name = $11, vendor_number = $12, vendor_gst = $13,
            end_date = $14, updated_at = now()
         WHERE original_expense_id = $15
         RETURNING id"
    };

    let ids: Vec<(i32,)> = sqlx::query_as(sql)
        .bind(patch.amount)
        .bind(&patch.branch)
        .bind(patch.date)
        .bind(&patch.main_category)
        .bind(&patch.sub_category)
        .bind(&patch.description)
        .bind(&patch.invoice)
        .bind(&patch.gst)
        .bind(&patch.transaction_from)
        .bind(&patch.transaction_to)
        .bind(&patch.vendor_name)
        .bind(&patch.vendor_number)
        .bind(&patch.vendor_gst)
        .bind(patch.end_date)
        .bind(expense_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}

/// An owner editing an approved expense never mutates the canonical row's
/// content directly: the expense is demoted to `pending` and a fresh approval
/// carrying the edited values is forked from it.
pub async fn fork_reapproval(
    tx: &mut Transaction<'_, Postgres>,
    expense: &Expense,
    requester_id: i32,
    patch: &RecordPatch,
) -> Result<i32, sqlx::Error> {
    sqlx::query("UPDATE expenses SET status = 'pending', updated_at = now() WHERE id = $1")
        .bind(expense.id)
        .execute(&mut **tx)
        .await?;

    let (approval_id,): (i32,) = sqlx::query_as(
        "INSERT INTO approvals
            (original_expense_id, user_id, branch, date, amount, main_category,
             sub_category, description, icon, color, invoice, gst, status, is_edit,
             transaction_from, transaction_to, vendor_name, vendor_number, vendor_gst,
             end_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending', TRUE,
                 $13, $14, $15, $16, $17, $18)
         RETURNING id",
    )
    .bind(expense.id)
    .bind(requester_id)
    .bind(&patch.branch)
    .bind(patch.date)
    .bind(patch.amount)
    .bind(&patch.main_category)
    .bind(&patch.sub_category)
    .bind(&patch.description)
    .bind(&patch.icon)
    .bind(&patch.color)
    .bind(&patch.invoice)
    .bind(&patch.gst)
    .bind(&patch.transaction_from)
    .bind(&patch.transaction_to)
    .bind(&patch.vendor_name)
    .bind(&patch.vendor_number)
    .bind(&patch.vendor_gst)
    .bind(patch.end_date)
    .fetch_one(&mut **tx)
    .await?;

    Ok(approval_id)
}

/// Deleting an expense leaves any approval that referenced it dangling; clear
/// the reference and put those approvals back in the pending queue.
pub async fn release_companions(
    tx: &mut Transaction<'_, Postgres>,
    expense_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE approvals SET original_expense_id = NULL, status = 'pending', updated_at = now()
         WHERE original_expense_id = $1",
    )
    .bind(expense_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_edit_of_hinted_approval_reapproves_without_expense_sync() {
        assert_eq!(
            plan_edit(Actor::Admin, Located::ApprovalHinted),
            Transition::ReapproveInPlace { sync_expense: false }
        );
    }

    #[test]
    fn admin_edit_of_legacy_approval_syncs_the_expense_side() {
        assert_eq!(
            plan_edit(Actor::Admin, Located::ApprovalLegacy),
            Transition::ReapproveInPlace { sync_expense: true }
        );
    }

    #[test]
    fn admin_edit_of_expense_overwrites_regardless_of_status() {
        assert_eq!(
            plan_edit(Actor::Admin, Located::Expense { approved: true }),
            Transition::OverwriteExpense
        );
        assert_eq!(
            plan_edit(Actor::Admin, Located::Expense { approved: false }),
            Transition::OverwriteExpense
        );
    }

    #[test]
    fn owner_edit_of_approval_resubmits_for_approval() {
        assert_eq!(plan_edit(Actor::Owner, Located::ApprovalHinted), Transition::Resubmit);
        assert_eq!(plan_edit(Actor::Owner, Located::ApprovalLegacy), Transition::Resubmit);
    }

    #[test]
    fn owner_edit_of_pending_expense_rewrites_in_place() {
        assert_eq!(
            plan_edit(Actor::Owner, Located::Expense { approved: false }),
            Transition::RewritePending
        );
    }

    #[test]
    fn owner_edit_of_approved_expense_forks_a_reapproval() {
        assert_eq!(
            plan_edit(Actor::Owner, Located::Expense { approved: true }),
            Transition::ForkReapproval
        );
    }
}
