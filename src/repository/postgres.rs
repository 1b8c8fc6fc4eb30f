//! Postgres-backed [`BillStore`].
//!
//! Every mutating call takes `SELECT ... FOR UPDATE` on the `bills` row
//! and runs inside one transaction, so the row lock covers every child
//! table touched by the same commit (see DESIGN.md, "row lock scope").
//! The aggregate is loaded whole, handed to the caller-supplied closure,
//! then persisted by deleting and reinserting every child row — simpler
//! to reason about than diffing, and cheap at this aggregate's size.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::{
    Bill, BillId, Expense, ExpenseId, ExpenseItem, ExpenseItemParticipant, ExpenseParticipant, ItemId, Member,
    MemberId, Operation, OperationId, OperationPayload, SettledTransfer, UserId,
};
use crate::error::AppError;
use crate::repository::{BillStore, BulkSyncMutation, DeltaSyncMutation, OperationDecision};
use crate::sync::dto::ConflictInfo;

pub struct PgBillStore {
    pool: PgPool,
}

impl PgBillStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_locked(tx: &mut Transaction<'_, Postgres>, id: BillId) -> Result<Option<Bill>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, owner_id, share_code, version, local_client_id, created_at, updated_at
            FROM snapsplit.bills
            WHERE id = $1 AND is_deleted = FALSE
            FOR UPDATE
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let members = sqlx::query(
            r#"
            SELECT id, bill_id, name, display_order, linked_user_id, claimed_at, original_name, local_client_id
            FROM snapsplit.members
            WHERE bill_id = $1 AND is_deleted = FALSE
            ORDER BY display_order
            "#,
        )
        .bind(id.0)
        .fetch_all(&mut **tx)
        .await?
        .into_iter()
        .map(|r| Member {
            id: MemberId(r.get("id")),
            bill_id: BillId(r.get("bill_id")),
            name: r.get("name"),
            display_order: r.get("display_order"),
            linked_user_id: r.get::<Option<uuid::Uuid>, _>("linked_user_id").map(UserId),
            claimed_at: r.get("claimed_at"),
            original_name: r.get("original_name"),
            local_client_id: r.get("local_client_id"),
        })
        .collect::<Vec<_>>();

        let mut expenses = sqlx::query(
            r#"
            SELECT id, bill_id, name, amount, service_fee_percent, is_itemized, paid_by_member_id, local_client_id
            FROM snapsplit.expenses
            WHERE bill_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id.0)
        .fetch_all(&mut **tx)
        .await?
        .into_iter()
        .map(|r| Expense {
            id: ExpenseId(r.get("id")),
            bill_id: BillId(r.get("bill_id")),
            name: r.get("name"),
            amount: r.get("amount"),
            service_fee_percent: r.get("service_fee_percent"),
            is_itemized: r.get("is_itemized"),
            paid_by_member_id: r.get::<Option<uuid::Uuid>, _>("paid_by_member_id").map(MemberId),
            local_client_id: r.get("local_client_id"),
            participants: Vec::new(),
            items: Vec::new(),
        })
        .collect::<Vec<_>>();

        let expense_participants = sqlx::query(
            r#"
            SELECT expense_id, member_id, amount
            FROM snapsplit.expense_participants
            WHERE expense_id = ANY($1)
            "#,
        )
        .bind(expenses.iter().map(|e| e.id.0).collect::<Vec<_>>())
        .fetch_all(&mut **tx)
        .await?;

        for row in expense_participants {
            let expense_id = ExpenseId(row.get("expense_id"));
            if let Some(e) = expenses.iter_mut().find(|e| e.id == expense_id) {
                e.participants.push(ExpenseParticipant {
                    expense_id,
                    member_id: MemberId(row.get("member_id")),
                    amount: row.get("amount"),
                });
            }
        }

        let items = sqlx::query(
            r#"
            SELECT id, expense_id, name, amount, paid_by_member_id, local_client_id
            FROM snapsplit.expense_items
            WHERE expense_id = ANY($1) AND is_deleted = FALSE
            "#,
        )
        .bind(expenses.iter().map(|e| e.id.0).collect::<Vec<_>>())
        .fetch_all(&mut **tx)
        .await?;

        let mut items: Vec<ExpenseItem> = items
            .into_iter()
            .map(|r| ExpenseItem {
                id: ItemId(r.get("id")),
                expense_id: ExpenseId(r.get("expense_id")),
                name: r.get("name"),
                amount: r.get("amount"),
                paid_by_member_id: r.get::<Option<uuid::Uuid>, _>("paid_by_member_id").map(MemberId),
                local_client_id: r.get("local_client_id"),
                participants: Vec::new(),
            })
            .collect();

        let item_participants = sqlx::query(
            r#"
            SELECT item_id, member_id, amount
            FROM snapsplit.expense_item_participants
            WHERE item_id = ANY($1)
            "#,
        )
        .bind(items.iter().map(|i| i.id.0).collect::<Vec<_>>())
        .fetch_all(&mut **tx)
        .await?;

        for row in item_participants {
            let item_id = ItemId(row.get("item_id"));
            if let Some(i) = items.iter_mut().find(|i| i.id == item_id) {
                i.participants.push(ExpenseItemParticipant {
                    item_id,
                    member_id: MemberId(row.get("member_id")),
                    amount: row.get("amount"),
                });
            }
        }

        for item in items.drain(..) {
            if let Some(e) = expenses.iter_mut().find(|e| e.id == item.expense_id) {
                e.items.push(item);
            }
        }

        let settled_transfers = sqlx::query(
            r#"
            SELECT bill_id, from_member_id, to_member_id, amount, settled_at
            FROM snapsplit.settled_transfers
            WHERE bill_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id.0)
        .fetch_all(&mut **tx)
        .await?
        .into_iter()
        .map(|r| SettledTransfer {
            bill_id: BillId(r.get("bill_id")),
            from_member_id: MemberId(r.get("from_member_id")),
            to_member_id: MemberId(r.get("to_member_id")),
            amount: r.get("amount"),
            settled_at: r.get("settled_at"),
        })
        .collect();

        Ok(Some(Bill {
            id: BillId(row.get("id")),
            name: row.get("name"),
            owner_id: row.get::<Option<uuid::Uuid>, _>("owner_id").map(UserId),
            share_code: row.get("share_code"),
            version: row.get("version"),
            local_client_id: row.get("local_client_id"),
            members,
            expenses,
            settled_transfers,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    /// Soft-delete entity rows absent from the in-memory snapshot, upsert
    /// every row still present, and fully replace the pure junction tables
    /// (they have no identity of their own, so there is nothing to soft
    /// delete — they are wholly owned by the expense/item that lists them).
    /// Finally update the bill header and bump its version by exactly 1.
    async fn persist(tx: &mut Transaction<'_, Postgres>, bill: &Bill) -> Result<(), AppError> {
        let live_member_ids: Vec<uuid::Uuid> = bill.members.iter().map(|m| m.id.0).collect();
        sqlx::query(
            "UPDATE snapsplit.members SET is_deleted = TRUE, deleted_at = $2 \
             WHERE bill_id = $1 AND is_deleted = FALSE AND NOT (id = ANY($3))",
        )
        .bind(bill.id.0)
        .bind(bill.updated_at)
        .bind(&live_member_ids)
        .execute(&mut **tx)
        .await?;

        for member in &bill.members {
            sqlx::query(
                r#"
                INSERT INTO snapsplit.members
                    (id, bill_id, name, display_order, linked_user_id, claimed_at, original_name, local_client_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    display_order = EXCLUDED.display_order,
                    linked_user_id = EXCLUDED.linked_user_id,
                    claimed_at = EXCLUDED.claimed_at,
                    original_name = EXCLUDED.original_name,
                    local_client_id = EXCLUDED.local_client_id,
                    is_deleted = FALSE,
                    deleted_at = NULL
                "#,
            )
            .bind(member.id.0)
            .bind(member.bill_id.0)
            .bind(&member.name)
            .bind(member.display_order)
            .bind(member.linked_user_id.map(|u| u.0))
            .bind(member.claimed_at)
            .bind(&member.original_name)
            .bind(&member.local_client_id)
            .execute(&mut **tx)
            .await?;
        }

        let live_expense_ids: Vec<uuid::Uuid> = bill.expenses.iter().map(|e| e.id.0).collect();
        sqlx::query(
            "UPDATE snapsplit.expenses SET is_deleted = TRUE, deleted_at = $2 \
             WHERE bill_id = $1 AND is_deleted = FALSE AND NOT (id = ANY($3))",
        )
        .bind(bill.id.0)
        .bind(bill.updated_at)
        .bind(&live_expense_ids)
        .execute(&mut **tx)
        .await?;

        let live_item_ids: Vec<uuid::Uuid> =
            bill.expenses.iter().flat_map(|e| e.items.iter().map(|i| i.id.0)).collect();
        sqlx::query(
            "UPDATE snapsplit.expense_items SET is_deleted = TRUE, deleted_at = $2 \
             WHERE expense_id IN (SELECT id FROM snapsplit.expenses WHERE bill_id = $1) \
             AND is_deleted = FALSE AND NOT (id = ANY($3))",
        )
        .bind(bill.id.0)
        .bind(bill.updated_at)
        .bind(&live_item_ids)
        .execute(&mut **tx)
        .await?;

        for expense in &bill.expenses {
            sqlx::query(
                r#"
                INSERT INTO snapsplit.expenses
                    (id, bill_id, name, amount, service_fee_percent, is_itemized, paid_by_member_id, local_client_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    amount = EXCLUDED.amount,
                    service_fee_percent = EXCLUDED.service_fee_percent,
                    is_itemized = EXCLUDED.is_itemized,
                    paid_by_member_id = EXCLUDED.paid_by_member_id,
                    local_client_id = EXCLUDED.local_client_id,
                    is_deleted = FALSE,
                    deleted_at = NULL
                "#,
            )
            .bind(expense.id.0)
            .bind(expense.bill_id.0)
            .bind(&expense.name)
            .bind(expense.amount)
            .bind(expense.service_fee_percent)
            .bind(expense.is_itemized)
            .bind(expense.paid_by_member_id.map(|m| m.0))
            .bind(&expense.local_client_id)
            .execute(&mut **tx)
            .await?;

            sqlx::query("DELETE FROM snapsplit.expense_participants WHERE expense_id = $1")
                .bind(expense.id.0)
                .execute(&mut **tx)
                .await?;
            for p in &expense.participants {
                sqlx::query(
                    "INSERT INTO snapsplit.expense_participants (expense_id, member_id, amount) VALUES ($1, $2, $3)",
                )
                .bind(p.expense_id.0)
                .bind(p.member_id.0)
                .bind(p.amount)
                .execute(&mut **tx)
                .await?;
            }

            for item in &expense.items {
                sqlx::query(
                    r#"
                    INSERT INTO snapsplit.expense_items
                        (id, expense_id, name, amount, paid_by_member_id, local_client_id)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (id) DO UPDATE SET
                        name = EXCLUDED.name,
                        amount = EXCLUDED.amount,
                        paid_by_member_id = EXCLUDED.paid_by_member_id,
                        local_client_id = EXCLUDED.local_client_id,
                        is_deleted = FALSE,
                        deleted_at = NULL
                    "#,
                )
                .bind(item.id.0)
                .bind(item.expense_id.0)
                .bind(&item.name)
                .bind(item.amount)
                .bind(item.paid_by_member_id.map(|m| m.0))
                .bind(&item.local_client_id)
                .execute(&mut **tx)
                .await?;

                sqlx::query("DELETE FROM snapsplit.expense_item_participants WHERE item_id = $1")
                    .bind(item.id.0)
                    .execute(&mut **tx)
                    .await?;
                for p in &item.participants {
                    sqlx::query(
                        "INSERT INTO snapsplit.expense_item_participants (item_id, member_id, amount) VALUES ($1, $2, $3)",
                    )
                    .bind(p.item_id.0)
                    .bind(p.member_id.0)
                    .bind(p.amount)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }

        let live_transfer_pairs: Vec<(uuid::Uuid, uuid::Uuid)> =
            bill.settled_transfers.iter().map(|t| (t.from_member_id.0, t.to_member_id.0)).collect();
        let (live_from, live_to): (Vec<uuid::Uuid>, Vec<uuid::Uuid>) = live_transfer_pairs.into_iter().unzip();
        sqlx::query(
            "UPDATE snapsplit.settled_transfers SET is_deleted = TRUE, deleted_at = $2 \
             WHERE bill_id = $1 AND is_deleted = FALSE \
             AND (from_member_id, to_member_id) NOT IN (SELECT f, t FROM unnest($3::uuid[], $4::uuid[]) AS pair(f, t))",
        )
        .bind(bill.id.0)
        .bind(bill.updated_at)
        .bind(&live_from)
        .bind(&live_to)
        .execute(&mut **tx)
        .await?;

        for t in &bill.settled_transfers {
            sqlx::query(
                r#"
                INSERT INTO snapsplit.settled_transfers (bill_id, from_member_id, to_member_id, amount, settled_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (bill_id, from_member_id, to_member_id) DO UPDATE SET
                    amount = EXCLUDED.amount,
                    settled_at = EXCLUDED.settled_at,
                    is_deleted = FALSE,
                    deleted_at = NULL
                "#,
            )
            .bind(t.bill_id.0)
            .bind(t.from_member_id.0)
            .bind(t.to_member_id.0)
            .bind(t.amount)
            .bind(t.settled_at)
            .execute(&mut **tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE snapsplit.bills
            SET name = $2, version = version + 1, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(bill.id.0)
        .bind(&bill.name)
        .bind(bill.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_operation(tx: &mut Transaction<'_, Postgres>, op: &Operation) -> Result<(), AppError> {
        let payload = serde_json::to_value(&op.payload).map_err(|e| AppError::Internal(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO snapsplit.operations
                (id, bill_id, version, op_type, target_id, payload, actor_user_id, client_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(op.id.0)
        .bind(op.bill_id.0)
        .bind(op.version)
        .bind(op.op_type.as_str())
        .bind(&op.target_id)
        .bind(payload)
        .bind(op.actor_user_id.map(|u| u.0))
        .bind(&op.client_id)
        .bind(op.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BillStore for PgBillStore {
    async fn find_bill(&self, id: BillId) -> Result<Option<Bill>, AppError> {
        let mut tx = self.pool.begin().await?;
        let bill = Self::load_locked(&mut tx, id).await?;
        tx.commit().await?;
        Ok(bill)
    }

    async fn find_bill_by_local_owner(&self, local_id: &str, owner: UserId) -> Result<Option<Bill>, AppError> {
        let row = sqlx::query(
            "SELECT id FROM snapsplit.bills WHERE local_client_id = $1 AND owner_id = $2 AND is_deleted = FALSE",
        )
            .bind(local_id)
            .bind(owner.0)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => self.find_bill(BillId(row.get("id"))).await,
            None => Ok(None),
        }
    }

    async fn insert_bare_bill(&self, bill: &Bill) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO snapsplit.bills (id, name, owner_id, share_code, version, local_client_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(bill.id.0)
        .bind(&bill.name)
        .bind(bill.owner_id.map(|u| u.0))
        .bind(&bill.share_code)
        .bind(bill.version)
        .bind(&bill.local_client_id)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn operations_since(&self, bill_id: BillId, since_version: i64) -> Result<Vec<Operation>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, bill_id, version, op_type, target_id, payload, actor_user_id, client_id, created_at
            FROM snapsplit.operations
            WHERE bill_id = $1 AND version > $2
            ORDER BY version
            "#,
        )
        .bind(bill_id.0)
        .bind(since_version)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row.get("payload");
                let payload: OperationPayload =
                    serde_json::from_value(payload).map_err(|e| AppError::Internal(e.to_string()))?;
                Ok(Operation {
                    id: OperationId(row.get("id")),
                    bill_id: BillId(row.get("bill_id")),
                    version: row.get("version"),
                    op_type: payload.op_type(),
                    target_id: row.get("target_id"),
                    payload,
                    actor_user_id: row.get::<Option<uuid::Uuid>, _>("actor_user_id").map(UserId),
                    client_id: row.get("client_id"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn commit_operation(&self, id: BillId, decide: OperationDecision) -> Result<(Bill, Operation), AppError> {
        let mut tx = self.pool.begin().await?;
        let mut bill = Self::load_locked(&mut tx, id).await?.ok_or(AppError::BillNotFound)?;
        let operation = decide(&mut bill)?;
        Self::persist(&mut tx, &bill).await?;
        Self::insert_operation(&mut tx, &operation).await?;
        bill.version += 1;
        tx.commit().await?;
        Ok((bill, operation))
    }

    async fn commit_bulk_sync(&self, id: BillId, mutate: BulkSyncMutation) -> Result<(Bill, bool), AppError> {
        let mut tx = self.pool.begin().await?;
        let mut bill = Self::load_locked(&mut tx, id).await?.ok_or(AppError::BillNotFound)?;
        let has_conflict = mutate(&mut bill)?;
        Self::persist(&mut tx, &bill).await?;
        bill.version += 1;
        tx.commit().await?;
        Ok((bill, has_conflict))
    }

    async fn commit_delta_sync(&self, id: BillId, mutate: DeltaSyncMutation) -> Result<(Bill, Vec<ConflictInfo>), AppError> {
        let mut tx = self.pool.begin().await?;
        let mut bill = Self::load_locked(&mut tx, id).await?.ok_or(AppError::BillNotFound)?;
        let conflicts = mutate(&mut bill)?;
        Self::persist(&mut tx, &bill).await?;
        bill.version += 1;
        tx.commit().await?;
        Ok((bill, conflicts))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

