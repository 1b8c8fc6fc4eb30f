//! The Bill aggregate: members, expenses, items, participants and settled
//! transfers, held as owned collections keyed by id rather than modeled with
//! back-reference ownership (see DESIGN.md "Aggregate cycles").

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use utoipa::ToSchema;

use super::ids::{BillId, ExpenseId, ItemId, MemberId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: BillId,
    pub name: String,
    pub owner_id: Option<UserId>,
    pub share_code: Option<String>,
    pub version: i64,
    pub local_client_id: Option<String>,
    pub members: Vec<Member>,
    pub expenses: Vec<Expense>,
    pub settled_transfers: Vec<SettledTransfer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub bill_id: BillId,
    pub name: String,
    pub display_order: i32,
    pub linked_user_id: Option<UserId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub original_name: Option<String>,
    pub local_client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub bill_id: BillId,
    pub name: String,
    pub amount: Decimal,
    pub service_fee_percent: Decimal,
    pub is_itemized: bool,
    pub paid_by_member_id: Option<MemberId>,
    pub local_client_id: Option<String>,
    pub participants: Vec<ExpenseParticipant>,
    pub items: Vec<ExpenseItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    pub id: ItemId,
    pub expense_id: ExpenseId,
    pub name: String,
    pub amount: Decimal,
    pub paid_by_member_id: Option<MemberId>,
    pub local_client_id: Option<String>,
    pub participants: Vec<ExpenseItemParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseParticipant {
    pub expense_id: ExpenseId,
    pub member_id: MemberId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItemParticipant {
    pub item_id: ItemId,
    pub member_id: MemberId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettledTransfer {
    pub bill_id: BillId,
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
    pub amount: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl Bill {
    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn member_mut(&mut self, id: MemberId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| m.id == id)
    }

    pub fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    pub fn expense_mut(&mut self, id: ExpenseId) -> Option<&mut Expense> {
        self.expenses.iter_mut().find(|e| e.id == id)
    }

    pub fn item(&self, id: ItemId) -> Option<&ExpenseItem> {
        self.expenses.iter().flat_map(|e| e.items.iter()).find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut ExpenseItem> {
        self.expenses
            .iter_mut()
            .flat_map(|e| e.items.iter_mut())
            .find(|i| i.id == id)
    }

    /// True if `id` names a live member of this bill — the guard against
    /// ghost references required before any write that stores a member id.
    pub fn is_live_member(&self, id: MemberId) -> bool {
        self.member(id).is_some()
    }

    /// Remove a member and every record that references it: expense/item
    /// `paid_by_member_id`, participant rows, and settled transfers. Order
    /// matters — settled transfers are removed first so the member row
    /// itself never violates the `RESTRICT` foreign key.
    pub fn remove_member_cascading(&mut self, id: MemberId) {
        self.settled_transfers
            .retain(|t| t.from_member_id != id && t.to_member_id != id);

        for expense in &mut self.expenses {
            if expense.paid_by_member_id == Some(id) {
                expense.paid_by_member_id = None;
            }
            expense.participants.retain(|p| p.member_id != id);
            for item in &mut expense.items {
                if item.paid_by_member_id == Some(id) {
                    item.paid_by_member_id = None;
                }
                item.participants.retain(|p| p.member_id != id);
            }
        }

        self.members.retain(|m| m.id != id);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
