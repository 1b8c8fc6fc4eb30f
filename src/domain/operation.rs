//! The operation log entry and its polymorphic payload.
//!
//! `OperationPayload` is a tagged enum rather than a probed JSON blob — the
//! merger dispatches on the variant, never on ad-hoc field presence (see
//! DESIGN.md "Polymorphic operations").

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{BillId, ExpenseId, ItemId, MemberId, OperationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpType {
    BillUpdateMeta,
    MemberAdd,
    MemberUpdate,
    MemberClaim,
    MemberUnclaim,
    MemberReorder,
    MemberRemove,
    ExpenseAdd,
    ExpenseUpdate,
    ExpenseDelete,
    ExpenseSetParticipants,
    ExpenseToggleItemized,
    ItemAdd,
    ItemUpdate,
    ItemDelete,
    ItemSetParticipants,
    SettlementMark,
    SettlementUnmark,
    SettlementClearAll,
}

impl OpType {
    /// The wire/column string, matching the `SCREAMING_SNAKE_CASE` serde
    /// rename so the same literal appears in JSON and in the `op_type`
    /// column.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::BillUpdateMeta => "BILL_UPDATE_META",
            OpType::MemberAdd => "MEMBER_ADD",
            OpType::MemberUpdate => "MEMBER_UPDATE",
            OpType::MemberClaim => "MEMBER_CLAIM",
            OpType::MemberUnclaim => "MEMBER_UNCLAIM",
            OpType::MemberReorder => "MEMBER_REORDER",
            OpType::MemberRemove => "MEMBER_REMOVE",
            OpType::ExpenseAdd => "EXPENSE_ADD",
            OpType::ExpenseUpdate => "EXPENSE_UPDATE",
            OpType::ExpenseDelete => "EXPENSE_DELETE",
            OpType::ExpenseSetParticipants => "EXPENSE_SET_PARTICIPANTS",
            OpType::ExpenseToggleItemized => "EXPENSE_TOGGLE_ITEMIZED",
            OpType::ItemAdd => "ITEM_ADD",
            OpType::ItemUpdate => "ITEM_UPDATE",
            OpType::ItemDelete => "ITEM_DELETE",
            OpType::ItemSetParticipants => "ITEM_SET_PARTICIPANTS",
            OpType::SettlementMark => "SETTLEMENT_MARK",
            OpType::SettlementUnmark => "SETTLEMENT_UNMARK",
            OpType::SettlementClearAll => "SETTLEMENT_CLEAR_ALL",
        }
    }
}

/// A logged, typed edit. `target_id` is the member/expense/item id the
/// operation acts on, when the op_type requires one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: OperationId,
    pub bill_id: BillId,
    pub version: i64,
    pub op_type: OpType,
    pub target_id: Option<String>,
    pub payload: OperationPayload,
    pub actor_user_id: Option<UserId>,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationPayload {
    BillUpdateMeta { name: String },
    #[serde(rename_all = "camelCase")]
    MemberAdd { name: String, display_order: Option<i32> },
    #[serde(rename_all = "camelCase")]
    MemberUpdate { name: Option<String>, display_order: Option<i32> },
    MemberClaim,
    MemberUnclaim,
    MemberReorder { order: Vec<MemberId> },
    MemberRemove,
    #[serde(rename_all = "camelCase")]
    ExpenseAdd {
        name: String,
        amount: Decimal,
        service_fee_percent: Option<Decimal>,
        paid_by_id: Option<MemberId>,
    },
    #[serde(rename_all = "camelCase")]
    ExpenseUpdate {
        name: Option<String>,
        amount: Option<Decimal>,
        service_fee_percent: Option<Decimal>,
        paid_by_id: Option<MemberId>,
    },
    ExpenseDelete,
    #[serde(rename_all = "camelCase")]
    ExpenseSetParticipants { participant_ids: Vec<MemberId> },
    ExpenseToggleItemized,
    #[serde(rename_all = "camelCase")]
    ItemAdd {
        expense_id: ExpenseId,
        name: String,
        amount: Decimal,
        paid_by_id: Option<MemberId>,
    },
    #[serde(rename_all = "camelCase")]
    ItemUpdate {
        name: Option<String>,
        amount: Option<Decimal>,
        paid_by_id: Option<MemberId>,
    },
    ItemDelete,
    #[serde(rename_all = "camelCase")]
    ItemSetParticipants { participant_ids: Vec<MemberId> },
    #[serde(rename_all = "camelCase")]
    SettlementMark {
        from_member_id: MemberId,
        to_member_id: MemberId,
        amount: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    SettlementUnmark {
        from_member_id: MemberId,
        to_member_id: MemberId,
    },
    SettlementClearAll,
}

impl OperationPayload {
    pub fn op_type(&self) -> OpType {
        match self {
            OperationPayload::BillUpdateMeta { .. } => OpType::BillUpdateMeta,
            OperationPayload::MemberAdd { .. } => OpType::MemberAdd,
            OperationPayload::MemberUpdate { .. } => OpType::MemberUpdate,
            OperationPayload::MemberClaim => OpType::MemberClaim,
            OperationPayload::MemberUnclaim => OpType::MemberUnclaim,
            OperationPayload::MemberReorder { .. } => OpType::MemberReorder,
            OperationPayload::MemberRemove => OpType::MemberRemove,
            OperationPayload::ExpenseAdd { .. } => OpType::ExpenseAdd,
            OperationPayload::ExpenseUpdate { .. } => OpType::ExpenseUpdate,
            OperationPayload::ExpenseDelete => OpType::ExpenseDelete,
            OperationPayload::ExpenseSetParticipants { .. } => OpType::ExpenseSetParticipants,
            OperationPayload::ExpenseToggleItemized => OpType::ExpenseToggleItemized,
            OperationPayload::ItemAdd { .. } => OpType::ItemAdd,
            OperationPayload::ItemUpdate { .. } => OpType::ItemUpdate,
            OperationPayload::ItemDelete => OpType::ItemDelete,
            OperationPayload::ItemSetParticipants { .. } => OpType::ItemSetParticipants,
            OperationPayload::SettlementMark { .. } => OpType::SettlementMark,
            OperationPayload::SettlementUnmark { .. } => OpType::SettlementUnmark,
            OperationPayload::SettlementClearAll => OpType::SettlementClearAll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_matches_serde_rename() {
        let payload = OperationPayload::MemberRemove;
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "MEMBER_REMOVE");
        assert_eq!(payload.op_type().as_str(), "MEMBER_REMOVE");
    }
}
