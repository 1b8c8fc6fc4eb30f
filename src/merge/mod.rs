//! Snapshot merge engine.
//!
//! Applies a single [`Operation`] to an in-memory [`Bill`] aggregate,
//! dispatching on the operation's tag — never by probing payload fields.
//! A mutating op whose target cannot be resolved is a documented no-op: the
//! operation is still considered applied (it stays in the log with its
//! version) so replays stay idempotent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Bill, Expense, ExpenseId, ExpenseItem, ExpenseItemParticipant, ExpenseParticipant, ItemId,
    Member, MemberId, Operation, OperationPayload, SettledTransfer,
};
use crate::money::MoneyAllocator;

pub struct SnapshotMerger;

impl SnapshotMerger {
    /// Apply `op` to `bill`, mutating it in place. `op.target_id` is parsed
    /// as a UUID for ops that need one; a missing or unparseable target on
    /// such an op is a no-op.
    pub fn apply(bill: &mut Bill, op: &Operation, now: DateTime<Utc>) {
        let target = op.target_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());

        match &op.payload {
            OperationPayload::BillUpdateMeta { name } => {
                bill.name = name.clone();
            }
            OperationPayload::MemberAdd { name, display_order } => {
                let id = target.map(MemberId::from).unwrap_or_else(MemberId::new);
                let display_order = display_order.unwrap_or(bill.members.len() as i32);
                bill.members.push(Member {
                    id,
                    bill_id: bill.id,
                    name: name.clone(),
                    display_order,
                    linked_user_id: None,
                    claimed_at: None,
                    original_name: None,
                    local_client_id: None,
                });
            }
            OperationPayload::MemberUpdate { name, display_order } => {
                let Some(id) = target.map(MemberId::from) else { return };
                if let Some(m) = bill.member_mut(id) {
                    if let Some(name) = name {
                        m.name = name.clone();
                    }
                    if let Some(order) = display_order {
                        m.display_order = *order;
                    }
                }
            }
            OperationPayload::MemberClaim => {
                let Some(id) = target.map(MemberId::from) else { return };
                let actor = op.actor_user_id;
                if let Some(m) = bill.member_mut(id) {
                    m.original_name = Some(m.name.clone());
                    m.linked_user_id = actor;
                    m.claimed_at = Some(now);
                }
            }
            OperationPayload::MemberUnclaim => {
                let Some(id) = target.map(MemberId::from) else { return };
                if let Some(m) = bill.member_mut(id) {
                    if let Some(original) = m.original_name.take() {
                        m.name = original;
                    }
                    m.linked_user_id = None;
                    m.claimed_at = None;
                }
            }
            OperationPayload::MemberReorder { order } => {
                for (idx, member_id) in order.iter().enumerate() {
                    if let Some(m) = bill.member_mut(*member_id) {
                        m.display_order = idx as i32;
                    }
                }
            }
            OperationPayload::MemberRemove => {
                let Some(id) = target.map(MemberId::from) else { return };
                bill.remove_member_cascading(id);
            }
            OperationPayload::ExpenseAdd {
                name,
                amount,
                service_fee_percent,
                paid_by_id,
            } => {
                let id = target.map(ExpenseId::from).unwrap_or_else(ExpenseId::new);
                bill.expenses.push(Expense {
                    id,
                    bill_id: bill.id,
                    name: name.clone(),
                    amount: *amount,
                    service_fee_percent: service_fee_percent.unwrap_or(Decimal::ZERO),
                    is_itemized: false,
                    paid_by_member_id: *paid_by_id,
                    local_client_id: None,
                    participants: Vec::new(),
                    items: Vec::new(),
                });
            }
            OperationPayload::ExpenseUpdate {
                name,
                amount,
                service_fee_percent,
                paid_by_id,
            } => {
                let Some(id) = target.map(ExpenseId::from) else { return };
                let participants_ids: Vec<MemberId> = if let Some(e) = bill.expense(id) {
                    e.participants.iter().map(|p| p.member_id).collect()
                } else {
                    return;
                };
                if let Some(e) = bill.expense_mut(id) {
                    if let Some(name) = name {
                        e.name = name.clone();
                    }
                    if let Some(amount) = amount {
                        e.amount = *amount;
                    }
                    if let Some(fee) = service_fee_percent {
                        e.service_fee_percent = *fee;
                    }
                    if let Some(payer) = paid_by_id {
                        e.paid_by_member_id = Some(*payer);
                    }
                }
                if amount.is_some() || service_fee_percent.is_some() {
                    reallocate_expense(bill, id, &participants_ids);
                }
            }
            OperationPayload::ExpenseDelete => {
                let Some(id) = target.map(ExpenseId::from) else { return };
                bill.expenses.retain(|e| e.id != id);
            }
            OperationPayload::ExpenseSetParticipants { participant_ids } => {
                let Some(id) = target.map(ExpenseId::from) else { return };
                reallocate_expense(bill, id, participant_ids);
            }
            OperationPayload::ExpenseToggleItemized => {
                let Some(id) = target.map(ExpenseId::from) else { return };
                if let Some(e) = bill.expense_mut(id) {
                    e.is_itemized = !e.is_itemized;
                }
            }
            OperationPayload::ItemAdd {
                expense_id,
                name,
                amount,
                paid_by_id,
            } => {
                let id = target.map(ItemId::from).unwrap_or_else(ItemId::new);
                if let Some(e) = bill.expense_mut(*expense_id) {
                    e.items.push(ExpenseItem {
                        id,
                        expense_id: *expense_id,
                        name: name.clone(),
                        amount: *amount,
                        paid_by_member_id: *paid_by_id,
                        local_client_id: None,
                        participants: Vec::new(),
                    });
                }
            }
            OperationPayload::ItemUpdate { name, amount, paid_by_id } => {
                let Some(id) = target.map(ItemId::from) else { return };
                let participant_ids: Vec<MemberId> = if let Some(i) = bill.item(id) {
                    i.participants.iter().map(|p| p.member_id).collect()
                } else {
                    return;
                };
                if let Some(item) = bill.item_mut(id) {
                    if let Some(name) = name {
                        item.name = name.clone();
                    }
                    if let Some(amount) = amount {
                        item.amount = *amount;
                    }
                    if let Some(payer) = paid_by_id {
                        item.paid_by_member_id = Some(*payer);
                    }
                }
                if amount.is_some() {
                    reallocate_item(bill, id, &participant_ids);
                }
            }
            OperationPayload::ItemDelete => {
                let Some(id) = target.map(ItemId::from) else { return };
                for e in &mut bill.expenses {
                    e.items.retain(|i| i.id != id);
                }
            }
            OperationPayload::ItemSetParticipants { participant_ids } => {
                let Some(id) = target.map(ItemId::from) else { return };
                reallocate_item(bill, id, participant_ids);
            }
            OperationPayload::SettlementMark {
                from_member_id,
                to_member_id,
                amount,
            } => {
                let exists = bill
                    .settled_transfers
                    .iter()
                    .any(|t| t.from_member_id == *from_member_id && t.to_member_id == *to_member_id);
                if !exists {
                    bill.settled_transfers.push(SettledTransfer {
                        bill_id: bill.id,
                        from_member_id: *from_member_id,
                        to_member_id: *to_member_id,
                        amount: *amount,
                        settled_at: now,
                    });
                }
            }
            OperationPayload::SettlementUnmark { from_member_id, to_member_id } => {
                bill.settled_transfers
                    .retain(|t| !(t.from_member_id == *from_member_id && t.to_member_id == *to_member_id));
            }
            OperationPayload::SettlementClearAll => {
                bill.settled_transfers.clear();
            }
        }

        bill.touch(now);
    }
}

/// Replace an expense's participant set and recompute penny-exact shares.
pub(crate) fn reallocate_expense(bill: &mut Bill, expense_id: ExpenseId, participant_ids: &[MemberId]) {
    let Some(expense) = bill.expense_mut(expense_id) else { return };
    if participant_ids.is_empty() {
        expense.participants.clear();
        return;
    }
    let total = MoneyAllocator::apply_service_fee(expense.amount, expense.service_fee_percent);
    let shares = MoneyAllocator::allocate(total, participant_ids.len());
    expense.participants = participant_ids
        .iter()
        .zip(shares)
        .map(|(member_id, amount)| ExpenseParticipant {
            expense_id,
            member_id: *member_id,
            amount,
        })
        .collect();
}

/// Replace an item's participant set and recompute penny-exact shares.
/// Items have no service fee of their own — that lives on the parent
/// expense and only affects the expense-level allocation.
pub(crate) fn reallocate_item(bill: &mut Bill, item_id: ItemId, participant_ids: &[MemberId]) {
    let Some(item) = bill.item_mut(item_id) else { return };
    if participant_ids.is_empty() {
        item.participants.clear();
        return;
    }
    let shares = MoneyAllocator::allocate(item.amount, participant_ids.len());
    item.participants = participant_ids
        .iter()
        .zip(shares)
        .map(|(member_id, amount)| ExpenseItemParticipant {
            item_id,
            member_id: *member_id,
            amount,
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BillId, OpType, OperationId, UserId};
    use rust_decimal_macros::dec;

    fn empty_bill() -> Bill {
        let now = Utc::now();
        Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: None,
            share_code: None,
            version: 1,
            local_client_id: None,
            members: Vec::new(),
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn op(payload: OperationPayload, target_id: Option<String>) -> Operation {
        Operation {
            id: OperationId::new(),
            bill_id: BillId::new(),
            version: 2,
            op_type: payload.op_type(),
            target_id,
            payload,
            actor_user_id: None,
            client_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn member_add_appends() {
        let mut bill = empty_bill();
        let add = op(
            OperationPayload::MemberAdd { name: "Alice".into(), display_order: None },
            None,
        );
        SnapshotMerger::apply(&mut bill, &add, Utc::now());
        assert_eq!(bill.members.len(), 1);
        assert_eq!(bill.members[0].name, "Alice");
    }

    #[test]
    fn member_update_missing_target_is_noop() {
        let mut bill = empty_bill();
        let update = op(
            OperationPayload::MemberUpdate { name: Some("X".into()), display_order: None },
            None,
        );
        SnapshotMerger::apply(&mut bill, &update, Utc::now());
        assert!(bill.members.is_empty());
    }

    #[test]
    fn claim_then_unclaim_restores_original_name() {
        let mut bill = empty_bill();
        let member_id = MemberId::new();
        bill.members.push(Member {
            id: member_id,
            bill_id: bill.id,
            name: "Bob".into(),
            display_order: 0,
            linked_user_id: None,
            claimed_at: None,
            original_name: None,
            local_client_id: None,
        });

        let mut claim = op(OperationPayload::MemberClaim, Some(member_id.0.to_string()));
        claim.actor_user_id = Some(UserId::new());
        SnapshotMerger::apply(&mut bill, &claim, Utc::now());
        assert!(bill.member(member_id).unwrap().claimed_at.is_some());

        let unclaim = op(OperationPayload::MemberUnclaim, Some(member_id.0.to_string()));
        SnapshotMerger::apply(&mut bill, &unclaim, Utc::now());
        let m = bill.member(member_id).unwrap();
        assert_eq!(m.name, "Bob");
        assert!(m.linked_user_id.is_none());
    }

    #[test]
    fn set_participants_allocates_pennies() {
        let mut bill = empty_bill();
        let m1 = MemberId::new();
        let m2 = MemberId::new();
        let m3 = MemberId::new();
        let expense_id = ExpenseId::new();
        bill.expenses.push(Expense {
            id: expense_id,
            bill_id: bill.id,
            name: "Lunch".into(),
            amount: dec!(1.00),
            service_fee_percent: Decimal::ZERO,
            is_itemized: false,
            paid_by_member_id: Some(m1),
            local_client_id: None,
            participants: Vec::new(),
            items: Vec::new(),
        });

        let set = op(
            OperationPayload::ExpenseSetParticipants { participant_ids: vec![m1, m2, m3] },
            Some(expense_id.0.to_string()),
        );
        SnapshotMerger::apply(&mut bill, &set, Utc::now());

        let shares: Vec<Decimal> = bill.expense(expense_id).unwrap().participants.iter().map(|p| p.amount).collect();
        assert_eq!(shares, vec![dec!(0.34), dec!(0.33), dec!(0.33)]);
        assert_eq!(shares.iter().sum::<Decimal>(), dec!(1.00));
        assert_eq!(OpType::ExpenseSetParticipants, OperationPayload::ExpenseSetParticipants { participant_ids: vec![] }.op_type());
    }

    #[test]
    fn remove_member_clears_settlement_rows_first() {
        let mut bill = empty_bill();
        let m1 = MemberId::new();
        let m2 = MemberId::new();
        bill.members.push(Member {
            id: m1,
            bill_id: bill.id,
            name: "A".into(),
            display_order: 0,
            linked_user_id: None,
            claimed_at: None,
            original_name: None,
            local_client_id: None,
        });
        bill.settled_transfers.push(SettledTransfer {
            bill_id: bill.id,
            from_member_id: m1,
            to_member_id: m2,
            amount: dec!(5.00),
            settled_at: Utc::now(),
        });

        let remove = op(OperationPayload::MemberRemove, Some(m1.0.to_string()));
        SnapshotMerger::apply(&mut bill, &remove, Utc::now());

        assert!(bill.members.is_empty());
        assert!(bill.settled_transfers.is_empty());
    }
}
