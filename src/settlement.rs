//! Settlement calculator: per-member balances and a minimal transfer set.
//!
//! Pure and deterministic — depends only on the Bill aggregate and the set
//! of currently marked-settled transfers. Does not mutate anything.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Bill, MemberId};
use crate::money::MoneyAllocator;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberBalance {
    pub member_id: MemberId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferDto {
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
    pub amount: Decimal,
    pub is_settled: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub total_amount: Decimal,
    pub total_with_service_fee: Decimal,
    pub member_balances: Vec<MemberBalance>,
    pub transfers: Vec<TransferDto>,
}

pub struct SettlementCalculator;

impl SettlementCalculator {
    /// `settled` holds `(from_member_id, to_member_id)` pairs currently
    /// marked settled — membership only, used to flag `is_settled` on the
    /// emitted transfers. Marking a transfer settled never changes the
    /// balances themselves.
    pub fn compute(bill: &Bill, settled: &HashSet<(MemberId, MemberId)>) -> SettlementResult {
        let mut balances: Vec<(MemberId, Decimal)> =
            bill.members.iter().map(|m| (m.id, Decimal::ZERO)).collect();
        let mut total_amount = Decimal::ZERO;
        let mut total_with_fee = Decimal::ZERO;

        let credit = |balances: &mut Vec<(MemberId, Decimal)>, id: MemberId, amount: Decimal| {
            if let Some(entry) = balances.iter_mut().find(|(m, _)| *m == id) {
                entry.1 += amount;
            }
        };
        let debit = |balances: &mut Vec<(MemberId, Decimal)>, id: MemberId, amount: Decimal| {
            if let Some(entry) = balances.iter_mut().find(|(m, _)| *m == id) {
                entry.1 -= amount;
            }
        };

        for expense in &bill.expenses {
            let Some(payer) = expense.paid_by_member_id else { continue };

            if !expense.is_itemized {
                if expense.participants.is_empty() {
                    continue;
                }
                let with_fee = MoneyAllocator::apply_service_fee(expense.amount, expense.service_fee_percent);
                total_amount += expense.amount;
                total_with_fee += with_fee;
                credit(&mut balances, payer, with_fee);
                for participant in &expense.participants {
                    debit(&mut balances, participant.member_id, participant.amount);
                }
            } else {
                for item in &expense.items {
                    let Some(item_payer) = item.paid_by_member_id else { continue };
                    if item.participants.is_empty() {
                        continue;
                    }
                    let with_fee = MoneyAllocator::apply_service_fee(item.amount, expense.service_fee_percent);
                    let shares = MoneyAllocator::allocate(with_fee, item.participants.len());
                    total_amount += item.amount;
                    total_with_fee += with_fee;
                    credit(&mut balances, item_payer, with_fee);
                    for (participant, share) in item.participants.iter().zip(shares) {
                        debit(&mut balances, participant.member_id, share);
                    }
                }
            }
        }

        let member_balances: Vec<MemberBalance> = balances
            .iter()
            .map(|(id, balance)| MemberBalance { member_id: *id, balance: balance.round_dp(2) })
            .collect();

        let transfers = minimal_transfers(&member_balances, settled);

        SettlementResult {
            total_amount: total_amount.round_dp(2),
            total_with_service_fee: total_with_fee.round_dp(2),
            member_balances,
            transfers,
        }
    }
}

const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

fn minimal_transfers(
    balances: &[MemberBalance],
    settled: &HashSet<(MemberId, MemberId)>,
) -> Vec<TransferDto> {
    let mut creditors: Vec<(MemberId, Decimal)> = balances
        .iter()
        .filter(|b| b.balance > EPSILON)
        .map(|b| (b.member_id, b.balance))
        .collect();
    let mut debtors: Vec<(MemberId, Decimal)> = balances
        .iter()
        .filter(|b| b.balance < -EPSILON)
        .map(|b| (b.member_id, -b.balance))
        .collect();

    creditors.sort_by(|a, b| b.1.cmp(&a.1));
    debtors.sort_by(|a, b| b.1.cmp(&a.1));

    let mut transfers = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < creditors.len() && j < debtors.len() {
        let (creditor_id, credit_amt) = creditors[i];
        let (debtor_id, debt_amt) = debtors[j];
        let amount = credit_amt.min(debt_amt);

        if amount > EPSILON {
            let is_settled = settled.contains(&(debtor_id, creditor_id));
            transfers.push(TransferDto {
                from_member_id: debtor_id,
                to_member_id: creditor_id,
                amount,
                is_settled,
            });
        }

        creditors[i].1 -= amount;
        debtors[j].1 -= amount;

        if creditors[i].1 <= EPSILON {
            i += 1;
        }
        if debtors[j].1 <= EPSILON {
            j += 1;
        }
    }

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BillId, Expense, ExpenseId, ExpenseParticipant, Member};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn member(name: &str) -> Member {
        Member {
            id: MemberId::new(),
            bill_id: BillId::new(),
            name: name.into(),
            display_order: 0,
            linked_user_id: None,
            claimed_at: None,
            original_name: None,
            local_client_id: None,
        }
    }

    fn simple_expense(name: &str, amount: Decimal, payer: MemberId, participants: &[(MemberId, Decimal)]) -> Expense {
        Expense {
            id: ExpenseId::new(),
            bill_id: BillId::new(),
            name: name.into(),
            amount,
            service_fee_percent: Decimal::ZERO,
            is_itemized: false,
            paid_by_member_id: Some(payer),
            local_client_id: None,
            participants: participants
                .iter()
                .map(|(m, amt)| ExpenseParticipant { expense_id: ExpenseId::new(), member_id: *m, amount: *amt })
                .collect(),
            items: Vec::new(),
        }
    }

    #[test]
    fn three_payer_scenario_matches_spec() {
        let a = member("A");
        let b = member("B");
        let c = member("C");
        let now = Utc::now();

        let mut bill = Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: None,
            share_code: None,
            version: 1,
            local_client_id: None,
            members: vec![a.clone(), b.clone(), c.clone()],
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        // A pays 900 for {A, B}: 450 each.
        bill.expenses.push(simple_expense(
            "Hotel",
            dec!(900),
            a.id,
            &[(a.id, dec!(450)), (b.id, dec!(450))],
        ));
        // B pays 300 for {A, B, C}: 100 each.
        bill.expenses.push(simple_expense(
            "Dinner",
            dec!(300),
            b.id,
            &[(a.id, dec!(100)), (b.id, dec!(100)), (c.id, dec!(100))],
        ));

        let result = SettlementCalculator::compute(&bill, &HashSet::new());

        let bal = |id: MemberId| {
            result.member_balances.iter().find(|m| m.member_id == id).unwrap().balance
        };
        assert_eq!(bal(a.id), dec!(350));
        assert_eq!(bal(b.id), dec!(-250));
        assert_eq!(bal(c.id), dec!(-100));

        assert_eq!(result.transfers.len(), 2);
        let total: Decimal = result.transfers.iter().map(|t| t.amount).sum();
        assert_eq!(total, dec!(350));
        assert!(result.transfers.iter().all(|t| t.to_member_id == a.id));
    }

    #[test]
    fn empty_participants_contribute_nothing() {
        let a = member("A");
        let now = Utc::now();
        let mut bill = Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: None,
            share_code: None,
            version: 1,
            local_client_id: None,
            members: vec![a.clone()],
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        bill.expenses.push(simple_expense("Nothing", dec!(50), a.id, &[]));

        let result = SettlementCalculator::compute(&bill, &HashSet::new());
        assert_eq!(result.member_balances[0].balance, Decimal::ZERO);
        assert!(result.transfers.is_empty());
    }

    #[test]
    fn is_settled_reflects_membership() {
        let a = member("A");
        let b = member("B");
        let now = Utc::now();
        let mut bill = Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: None,
            share_code: None,
            version: 1,
            local_client_id: None,
            members: vec![a.clone(), b.clone()],
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        bill.expenses.push(simple_expense(
            "Split",
            dec!(20),
            a.id,
            &[(a.id, dec!(10)), (b.id, dec!(10))],
        ));

        let mut settled = HashSet::new();
        settled.insert((b.id, a.id));
        let result = SettlementCalculator::compute(&bill, &settled);
        assert!(result.transfers[0].is_settled);
    }
}
