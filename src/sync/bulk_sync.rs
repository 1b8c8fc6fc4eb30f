//! Bulk sync: one-shot full-state update for long-offline clients.
//!
//! Under conflict (`base_version < bill.version`), `ADD`s still merge —
//! only `UPDATE`/`DELETE` of existing entities are skipped. Id-mapping
//! tables are populated for every upsert regardless of conflict, because
//! the client needs them to reconcile local state either way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{
    Bill, BillId, Expense, ExpenseId, ExpenseItem, ItemId, Member, MemberId, SettledTransfer, UserId,
};
use crate::error::AppError;
use crate::merge::{reallocate_expense, reallocate_item};
use crate::repository::BillStore;
use crate::sync::dto::{ExpenseUpsert, IdMappings, ItemUpsert, MemberUpsert, SyncBillRequest, SyncBillResponse};

pub struct BulkSyncEngine {
    store: Arc<dyn BillStore>,
    clock: Arc<dyn Clock>,
}

impl BulkSyncEngine {
    pub fn new(store: Arc<dyn BillStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn bulk_sync(&self, request: SyncBillRequest, owner: Option<UserId>) -> Result<SyncBillResponse, AppError> {
        let bill_id = match &request.remote_id {
            Some(raw) => {
                let id: BillId = Uuid::parse_str(raw)
                    .map_err(|_| AppError::Validation("invalid remote_id".into()))?
                    .into();
                id
            }
            None => match self.identify_or_create(&request, owner).await? {
                IdentifyOutcome::Replay(bill) => {
                    return Ok(self.response_for_existing(bill));
                }
                IdentifyOutcome::Created(id) => id,
            },
        };

        let mappings: Arc<Mutex<IdMappings>> = Arc::new(Mutex::new(IdMappings::default()));
        let mappings_for_closure = mappings.clone();
        let clock = self.clock.clone();
        let base_version = request.base_version;
        let name = request.name.clone();
        let members = request.members.clone();
        let deleted_member_ids = request.deleted_member_ids.clone();
        let expenses = request.expenses.clone();
        let deleted_expense_ids = request.deleted_expense_ids.clone();
        let settled_transfers = request.settled_transfers.clone();
        let deleted_settled_transfers = request.deleted_settled_transfers.clone();

        let mutate: crate::repository::BulkSyncMutation = Box::new(move |bill: &mut Bill| {
            let has_conflict = bill.version < base_version;
            let now = clock.now();
            let mut mappings = mappings_for_closure.lock().expect("mappings mutex poisoned");

            if let Some(name) = name {
                if !has_conflict {
                    bill.name = name;
                }
            }

            apply_member_upserts(bill, &members, has_conflict, &mut mappings);
            if !has_conflict {
                for raw in &deleted_member_ids {
                    if let Some(id) = resolve_ref(raw, &mappings.members, |s| bill.is_live_member_str(s)) {
                        bill.remove_member_cascading(id);
                    }
                }
            }

            apply_expense_upserts(bill, &expenses, has_conflict, &mut mappings);
            if !has_conflict {
                for raw in &deleted_expense_ids {
                    if let Some(id) = Uuid::parse_str(raw).ok().map(ExpenseId::from) {
                        bill.expenses.retain(|e| e.id != id);
                    }
                }
            }

            apply_settled_transfer_deltas(bill, &settled_transfers, &deleted_settled_transfers, &mappings, now);

            bill.touch(now);
            Ok(has_conflict)
        });

        let (bill, has_conflict) = self.store.commit_bulk_sync(bill_id, mutate).await?;
        let id_mappings = Arc::try_unwrap(mappings)
            .map(|m| m.into_inner().expect("mappings mutex poisoned"))
            .unwrap_or_default();

        Ok(SyncBillResponse {
            remote_id: bill.id.to_string(),
            version: bill.version,
            share_code: bill.share_code.clone(),
            id_mappings,
            server_time: Utc::now(),
            latest_bill: if has_conflict { Some(bill) } else { None },
        })
    }

    async fn identify_or_create(
        &self,
        request: &SyncBillRequest,
        owner: Option<UserId>,
    ) -> Result<IdentifyOutcome, AppError> {
        if let Some(owner) = owner {
            if !request.local_id.is_empty() {
                if let Some(existing) = self.store.find_bill_by_local_owner(&request.local_id, owner).await? {
                    return Ok(IdentifyOutcome::Replay(existing));
                }

                let share_code = generate_share_code();
                let now = Utc::now();
                let bill = Bill {
                    id: BillId::new(),
                    name: request.name.clone().unwrap_or_else(|| "Untitled".into()),
                    owner_id: Some(owner),
                    share_code: Some(share_code),
                    version: 1,
                    local_client_id: Some(request.local_id.clone()),
                    members: Vec::new(),
                    expenses: Vec::new(),
                    settled_transfers: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };

                return match self.store.insert_bare_bill(&bill).await {
                    Ok(()) => Ok(IdentifyOutcome::Created(bill.id)),
                    Err(e) if is_unique_violation(&e) => {
                        // Lost the race: another first-time sync with the
                        // same (local_id, owner) committed first.
                        match self.store.find_bill_by_local_owner(&request.local_id, owner).await? {
                            Some(existing) => Ok(IdentifyOutcome::Replay(existing)),
                            None => Err(e),
                        }
                    }
                    Err(e) => Err(e),
                };
            }
        }

        let share_code = generate_share_code();
        let now = Utc::now();
        let bill = Bill {
            id: BillId::new(),
            name: request.name.clone().unwrap_or_else(|| "Untitled".into()),
            owner_id: owner,
            share_code: Some(share_code),
            version: 1,
            local_client_id: None,
            members: Vec::new(),
            expenses: Vec::new(),
            settled_transfers: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_bare_bill(&bill).await?;
        Ok(IdentifyOutcome::Created(bill.id))
    }

    fn response_for_existing(&self, bill: Bill) -> SyncBillResponse {
        SyncBillResponse {
            remote_id: bill.id.to_string(),
            version: bill.version,
            share_code: bill.share_code.clone(),
            id_mappings: IdMappings::default(),
            server_time: Utc::now(),
            latest_bill: Some(bill),
        }
    }
}

enum IdentifyOutcome {
    Replay(Bill),
    Created(BillId),
}

fn is_unique_violation(e: &AppError) -> bool {
    matches!(e, AppError::Storage(msg) if msg.contains("duplicate key") || msg.contains("unique constraint"))
}

fn generate_share_code() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..8).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

/// Resolve a client-supplied id: first through this request's local-id
/// mapping, then as a live remote id.
fn resolve_ref(raw: &str, local_map: &HashMap<String, String>, is_live: impl Fn(&str) -> bool) -> Option<MemberId> {
    if let Some(mapped) = local_map.get(raw) {
        return Uuid::parse_str(mapped).ok().map(MemberId::from);
    }
    if is_live(raw) {
        return Uuid::parse_str(raw).ok().map(MemberId::from);
    }
    None
}

impl Bill {
    fn is_live_member_str(&self, raw: &str) -> bool {
        Uuid::parse_str(raw).map(|u| self.is_live_member(u.into())).unwrap_or(false)
    }
}

fn apply_member_upserts(bill: &mut Bill, upserts: &[MemberUpsert], has_conflict: bool, mappings: &mut IdMappings) {
    for upsert in upserts {
        match &upsert.remote_id {
            Some(remote_id) => {
                if let Some(local_id) = &upsert.local_id {
                    mappings.members.insert(local_id.clone(), remote_id.to_string());
                }
                if !has_conflict {
                    if let Some(m) = bill.member_mut(*remote_id) {
                        m.name = upsert.name.clone();
                        if let Some(order) = upsert.display_order {
                            m.display_order = order;
                        }
                    }
                }
            }
            None => {
                let id = MemberId::new();
                bill.members.push(Member {
                    id,
                    bill_id: bill.id,
                    name: upsert.name.clone(),
                    display_order: upsert.display_order.unwrap_or(bill.members.len() as i32),
                    linked_user_id: None,
                    claimed_at: None,
                    original_name: None,
                    local_client_id: upsert.local_id.clone(),
                });
                if let Some(local_id) = &upsert.local_id {
                    mappings.members.insert(local_id.clone(), id.to_string());
                }
            }
        }
    }
}

fn apply_expense_upserts(
    bill: &mut Bill,
    upserts: &[ExpenseUpsert],
    has_conflict: bool,
    mappings: &mut IdMappings,
) {
    for upsert in upserts {
        let resolved_participants: Vec<MemberId> = upsert
            .participant_ids
            .iter()
            .filter_map(|raw| resolve_ref(raw, &mappings.members, |s| bill.is_live_member_str(s)))
            .collect();
        let paid_by = upsert
            .paid_by_id
            .as_ref()
            .and_then(|raw| resolve_ref(raw, &mappings.members, |s| bill.is_live_member_str(s)));

        let expense_id = match &upsert.remote_id {
            Some(raw) => {
                let Some(id) = Uuid::parse_str(raw).ok().map(ExpenseId::from) else { continue };
                if let Some(local_id) = &upsert.local_id {
                    mappings.expenses.insert(local_id.clone(), id.to_string());
                }
                if !has_conflict {
                    if let Some(e) = bill.expense_mut(id) {
                        e.name = upsert.name.clone();
                        e.amount = upsert.amount;
                        if let Some(fee) = upsert.service_fee_percent {
                            e.service_fee_percent = fee;
                        }
                        e.is_itemized = upsert.is_itemized;
                        if paid_by.is_some() {
                            e.paid_by_member_id = paid_by;
                        }
                    }
                    if !resolved_participants.is_empty() {
                        reallocate_expense(bill, id, &resolved_participants);
                    }
                }
                id
            }
            None => {
                let id = ExpenseId::new();
                bill.expenses.push(Expense {
                    id,
                    bill_id: bill.id,
                    name: upsert.name.clone(),
                    amount: upsert.amount,
                    service_fee_percent: upsert.service_fee_percent.unwrap_or(rust_decimal::Decimal::ZERO),
                    is_itemized: upsert.is_itemized,
                    paid_by_member_id: paid_by,
                    local_client_id: upsert.local_id.clone(),
                    participants: Vec::new(),
                    items: Vec::new(),
                });
                if !resolved_participants.is_empty() {
                    reallocate_expense(bill, id, &resolved_participants);
                }
                if let Some(local_id) = &upsert.local_id {
                    mappings.expenses.insert(local_id.clone(), id.to_string());
                }
                id
            }
        };

        apply_item_upserts(bill, expense_id, &upsert.items, has_conflict, mappings);
    }
}

fn apply_item_upserts(
    bill: &mut Bill,
    expense_id: ExpenseId,
    upserts: &[ItemUpsert],
    has_conflict: bool,
    mappings: &mut IdMappings,
) {
    for upsert in upserts {
        let resolved_participants: Vec<MemberId> = upsert
            .participant_ids
            .iter()
            .filter_map(|raw| resolve_ref(raw, &mappings.members, |s| bill.is_live_member_str(s)))
            .collect();
        let paid_by = upsert
            .paid_by_id
            .as_ref()
            .and_then(|raw| resolve_ref(raw, &mappings.members, |s| bill.is_live_member_str(s)));

        match &upsert.remote_id {
            Some(raw) => {
                let Some(id) = Uuid::parse_str(raw).ok().map(ItemId::from) else { continue };
                if let Some(local_id) = &upsert.local_id {
                    mappings.expense_items.insert(local_id.clone(), id.to_string());
                }
                if !has_conflict {
                    if let Some(item) = bill.item_mut(id) {
                        item.name = upsert.name.clone();
                        item.amount = upsert.amount;
                        if paid_by.is_some() {
                            item.paid_by_member_id = paid_by;
                        }
                    }
                    if !resolved_participants.is_empty() {
                        reallocate_item(bill, id, &resolved_participants);
                    }
                }
            }
            None => {
                let id = ItemId::new();
                if let Some(e) = bill.expense_mut(expense_id) {
                    e.items.push(ExpenseItem {
                        id,
                        expense_id,
                        name: upsert.name.clone(),
                        amount: upsert.amount,
                        paid_by_member_id: paid_by,
                        local_client_id: upsert.local_id.clone(),
                        participants: Vec::new(),
                    });
                }
                if !resolved_participants.is_empty() {
                    reallocate_item(bill, id, &resolved_participants);
                }
                if let Some(local_id) = &upsert.local_id {
                    mappings.expense_items.insert(local_id.clone(), id.to_string());
                }
            }
        }
    }
}

fn apply_settled_transfer_deltas(
    bill: &mut Bill,
    upserts: &[String],
    deletes: &[String],
    mappings: &IdMappings,
    now: chrono::DateTime<Utc>,
) {
    for raw in upserts {
        let Some((from, to, amount)) = parse_settled_transfer(raw) else { continue };
        let Some(from_id) = resolve_ref(&from, &mappings.members, |s| bill.is_live_member_str(s)) else { continue };
        let Some(to_id) = resolve_ref(&to, &mappings.members, |s| bill.is_live_member_str(s)) else { continue };
        let amount = amount.unwrap_or(rust_decimal::Decimal::ZERO);
        if !bill.settled_transfers.iter().any(|t| t.from_member_id == from_id && t.to_member_id == to_id) {
            bill.settled_transfers.push(SettledTransfer {
                bill_id: bill.id,
                from_member_id: from_id,
                to_member_id: to_id,
                amount,
                settled_at: now,
            });
        }
    }

    for raw in deletes {
        if let Some((from, to, _)) = parse_settled_transfer(raw) {
            if let (Some(from_id), Some(to_id)) = (
                resolve_ref(&from, &mappings.members, |s| bill.is_live_member_str(s)),
                resolve_ref(&to, &mappings.members, |s| bill.is_live_member_str(s)),
            ) {
                bill.settled_transfers
                    .retain(|t| !(t.from_member_id == from_id && t.to_member_id == to_id));
            }
        }
    }
}

/// Parse `"fromId::toId[:amount]"`, accepting `-` as a legacy separator
/// between `fromId` and `toId` too. Returns `None` for anything else —
/// such entries are dropped silently per spec.md §4.4.
pub(crate) fn parse_settled_transfer(raw: &str) -> Option<(String, String, Option<rust_decimal::Decimal>)> {
    let (ids_part, rest) = raw.split_once("::").or_else(|| raw.split_once('-'))?;
    let mut amount = None;
    let to_part = if let Some((to, amt)) = rest.split_once(':') {
        amount = amt.parse().ok();
        to
    } else {
        rest
    };
    Some((ids_part.to_string(), to_part.to_string(), amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_separator() {
        let (from, to, amount) = parse_settled_transfer("m1::m2:12.50").unwrap();
        assert_eq!(from, "m1");
        assert_eq!(to, "m2");
        assert_eq!(amount, Some(rust_decimal::Decimal::new(1250, 2)));
    }

    #[test]
    fn parses_legacy_separator() {
        let (from, to, amount) = parse_settled_transfer("m1-m2").unwrap();
        assert_eq!(from, "m1");
        assert_eq!(to, "m2");
        assert_eq!(amount, None);
    }

    #[test]
    fn unparseable_entries_are_dropped() {
        assert!(parse_settled_transfer("garbage").is_none());
    }
}
