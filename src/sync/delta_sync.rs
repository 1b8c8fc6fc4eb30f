//! Delta sync: structured add/update/delete lists with server-wins
//! conflict resolution and ghost-reference rejection.
//!
//! Differs from bulk sync in three ways (spec.md §4.5): conflicts on
//! existing-entity updates/deletes are reported as `ConflictInfo` rather
//! than silently skipped; any unresolved member reference aborts the
//! whole request; every `add` is deduped by `local_id` against the
//! persisted `local_client_id` column as well as the in-request mapping.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Bill, Expense, ExpenseId, ExpenseItem, ItemId, Member, MemberId};
use crate::error::AppError;
use crate::merge::{reallocate_expense, reallocate_item};
use crate::repository::BillStore;
use crate::sync::dto::{
    ConflictInfo, DeltaSyncRequest, DeltaSyncResponse, ExpenseUpsert, IdMappings, ItemUpsert, MemberUpsert,
};

pub struct DeltaSyncEngine {
    store: Arc<dyn BillStore>,
    clock: Arc<dyn Clock>,
}

impl DeltaSyncEngine {
    pub fn new(store: Arc<dyn BillStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn delta_sync(
        &self,
        bill_id: crate::domain::BillId,
        request: DeltaSyncRequest,
    ) -> Result<DeltaSyncResponse, AppError> {
        let mappings: Arc<Mutex<IdMappings>> = Arc::new(Mutex::new(IdMappings::default()));
        let conflicts: Arc<Mutex<Vec<ConflictInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let mappings_for_closure = mappings.clone();
        let conflicts_for_closure = conflicts.clone();
        let clock = self.clock.clone();
        let base_version = request.base_version;

        let mutate: crate::repository::DeltaSyncMutation = Box::new(move |bill: &mut Bill| {
            let has_conflict = bill.version > base_version;
            let now = clock.now();
            let mut mappings = mappings_for_closure.lock().expect("mappings mutex poisoned");
            let mut conflicts = conflicts_for_closure.lock().expect("conflicts mutex poisoned");

            seed_new_member_local_ids(&mut mappings, &request);
            validate_no_ghost_references(bill, &request, &mappings)?;

            for upsert in &request.members.add {
                add_member(bill, upsert, &mut mappings);
            }
            for upsert in &request.members.update {
                update_member(bill, upsert, has_conflict, &mut mappings, &mut conflicts);
            }
            for raw in &request.members.delete {
                delete_member(bill, raw, has_conflict, &mappings, &mut conflicts);
            }

            for upsert in &request.expenses.add {
                add_expense_inner(bill, upsert, &mut mappings);
            }
            for upsert in &request.expenses.update {
                update_expense(bill, upsert, has_conflict, &mut mappings, &mut conflicts);
            }
            for raw in &request.expenses.delete {
                delete_expense(bill, raw, has_conflict, &mappings, &mut conflicts);
            }

            for upsert in &request.items.add {
                add_item(bill, upsert, &mut mappings);
            }
            for upsert in &request.items.update {
                update_item(bill, upsert, has_conflict, &mut mappings, &mut conflicts);
            }
            for raw in &request.items.delete {
                delete_item(bill, raw, has_conflict, &mappings, &mut conflicts);
            }

            bill.touch(now);
            Ok(conflicts.clone())
        });

        let (bill, conflicts) = self.store.commit_delta_sync(bill_id, mutate).await?;
        let id_mappings = Arc::try_unwrap(mappings)
            .map(|m| m.into_inner().expect("mappings mutex poisoned"))
            .unwrap_or_default();

        let merged_bill = if conflicts.is_empty() { None } else { Some(bill.clone()) };

        Ok(DeltaSyncResponse {
            success: true,
            new_version: bill.version,
            id_mappings,
            conflicts,
            merged_bill,
        })
    }
}

/// Register every `members.add` local id in `mappings` before validation
/// runs, so a new member and an `add`ed expense/item referencing that same
/// local id in the same batch resolve correctly. `add_member` overwrites
/// these placeholder entries with the real member id once applied.
fn seed_new_member_local_ids(mappings: &mut IdMappings, request: &DeltaSyncRequest) {
    for upsert in &request.members.add {
        if let Some(local_id) = &upsert.local_id {
            mappings.members.entry(local_id.clone()).or_insert_with(String::new);
        }
    }
}

/// Resolve every referenced member id (payer or participant) on every
/// `add`/`update` through `memberIdMappings ∪ liveMemberIds`; fail the
/// whole request if any id is unresolved. `mappings` must already be
/// seeded with this batch's `members.add` local ids (see
/// [`seed_new_member_local_ids`]) so a same-batch new-member reference
/// resolves instead of being rejected as a ghost reference.
fn validate_no_ghost_references(bill: &Bill, request: &DeltaSyncRequest, mappings: &IdMappings) -> Result<(), AppError> {
    let resolve = |raw: &str| -> bool {
        mappings.members.contains_key(raw) || Uuid::parse_str(raw).map(|u| bill.is_live_member(u.into())).unwrap_or(false)
    };

    for m in &request.members.update {
        if let Some(existing) = &m.remote_id {
            if !bill.is_live_member(*existing) {
                return Err(AppError::InvalidMemberReference(existing.to_string()));
            }
        }
    }

    for e in request.expenses.add.iter().chain(request.expenses.update.iter()) {
        if let Some(payer) = &e.paid_by_id {
            if !resolve(payer) {
                return Err(AppError::InvalidMemberReference(payer.clone()));
            }
        }
        for p in &e.participant_ids {
            if !resolve(p) {
                return Err(AppError::InvalidMemberReference(p.clone()));
            }
        }
        for item in &e.items {
            if let Some(payer) = &item.paid_by_id {
                if !resolve(payer) {
                    return Err(AppError::InvalidMemberReference(payer.clone()));
                }
            }
            for p in &item.participant_ids {
                if !resolve(p) {
                    return Err(AppError::InvalidMemberReference(p.clone()));
                }
            }
        }
    }

    for i in request.items.add.iter().chain(request.items.update.iter()) {
        if let Some(payer) = &i.paid_by_id {
            if !resolve(payer) {
                return Err(AppError::InvalidMemberReference(payer.clone()));
            }
        }
        for p in &i.participant_ids {
            if !resolve(p) {
                return Err(AppError::InvalidMemberReference(p.clone()));
            }
        }
    }

    Ok(())
}

fn resolve_member(raw: &str, mappings: &IdMappings, bill: &Bill) -> Option<MemberId> {
    if let Some(mapped) = mappings.members.get(raw) {
        return Uuid::parse_str(mapped).ok().map(MemberId::from);
    }
    let id: MemberId = Uuid::parse_str(raw).ok()?.into();
    bill.is_live_member(id).then_some(id)
}

fn add_member(bill: &mut Bill, upsert: &MemberUpsert, mappings: &mut IdMappings) {
    if let Some(local_id) = &upsert.local_id {
        if let Some(existing) = find_member_by_local_id(bill, local_id) {
            mappings.members.insert(local_id.clone(), existing.to_string());
            return;
        }
    }
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

fn find_member_by_local_id(bill: &Bill, local_id: &str) -> Option<MemberId> {
    bill.members.iter().find(|m| m.local_client_id.as_deref() == Some(local_id)).map(|m| m.id)
}

fn update_member(
    bill: &mut Bill,
    upsert: &MemberUpsert,
    has_conflict: bool,
    mappings: &mut IdMappings,
    conflicts: &mut Vec<ConflictInfo>,
) {
    let Some(id) = upsert.remote_id.or_else(|| upsert.local_id.as_deref().and_then(|l| resolve_member(l, mappings, bill)))
    else {
        return;
    };
    if has_conflict {
        conflicts.push(ConflictInfo::server_wins("member", id.to_string()));
        return;
    }
    if let Some(m) = bill.member_mut(id) {
        m.name = upsert.name.clone();
        if let Some(order) = upsert.display_order {
            m.display_order = order;
        }
    }
}

fn delete_member(bill: &mut Bill, raw: &str, has_conflict: bool, mappings: &IdMappings, conflicts: &mut Vec<ConflictInfo>) {
    let Some(id) = resolve_member(raw, mappings, bill) else { return };
    if has_conflict {
        conflicts.push(ConflictInfo::manual_required("member", id.to_string()));
        return;
    }
    bill.remove_member_cascading(id);
}

fn add_expense_inner(bill: &mut Bill, upsert: &ExpenseUpsert, mappings: &mut IdMappings) {
    if let Some(local_id) = &upsert.local_id {
        if let Some(existing) = bill.expenses.iter().find(|e| e.local_client_id.as_deref() == Some(local_id)) {
            mappings.expenses.insert(local_id.clone(), existing.id.to_string());
            return;
        }
    }

    let participant_ids: Vec<MemberId> =
        upsert.participant_ids.iter().filter_map(|raw| resolve_member(raw, mappings, bill)).collect();
    let paid_by = upsert.paid_by_id.as_ref().and_then(|raw| resolve_member(raw, mappings, bill));

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
    if !participant_ids.is_empty() {
        reallocate_expense(bill, id, &participant_ids);
    }
    if let Some(local_id) = &upsert.local_id {
        mappings.expenses.insert(local_id.clone(), id.to_string());
    }

    for item in &upsert.items {
        add_item_under(bill, id, item, mappings);
    }
}

fn add_item_under(bill: &mut Bill, expense_id: ExpenseId, upsert: &ItemUpsert, mappings: &mut IdMappings) {
    if let Some(local_id) = &upsert.local_id {
        if let Some(existing_id) = bill
            .expense(expense_id)
            .and_then(|e| e.items.iter().find(|i| i.local_client_id.as_deref() == Some(local_id.as_str())))
            .map(|i| i.id)
        {
            mappings.expense_items.insert(local_id.clone(), existing_id.to_string());
            return;
        }
    }

    let participant_ids: Vec<MemberId> =
        upsert.participant_ids.iter().filter_map(|raw| resolve_member(raw, mappings, bill)).collect();
    let paid_by = upsert.paid_by_id.as_ref().and_then(|raw| resolve_member(raw, mappings, bill));

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
    if !participant_ids.is_empty() {
        reallocate_item(bill, id, &participant_ids);
    }
    if let Some(local_id) = &upsert.local_id {
        mappings.expense_items.insert(local_id.clone(), id.to_string());
    }
}

fn update_expense(
    bill: &mut Bill,
    upsert: &ExpenseUpsert,
    has_conflict: bool,
    mappings: &mut IdMappings,
    conflicts: &mut Vec<ConflictInfo>,
) {
    let Some(id) = upsert
        .remote_id
        .as_ref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(ExpenseId::from)
    else {
        return;
    };
    if has_conflict {
        conflicts.push(ConflictInfo::server_wins("expense", id.to_string()));
        return;
    }

    let participant_ids: Vec<MemberId> =
        upsert.participant_ids.iter().filter_map(|raw| resolve_member(raw, mappings, bill)).collect();
    let paid_by = upsert.paid_by_id.as_ref().and_then(|raw| resolve_member(raw, mappings, bill));

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
    if !participant_ids.is_empty() {
        reallocate_expense(bill, id, &participant_ids);
    }
}

fn delete_expense(bill: &mut Bill, raw: &str, has_conflict: bool, _mappings: &IdMappings, conflicts: &mut Vec<ConflictInfo>) {
    let Some(id) = Uuid::parse_str(raw).ok().map(ExpenseId::from) else { return };
    if has_conflict {
        conflicts.push(ConflictInfo::manual_required("expense", id.to_string()));
        return;
    }
    bill.expenses.retain(|e| e.id != id);
}

fn add_item(bill: &mut Bill, upsert: &ItemUpsert, mappings: &mut IdMappings) {
    let Some(expense_id) = upsert
        .remote_id
        .as_ref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(ExpenseId::from)
    else {
        return;
    };
    add_item_under(bill, expense_id, upsert, mappings);
}

fn update_item(
    bill: &mut Bill,
    upsert: &ItemUpsert,
    has_conflict: bool,
    mappings: &mut IdMappings,
    conflicts: &mut Vec<ConflictInfo>,
) {
    let Some(id) = upsert
        .remote_id
        .as_ref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(ItemId::from)
    else {
        return;
    };
    if has_conflict {
        conflicts.push(ConflictInfo::server_wins("expense_item", id.to_string()));
        return;
    }

    let participant_ids: Vec<MemberId> =
        upsert.participant_ids.iter().filter_map(|raw| resolve_member(raw, mappings, bill)).collect();
    let paid_by = upsert.paid_by_id.as_ref().and_then(|raw| resolve_member(raw, mappings, bill));

    if let Some(item) = bill.item_mut(id) {
        item.name = upsert.name.clone();
        item.amount = upsert.amount;
        if paid_by.is_some() {
            item.paid_by_member_id = paid_by;
        }
    }
    if !participant_ids.is_empty() {
        reallocate_item(bill, id, &participant_ids);
    }
}

fn delete_item(bill: &mut Bill, raw: &str, has_conflict: bool, _mappings: &IdMappings, conflicts: &mut Vec<ConflictInfo>) {
    let Some(id) = Uuid::parse_str(raw).ok().map(ItemId::from) else { return };
    if has_conflict {
        conflicts.push(ConflictInfo::manual_required("expense_item", id.to_string()));
        return;
    }
    for e in &mut bill.expenses {
        e.items.retain(|i| i.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_member_uses_mapping_first() {
        let now = Utc::now();
        let mut bill = Bill {
            id: crate::domain::BillId::new(),
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
        };
        let member_id = MemberId::new();
        bill.members.push(Member {
            id: member_id,
            bill_id: bill.id,
            name: "A".into(),
            display_order: 0,
            linked_user_id: None,
            claimed_at: None,
            original_name: None,
            local_client_id: None,
        });

        let mut mappings = IdMappings::default();
        mappings.members.insert("m1".into(), member_id.to_string());

        assert_eq!(resolve_member("m1", &mappings, &bill), Some(member_id));
        assert_eq!(resolve_member(&member_id.to_string(), &mappings, &bill), Some(member_id));
        assert_eq!(resolve_member("unknown", &mappings, &bill), None);
    }

    #[test]
    fn seeding_lets_same_batch_new_member_reference_resolve() {
        let now = Utc::now();
        let bill = Bill {
            id: crate::domain::BillId::new(),
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
        };

        let request = DeltaSyncRequest {
            base_version: 1,
            members: crate::sync::dto::DeltaChangeSet {
                add: vec![MemberUpsert {
                    local_id: Some("m-new".into()),
                    remote_id: None,
                    name: "Carol".into(),
                    display_order: None,
                }],
                update: Vec::new(),
                delete: Vec::new(),
            },
            expenses: crate::sync::dto::DeltaChangeSet {
                add: vec![ExpenseUpsert {
                    local_id: Some("e-new".into()),
                    remote_id: None,
                    name: "Dinner".into(),
                    amount: rust_decimal::Decimal::new(1000, 2),
                    service_fee_percent: None,
                    is_itemized: false,
                    paid_by_id: Some("m-new".into()),
                    participant_ids: vec!["m-new".into()],
                    items: Vec::new(),
                }],
                update: Vec::new(),
                delete: Vec::new(),
            },
            items: crate::sync::dto::DeltaChangeSet::default(),
        };

        // Without seeding, "m-new" isn't in the mapping yet when the
        // expense add is validated and this would reject as a ghost
        // reference even though the member is added in the same batch.
        let mut mappings = IdMappings::default();
        seed_new_member_local_ids(&mut mappings, &request);
        assert!(validate_no_ghost_references(&bill, &request, &mappings).is_ok());
    }
}
