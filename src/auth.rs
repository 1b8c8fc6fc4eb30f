//! Owner/participant authorization predicate with per-request memoization.
//!
//! A request may hit this predicate many times as it authorizes individual
//! entities; the scoped cache here is created fresh per request and
//! dropped with it — never a process-global cache, which would
//! cross-contaminate users (see DESIGN.md / SPEC_FULL.md §9).

use std::cell::RefCell;
use std::collections::HashMap;

use crate::domain::{Bill, BillId, UserId};

/// Per-request memoization scope for `isOwnerOrParticipant` checks.
#[derive(Default)]
pub struct AuthContext {
    cache: RefCell<HashMap<(BillId, Option<UserId>), bool>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `user_id` owns `bill` or is linked to a live member of it.
    /// Memoized per `(bill.id, user_id)` within this context's lifetime.
    pub fn is_owner_or_participant(&self, bill: &Bill, user_id: Option<UserId>) -> bool {
        let key = (bill.id, user_id);
        if let Some(cached) = self.cache.borrow().get(&key) {
            return *cached;
        }

        let result = match user_id {
            None => false,
            Some(uid) => {
                bill.owner_id == Some(uid) || bill.members.iter().any(|m| m.linked_user_id == Some(uid))
            }
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Member;
    use chrono::Utc;

    fn bill_with_owner(owner: UserId) -> Bill {
        let now = Utc::now();
        Bill {
            id: BillId::new(),
            name: "Trip".into(),
            owner_id: Some(owner),
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

    #[test]
    fn owner_is_authorized() {
        let owner = UserId::new();
        let bill = bill_with_owner(owner);
        let ctx = AuthContext::new();
        assert!(ctx.is_owner_or_participant(&bill, Some(owner)));
    }

    #[test]
    fn stranger_is_not_authorized() {
        let bill = bill_with_owner(UserId::new());
        let ctx = AuthContext::new();
        assert!(!ctx.is_owner_or_participant(&bill, Some(UserId::new())));
    }

    #[test]
    fn anonymous_caller_is_not_authorized() {
        let bill = bill_with_owner(UserId::new());
        let ctx = AuthContext::new();
        assert!(!ctx.is_owner_or_participant(&bill, None));
    }

    #[test]
    fn claimed_member_is_authorized() {
        let owner = UserId::new();
        let mut bill = bill_with_owner(owner);
        let participant = UserId::new();
        bill.members.push(Member {
            id: crate::domain::MemberId::new(),
            bill_id: bill.id,
            name: "Bob".into(),
            display_order: 0,
            linked_user_id: Some(participant),
            claimed_at: Some(Utc::now()),
            original_name: None,
            local_client_id: None,
        });
        let ctx = AuthContext::new();
        assert!(ctx.is_owner_or_participant(&bill, Some(participant)));
    }

    #[test]
    fn result_is_memoized() {
        let owner = UserId::new();
        let bill = bill_with_owner(owner);
        let ctx = AuthContext::new();
        assert!(ctx.is_owner_or_participant(&bill, Some(owner)));
        // Second call hits the cache; same result.
        assert!(ctx.is_owner_or_participant(&bill, Some(owner)));
        assert_eq!(ctx.cache.borrow().len(), 1);
    }
}
