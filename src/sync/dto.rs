//! Wire DTOs for the sync/delta-sync/operation-log/settlement endpoints.
//!
//! Shaped after spec.md §6's normative response fields; struct style
//! grounded on `gateway/handlers/transfer.rs`'s request/response types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Bill, MemberId, Operation, OperationPayload};

/// A member or expense/item reference as the client sent it: either a
/// previously-minted remote UUID, or a client-local temporary id to be
/// resolved through the id-mapping table.
pub type LocalOrRemoteId = String;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpsert {
    pub local_id: Option<String>,
    pub remote_id: Option<MemberId>,
    pub name: String,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpsert {
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    pub name: String,
    pub amount: Decimal,
    pub service_fee_percent: Option<Decimal>,
    pub is_itemized: bool,
    pub paid_by_id: Option<LocalOrRemoteId>,
    pub participant_ids: Vec<LocalOrRemoteId>,
    #[serde(default)]
    pub items: Vec<ItemUpsert>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpsert {
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    pub name: String,
    pub amount: Decimal,
    pub paid_by_id: Option<LocalOrRemoteId>,
    pub participant_ids: Vec<LocalOrRemoteId>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdMappings {
    pub members: HashMap<String, String>,
    pub expenses: HashMap<String, String>,
    pub expense_items: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncBillRequest {
    pub local_id: String,
    pub remote_id: Option<String>,
    pub base_version: i64,
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberUpsert>,
    #[serde(default)]
    pub deleted_member_ids: Vec<String>,
    #[serde(default)]
    pub expenses: Vec<ExpenseUpsert>,
    #[serde(default)]
    pub deleted_expense_ids: Vec<String>,
    /// `"fromId::toId[:amount]"`, `::` canonical, `-` accepted on read.
    #[serde(default)]
    pub settled_transfers: Vec<String>,
    #[serde(default)]
    pub deleted_settled_transfers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncBillResponse {
    pub remote_id: String,
    pub version: i64,
    pub share_code: Option<String>,
    pub id_mappings: IdMappings,
    pub server_time: DateTime<Utc>,
    pub latest_bill: Option<Bill>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DeltaChangeSet<T> {
    pub add: Vec<T>,
    pub update: Vec<T>,
    pub delete: Vec<LocalOrRemoteId>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncRequest {
    pub base_version: i64,
    #[serde(default)]
    pub members: DeltaChangeSet<MemberUpsert>,
    #[serde(default)]
    pub expenses: DeltaChangeSet<ExpenseUpsert>,
    #[serde(default)]
    pub items: DeltaChangeSet<ItemUpsert>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub entity_type: String,
    pub entity_id: String,
    pub resolution: String,
}

impl ConflictInfo {
    pub fn server_wins(entity_type: &str, entity_id: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into(), entity_id: entity_id.into(), resolution: "server_wins".into() }
    }

    pub fn manual_required(entity_type: &str, entity_id: impl Into<String>) -> Self {
        Self { entity_type: entity_type.into(), entity_id: entity_id.into(), resolution: "manual_required".into() }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncResponse {
    pub success: bool,
    pub new_version: i64,
    pub id_mappings: IdMappings,
    pub conflicts: Vec<ConflictInfo>,
    pub merged_bill: Option<Bill>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOperationRequest {
    pub base_version: i64,
    pub op_type: crate::domain::OpType,
    pub target_id: Option<String>,
    pub payload: OperationPayload,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase", untagged)]
pub enum SubmitOperationResponse {
    Accepted { operation: Operation },
    Conflict { missing_operations: Vec<Operation> },
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleSettlementRequest {
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
}
