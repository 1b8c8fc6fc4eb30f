//! Core domain types: entity ids, the Bill aggregate, and the operation log
//! entry shape.

pub mod bill;
pub mod ids;
pub mod operation;

pub use bill::{
    Bill, Expense, ExpenseItem, ExpenseItemParticipant, ExpenseParticipant, Member, SettledTransfer,
};
pub use ids::{BillId, ExpenseId, ItemId, MemberId, OperationId, UserId};
pub use operation::{OpType, Operation, OperationPayload};
