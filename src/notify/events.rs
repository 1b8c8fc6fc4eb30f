//! Push event payloads, spec.md §6 "Push channel".

use serde::Serialize;

use crate::domain::{BillId, Operation, UserId};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PushEvent {
    /// Fanned out after every committed sync/operation, whether or not
    /// the caller subscribes to the fine-grained operation log too.
    BillUpdated {
        bill_id: BillId,
        new_version: i64,
        updated_by: ActorLabel,
    },
    /// Fine-grained companion event for operation-log subscribers.
    OperationReceived { operation: Operation },
}

/// `updatedBy` is either a user id or the literal `"anonymous"` — spec.md
/// §6 specifies a `userId | "anonymous"` union, so this is hand-rolled
/// rather than `Option<UserId>` to keep that exact wire shape.
#[derive(Debug, Clone)]
pub enum ActorLabel {
    User(UserId),
    Anonymous,
}

impl Serialize for ActorLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ActorLabel::User(id) => id.serialize(serializer),
            ActorLabel::Anonymous => serializer.serialize_str("anonymous"),
        }
    }
}

impl From<Option<UserId>> for ActorLabel {
    fn from(id: Option<UserId>) -> Self {
        match id {
            Some(id) => ActorLabel::User(id),
            None => ActorLabel::Anonymous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_label_serializes_as_string() {
        let label = ActorLabel::Anonymous;
        assert_eq!(serde_json::to_string(&label).unwrap(), "\"anonymous\"");
    }

    #[test]
    fn user_label_serializes_as_id() {
        let id = UserId::new();
        let label = ActorLabel::User(id);
        assert_eq!(serde_json::to_string(&label).unwrap(), format!("\"{id}\""));
    }
}
