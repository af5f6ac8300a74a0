use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::function::{FunctionCall, FunctionOutcome};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnEntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Function,
    System,
}

/// One record of the append-only turn log.
///
/// Exactly one of `content`, `function_call` or `function_result` is set, and the
/// role must agree with it: function calls only on assistant entries, function
/// results only on function entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnEntry {
    pub id: TurnEntryId,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub function_result: Option<FunctionOutcome>,
    pub created_at: DateTime<Utc>,
}

impl TurnEntry {
    fn new(
        role: Role,
        content: Option<String>,
        function_call: Option<FunctionCall>,
        function_result: Option<FunctionOutcome>,
    ) -> Self {
        Self {
            id: TurnEntryId(Uuid::new_v4().to_string()),
            role,
            content,
            function_call,
            function_result,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Some(text.into()), None, None)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Some(text.into()), None, None)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(text.into()), None, None)
    }

    pub fn assistant_call(call: FunctionCall) -> Self {
        Self::new(Role::Assistant, None, Some(call), None)
    }

    pub fn function_result(outcome: FunctionOutcome) -> Self {
        Self::new(Role::Function, None, None, Some(outcome))
    }

    pub fn is_function_call(&self) -> bool {
        self.function_call.is_some()
    }

    pub fn is_function_result(&self) -> bool {
        self.function_result.is_some()
    }

    /// Name of the function this entry calls or reports on, if any.
    pub fn function_name(&self) -> Option<&str> {
        self.function_call
            .as_ref()
            .map(|call| call.name.as_str())
            .or_else(|| self.function_result.as_ref().map(|result| result.function_name.as_str()))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let populated = [
            self.content.is_some(),
            self.function_call.is_some(),
            self.function_result.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();

        if populated != 1 {
            return Err(DomainError::InvalidTurnEntry(format!(
                "entry {} must carry exactly one of content, function call, or function result",
                self.id.0
            )));
        }

        if self.function_call.is_some() && self.role != Role::Assistant {
            return Err(DomainError::InvalidTurnEntry(format!(
                "entry {} carries a function call but has role {:?}",
                self.id.0, self.role
            )));
        }

        if self.function_result.is_some() != (self.role == Role::Function) {
            return Err(DomainError::InvalidTurnEntry(format!(
                "entry {} has role {:?} inconsistent with its function result",
                self.id.0, self.role
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Role, TurnEntry};
    use crate::domain::function::{FunctionCall, FunctionResult};
    use crate::errors::DomainError;

    #[test]
    fn constructors_produce_valid_entries() {
        let entries = [
            TurnEntry::user("hi"),
            TurnEntry::system("be brief"),
            TurnEntry::assistant_text("hello"),
            TurnEntry::assistant_call(FunctionCall::new("getAllCarts", json!({}))),
            TurnEntry::function_result(
                FunctionResult::success(json!({ "carts": [] })).into_outcome("getAllCarts"),
            ),
        ];

        for entry in &entries {
            entry.validate().expect("constructor output is valid");
        }
        assert_eq!(entries[4].role, Role::Function);
        assert_eq!(entries[3].function_name(), Some("getAllCarts"));
        assert_eq!(entries[4].function_name(), Some("getAllCarts"));
    }

    #[test]
    fn entry_with_content_and_call_is_rejected() {
        let mut entry = TurnEntry::assistant_text("let me check");
        entry.function_call = Some(FunctionCall::new("getCart", json!({})));

        let error = entry.validate().expect_err("mixed entry");
        assert!(matches!(error, DomainError::InvalidTurnEntry(_)));
    }

    #[test]
    fn function_call_on_user_entry_is_rejected() {
        let mut entry = TurnEntry::assistant_call(FunctionCall::new("getCart", json!({})));
        entry.role = Role::User;

        assert!(entry.validate().is_err());
    }

    #[test]
    fn function_role_requires_result() {
        let mut entry = TurnEntry::user("not a result");
        entry.role = Role::Function;

        assert!(entry.validate().is_err());
    }
}
