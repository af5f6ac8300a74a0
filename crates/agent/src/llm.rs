use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shopmate_core::{DeliveryAddress, FunctionCall, TurnEntry};

use crate::events::EventSink;

/// Final output of one model request: plain text, a function call, or both.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    pub text: Option<String>,
    pub function_call: Option<FunctionCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), function_call: None }
    }

    pub fn call(call: FunctionCall) -> Self {
        Self { text: None, function_call: Some(call) }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelContext {
    pub extra: Option<Value>,
    pub delivery_address: Option<DeliveryAddress>,
}

/// Language-model inference, treated as an opaque request/response service.
///
/// Implementations may stream partial text through `stream` before returning;
/// retries, if any, happen inside the implementation.
#[async_trait]
pub trait ModelService: Send + Sync {
    async fn send(
        &self,
        history: &[TurnEntry],
        user_text: &str,
        context: &ModelContext,
        stream: &EventSink,
    ) -> Result<ModelReply>;

    /// Next output after a function result was appended to `history`.
    async fn continue_with(&self, history: &[TurnEntry], stream: &EventSink)
        -> Result<ModelReply>;
}
