use std::sync::Arc;

use shopmate_core::{AuditSink, DeliveryAddress, TurnLogStore};
use tokio_util::sync::CancellationToken;

use crate::cart_memory::CartActionMemory;
use crate::interrupt::InterruptManager;

/// Per-conversation state the orchestrator works against.
///
/// Exactly one sequence runs against a session at a time, which `&mut` access
/// enforces. Closing the session cancels whatever sequence is in flight.
pub struct ConversationSession {
    conversation_id: String,
    turn_log: Arc<dyn TurnLogStore>,
    pub(crate) cart_memory: CartActionMemory,
    pub(crate) interrupt: InterruptManager,
    pub(crate) delivery_address: Option<DeliveryAddress>,
    authenticated: bool,
    cancel: CancellationToken,
}

impl ConversationSession {
    pub fn new(
        conversation_id: impl Into<String>,
        turn_log: Arc<dyn TurnLogStore>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turn_log,
            cart_memory: CartActionMemory::default(),
            interrupt: InterruptManager::new(audit_sink),
            delivery_address: None,
            authenticated: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn turn_log(&self) -> &Arc<dyn TurnLogStore> {
        &self.turn_log
    }

    pub fn cart_memory(&self) -> &CartActionMemory {
        &self.cart_memory
    }

    pub fn interrupt(&self) -> &InterruptManager {
        &self.interrupt
    }

    pub fn delivery_address(&self) -> Option<&DeliveryAddress> {
        self.delivery_address.as_ref()
    }

    /// Sets the initial address without revalidation; later changes go through
    /// `AgentRuntime::change_delivery_address`.
    pub fn with_delivery_address(mut self, address: DeliveryAddress) -> Self {
        self.delivery_address = Some(address);
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Handle a host can keep to close the conversation from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
