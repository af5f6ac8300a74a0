use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shopmate_core::flows::{FlowContext, FlowEvent};
use shopmate_core::{
    AuditContext, AuditSink, FlowEngine, FlowState, FlowTransitionError, FunctionCall,
    FunctionName, PrivilegedActionFlow,
};
use tracing::{info, warn};

/// Outcome of the authentication UI the host presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSignal {
    Succeeded,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingPrivilegedAction {
    pub function_name: FunctionName,
    pub call: FunctionCall,
}

/// Holds at most one privileged call until the user authenticates.
///
/// State changes go through the privileged-action flow so that every accepted or
/// rejected transition lands in the audit trail. A resume is handed out once; a
/// second success signal while it runs is rejected.
pub struct InterruptManager {
    engine: FlowEngine<PrivilegedActionFlow>,
    state: FlowState,
    pending: Option<PendingPrivilegedAction>,
    retry_in_progress: bool,
    audit_sink: Arc<dyn AuditSink>,
}

impl InterruptManager {
    pub fn new(audit_sink: Arc<dyn AuditSink>) -> Self {
        let engine = FlowEngine::default();
        let state = engine.initial_state();
        Self { engine, state, pending: None, retry_in_progress: false, audit_sink }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingPrivilegedAction> {
        self.pending.as_ref()
    }

    pub fn is_retry_in_progress(&self) -> bool {
        self.retry_in_progress
    }

    fn apply(
        &mut self,
        event: FlowEvent,
        audit: &AuditContext,
    ) -> Result<FlowState, FlowTransitionError> {
        let context = FlowContext {
            has_pending_action: self.pending.is_some(),
            retry_in_progress: self.retry_in_progress,
        };
        let outcome = self.engine.apply_with_audit(
            &self.state,
            &event,
            &context,
            self.audit_sink.as_ref(),
            audit,
        )?;
        self.state = outcome.to.clone();
        Ok(outcome.to)
    }

    /// Records `call` as pending and moves to awaiting authentication.
    pub fn raise(
        &mut self,
        function_name: FunctionName,
        call: FunctionCall,
        audit: &AuditContext,
    ) -> Result<(), FlowTransitionError> {
        if let Err(error) = self.apply(FlowEvent::PrivilegedCallRequested, audit) {
            warn!(
                event_name = "agent.interrupt.raise_rejected",
                correlation_id = %audit.correlation_id,
                function_name = %function_name,
                error = %error,
                "privileged call rejected"
            );
            return Err(error);
        }
        info!(
            event_name = "agent.interrupt.raised",
            correlation_id = %audit.correlation_id,
            function_name = %function_name,
            "privileged call awaiting authentication"
        );
        self.pending = Some(PendingPrivilegedAction { function_name, call });
        Ok(())
    }

    /// Hands out the pending call for its single retry.
    pub fn begin_resume(&mut self, audit: &AuditContext) -> Result<FunctionCall, FlowTransitionError> {
        self.apply(FlowEvent::AuthenticationSucceeded, audit)?;
        self.retry_in_progress = true;
        self.pending
            .as_ref()
            .map(|pending| pending.call.clone())
            .ok_or(FlowTransitionError::NoPendingAction)
    }

    /// Clears the pending call after its retry finished, successful or not.
    pub fn complete_resume(&mut self, audit: &AuditContext) -> Result<(), FlowTransitionError> {
        self.apply(FlowEvent::ResumeCompleted, audit)?;
        self.pending = None;
        self.retry_in_progress = false;
        Ok(())
    }

    /// Clears a resume whose driver was dropped before it completed.
    ///
    /// The call may already have reached the capability, so it is treated as
    /// finished and never handed out again. Returns whether anything was cleared.
    pub fn recover_abandoned_resume(&mut self, audit: &AuditContext) -> bool {
        if !self.is_retry_in_progress() {
            return false;
        }
        if let Err(error) = self.apply(FlowEvent::ResumeCompleted, audit) {
            warn!(
                event_name = "agent.interrupt.recovery_rejected",
                correlation_id = %audit.correlation_id,
                error = %error,
                "abandoned resume could not be completed"
            );
        }
        let abandoned = self.pending.take();
        self.retry_in_progress = false;
        warn!(
            event_name = "agent.interrupt.resume_abandoned",
            correlation_id = %audit.correlation_id,
            function_name = ?abandoned.map(|pending| pending.function_name),
            "previous resume never completed; pending call cleared"
        );
        true
    }

    /// Discards the pending call without executing it.
    pub fn cancel(
        &mut self,
        audit: &AuditContext,
    ) -> Result<PendingPrivilegedAction, FlowTransitionError> {
        self.apply(FlowEvent::AuthenticationCancelled, audit)?;
        self.retry_in_progress = false;
        self.pending.take().ok_or(FlowTransitionError::NoPendingAction)
    }
}
