use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};

pub trait FlowDefinition {
    fn flow_type(&self) -> FlowType;
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Gate for functions that need an authenticated user.
///
/// `Idle -> AwaitingAuth -> Resuming -> Idle`, with cancellation returning straight
/// to `Idle`. At most one privileged action may be pending at a time.
#[derive(Clone, Debug, Default)]
pub struct PrivilegedActionFlow;

impl FlowDefinition for PrivilegedActionFlow {
    fn flow_type(&self) -> FlowType {
        FlowType::PrivilegedAction
    }

    fn initial_state(&self) -> FlowState {
        FlowState::Idle
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_privileged_action(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Interrupt,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.conversation_id.clone(),
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Interrupt,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("event", format!("{event:?}"))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<PrivilegedActionFlow> {
    fn default() -> Self {
        Self::new(PrivilegedActionFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("a privileged action is already pending authentication")]
    PendingActionExists,
    #[error("no privileged action is pending")]
    NoPendingAction,
    #[error("resumption of the pending privileged action is already in progress")]
    ResumeInProgress,
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_privileged_action(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowEvent::{
        AuthenticationCancelled, AuthenticationSucceeded, PrivilegedCallRequested,
        ResumeCompleted,
    };
    use FlowState::{AwaitingAuth, Idle, Resuming};

    let to = match (current, event) {
        (Idle, PrivilegedCallRequested) => {
            if context.has_pending_action {
                return Err(FlowTransitionError::PendingActionExists);
            }
            AwaitingAuth
        }
        (AwaitingAuth, PrivilegedCallRequested) | (Resuming, PrivilegedCallRequested) => {
            return Err(FlowTransitionError::PendingActionExists);
        }
        (AwaitingAuth, AuthenticationSucceeded) => {
            if !context.has_pending_action {
                return Err(FlowTransitionError::NoPendingAction);
            }
            if context.retry_in_progress {
                return Err(FlowTransitionError::ResumeInProgress);
            }
            Resuming
        }
        (Resuming, AuthenticationSucceeded) => {
            return Err(FlowTransitionError::ResumeInProgress);
        }
        (AwaitingAuth, AuthenticationCancelled) => Idle,
        (Resuming, ResumeCompleted) => Idle,
        (Idle, AuthenticationSucceeded) | (Idle, AuthenticationCancelled) => {
            return Err(FlowTransitionError::NoPendingAction);
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone() })
}
