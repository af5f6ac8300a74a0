use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopmate_core::audit::NoopAuditSink;
use shopmate_core::config::OrchestratorConfig;
use shopmate_core::{
    ApplicationError, AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink,
    DeliveryAddress, FunctionCall, FunctionName, FunctionResult, ShopId, TurnEntry, TurnLogStore,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capabilities::ShoppingCapabilities;
use crate::events::{EventSink, TurnEvent};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::interrupt::AuthSignal;
use crate::llm::{ModelContext, ModelReply, ModelService};
use crate::loop_guard::LoopGuard;
use crate::revalidation::{AddressRevalidator, RevalidationOutcome};
use crate::router::{ExecutionContext, FunctionRouter};
use crate::session::ConversationSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    IterationCapReached,
    LoopGuardTripped,
    AwaitingAuthentication,
    PrivilegedActionPending,
    AuthenticationCancelled,
    NothingToResume,
    TransportFailure,
    TurnLogUnavailable,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::IterationCapReached => "iteration_cap_reached",
            Self::LoopGuardTripped => "loop_guard_tripped",
            Self::AwaitingAuthentication => "awaiting_authentication",
            Self::PrivilegedActionPending => "privileged_action_pending",
            Self::AuthenticationCancelled => "authentication_cancelled",
            Self::NothingToResume => "nothing_to_resume",
            Self::TransportFailure => "transport_failure",
            Self::TurnLogUnavailable => "turn_log_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub sequence_id: String,
    pub stop_reason: StopReason,
    /// Last assistant text produced during the sequence.
    pub reply: Option<String>,
    pub routed_calls: u32,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("turn log unavailable: {0}")]
    TurnLog(#[from] ApplicationError),
}

/// State of one user-initiated sequence of model requests and routed calls.
struct Sequence<'a> {
    id: String,
    audit: AuditContext,
    events: &'a EventSink,
    guard: LoopGuard,
    routed_calls: u32,
    reply: Option<String>,
}

impl<'a> Sequence<'a> {
    fn start(session: &ConversationSession, events: &'a EventSink) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            audit: AuditContext::new(
                Some(session.conversation_id().to_string()),
                id.clone(),
                "turn-orchestrator",
            ),
            id,
            events,
            guard: LoopGuard::default(),
            routed_calls: 0,
            reply: None,
        }
    }
}

/// Drives the model/function-call loop for a conversation.
///
/// One user message starts a sequence: the model is asked for a reply, any
/// function call it makes is routed and its result fed back, until the model
/// answers with text only or a stop condition fires. Function calls within a
/// sequence run strictly one after another.
pub struct AgentRuntime {
    model: Arc<dyn ModelService>,
    capabilities: Arc<dyn ShoppingCapabilities>,
    audit_sink: Arc<dyn AuditSink>,
    router: FunctionRouter,
    guardrails: GuardrailPolicy,
    revalidator: AddressRevalidator,
    config: OrchestratorConfig,
}

impl AgentRuntime {
    pub fn new(
        model: Arc<dyn ModelService>,
        capabilities: Arc<dyn ShoppingCapabilities>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            capabilities,
            audit_sink: Arc::new(NoopAuditSink),
            router: FunctionRouter,
            guardrails: GuardrailPolicy::from_config(&config),
            revalidator: AddressRevalidator::new(config.validation_timeout()),
            config,
        }
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Event channel sized by `orchestrator.event_buffer`.
    pub fn event_channel(&self) -> (EventSink, mpsc::Receiver<TurnEvent>) {
        EventSink::channel(self.config.event_buffer)
    }

    pub fn open_session(
        &self,
        conversation_id: impl Into<String>,
        turn_log: Arc<dyn TurnLogStore>,
    ) -> ConversationSession {
        ConversationSession::new(conversation_id, turn_log, self.audit_sink.clone())
    }

    pub async fn run_turn(
        &self,
        session: &mut ConversationSession,
        user_text: &str,
        extra_context: Option<Value>,
        events: &EventSink,
    ) -> Result<TurnOutcome, RuntimeError> {
        let mut sequence = Sequence::start(session, events);
        info!(
            event_name = "agent.turn.started",
            correlation_id = %sequence.id,
            conversation_id = %session.conversation_id(),
            "turn started"
        );

        let stopped = if session.is_closed() {
            Ok(self.refuse_closed(&sequence))
        } else {
            session.interrupt.recover_abandoned_resume(&sequence.audit);
            self.start_turn(session, &mut sequence, user_text, extra_context).await
        };
        self.conclude(sequence, stopped).await
    }

    /// Applies the host's authentication result to the pending privileged call.
    ///
    /// On success the call is routed exactly once and the loop continues from its
    /// result. Signals with nothing pending are ignored. A closed session leaves
    /// the pending call untouched and runs nothing.
    pub async fn handle_auth_signal(
        &self,
        session: &mut ConversationSession,
        signal: AuthSignal,
        events: &EventSink,
    ) -> Result<TurnOutcome, RuntimeError> {
        let mut sequence = Sequence::start(session, events);
        info!(
            event_name = "agent.auth.signal_received",
            correlation_id = %sequence.id,
            conversation_id = %session.conversation_id(),
            signal = ?signal,
            "authentication signal received"
        );

        if session.is_closed() {
            let stopped = Ok(self.refuse_closed(&sequence));
            return self.conclude(sequence, stopped).await;
        }
        session.interrupt.recover_abandoned_resume(&sequence.audit);

        let stopped = match signal {
            AuthSignal::Succeeded => {
                session.set_authenticated(true);
                self.resume(session, &mut sequence).await
            }
            AuthSignal::Cancelled => match session.interrupt.cancel(&sequence.audit) {
                Ok(discarded) => {
                    info!(
                        event_name = "agent.auth.pending_discarded",
                        correlation_id = %sequence.id,
                        function_name = %discarded.function_name,
                        "pending privileged call discarded"
                    );
                    Ok(StopReason::AuthenticationCancelled)
                }
                Err(error) => {
                    debug!(
                        event_name = "agent.auth.signal_ignored",
                        correlation_id = %sequence.id,
                        error = %error,
                        "nothing to cancel"
                    );
                    Ok(StopReason::NothingToResume)
                }
            },
        };
        self.conclude(sequence, stopped).await
    }

    /// Revalidates `address` against the relevant shops and switches the session
    /// to it only when every reachable shop can deliver there.
    pub async fn change_delivery_address(
        &self,
        session: &mut ConversationSession,
        address: DeliveryAddress,
        explicit_shop: Option<&ShopId>,
    ) -> RevalidationOutcome {
        let audit = AuditContext::new(
            Some(session.conversation_id().to_string()),
            Uuid::new_v4().to_string(),
            "address-revalidator",
        );
        let outcome = self
            .revalidator
            .revalidate(
                address.coordinate,
                explicit_shop,
                &session.cart_memory,
                self.capabilities.as_ref(),
                self.audit_sink.as_ref(),
                &audit,
            )
            .await;

        if outcome.is_accepted() {
            info!(
                event_name = "agent.address.changed",
                correlation_id = %audit.correlation_id,
                address_id = %address.id.0,
                "delivery address changed"
            );
            session.delivery_address = Some(address);
        }
        outcome
    }

    fn refuse_closed(&self, sequence: &Sequence<'_>) -> StopReason {
        info!(
            event_name = "agent.turn.session_closed",
            correlation_id = %sequence.id,
            "session closed; nothing started"
        );
        StopReason::Cancelled
    }

    async fn start_turn(
        &self,
        session: &mut ConversationSession,
        sequence: &mut Sequence<'_>,
        user_text: &str,
        extra_context: Option<Value>,
    ) -> Result<StopReason, RuntimeError> {
        let history = session.turn_log().snapshot().await?;
        session.turn_log().append(TurnEntry::user(user_text)).await?;

        let context =
            ModelContext { extra: extra_context, delivery_address: session.delivery_address.clone() };
        let token = session.cancellation_token();
        let reply = match unless_cancelled(
            &token,
            self.model.send(&history, user_text, &context, sequence.events),
        )
        .await
        {
            None => return Ok(StopReason::Cancelled),
            Some(Err(error)) => {
                warn!(
                    event_name = "agent.model.transport_failed",
                    correlation_id = %sequence.id,
                    error = %error,
                    "model request failed"
                );
                return Ok(StopReason::TransportFailure);
            }
            Some(Ok(reply)) => reply,
        };

        self.drive(session, sequence, reply).await
    }

    async fn resume(
        &self,
        session: &mut ConversationSession,
        sequence: &mut Sequence<'_>,
    ) -> Result<StopReason, RuntimeError> {
        let call = match session.interrupt.begin_resume(&sequence.audit) {
            Ok(call) => call,
            Err(error) => {
                debug!(
                    event_name = "agent.auth.resume_ignored",
                    correlation_id = %sequence.id,
                    error = %error,
                    "no privileged call to resume"
                );
                return Ok(StopReason::NothingToResume);
            }
        };

        sequence.guard.record(&call);
        sequence.routed_calls += 1;
        let routed = self.route_call(session, sequence, &call).await;
        let cancelled = routed.is_none();
        let recorded = match routed {
            Some(result) => self.record_result(session, sequence, &call, result).await,
            None => Ok(()),
        };
        if let Err(error) = session.interrupt.complete_resume(&sequence.audit) {
            warn!(
                event_name = "agent.auth.resume_not_cleared",
                correlation_id = %sequence.id,
                error = %error,
                "pending privileged call could not be cleared"
            );
        }
        recorded?;
        if cancelled {
            return Ok(StopReason::Cancelled);
        }

        match self.next_reply(session, sequence).await? {
            ControlFlow::Break(stop) => Ok(stop),
            ControlFlow::Continue(reply) => self.drive(session, sequence, reply).await,
        }
    }

    async fn drive(
        &self,
        session: &mut ConversationSession,
        sequence: &mut Sequence<'_>,
        mut reply: ModelReply,
    ) -> Result<StopReason, RuntimeError> {
        loop {
            if let Some(text) = reply.text.take().filter(|text| !text.trim().is_empty()) {
                session.turn_log().append(TurnEntry::assistant_text(text.clone())).await?;
                sequence.reply = Some(text);
            }
            let Some(call) = reply.function_call.take() else {
                return Ok(StopReason::Completed);
            };

            if sequence.guard.is_repeat(&call) {
                warn!(
                    event_name = "agent.loop_guard.tripped",
                    correlation_id = %sequence.id,
                    function_name = %call.name,
                    "model repeated its previous call; stopping"
                );
                return Ok(StopReason::LoopGuardTripped);
            }
            if sequence.routed_calls >= self.config.max_iterations {
                warn!(
                    event_name = "agent.turn.iteration_cap_reached",
                    correlation_id = %sequence.id,
                    max_iterations = self.config.max_iterations,
                    function_name = %call.name,
                    "iteration cap reached; stopping"
                );
                return Ok(StopReason::IterationCapReached);
            }

            session.turn_log().append(TurnEntry::assistant_call(call.clone())).await?;
            sequence
                .events
                .emit(TurnEvent::FunctionCallRequested {
                    name: call.name.clone(),
                    arguments: call.decoded_arguments(),
                })
                .await;

            if let GuardrailDecision::RequireAuthentication {
                function_name,
                reason_code,
                user_message,
            } = self.guardrails.evaluate(&call, session.is_authenticated())
            {
                let event = TurnEvent::AuthenticationRequired {
                    function_name,
                    reason_code,
                    user_message,
                };
                return self.interrupt(session, sequence, function_name, call, event).await;
            }

            sequence.guard.record(&call);
            sequence.routed_calls += 1;
            let Some(result) = self.route_call(session, sequence, &call).await else {
                return Ok(StopReason::Cancelled);
            };
            self.record_result(session, sequence, &call, result).await?;

            reply = match self.next_reply(session, sequence).await? {
                ControlFlow::Break(stop) => return Ok(stop),
                ControlFlow::Continue(reply) => reply,
            };
        }
    }

    async fn interrupt(
        &self,
        session: &mut ConversationSession,
        sequence: &mut Sequence<'_>,
        function_name: FunctionName,
        call: FunctionCall,
        prompt: TurnEvent,
    ) -> Result<StopReason, RuntimeError> {
        match session.interrupt.raise(function_name, call, &sequence.audit) {
            Ok(()) => {
                sequence.events.emit(prompt).await;
                Ok(StopReason::AwaitingAuthentication)
            }
            Err(error) => {
                let outcome =
                    FunctionResult::failure(error.to_string()).into_outcome(function_name.as_str());
                session.turn_log().append(TurnEntry::function_result(outcome)).await?;
                Ok(StopReason::PrivilegedActionPending)
            }
        }
    }

    /// Lets an in-flight call finish; `None` when the session was closed before
    /// or during the call.
    async fn route_call(
        &self,
        session: &mut ConversationSession,
        sequence: &Sequence<'_>,
        call: &FunctionCall,
    ) -> Option<FunctionResult> {
        if session.is_closed() {
            info!(
                event_name = "agent.turn.call_skipped",
                correlation_id = %sequence.id,
                function_name = %call.name,
                "session closed; function not invoked"
            );
            return None;
        }
        sequence
            .events
            .emit(TurnEvent::ProgressUpdate {
                step: sequence.routed_calls,
                max_steps: self.config.max_iterations,
                detail: format!("calling {}", call.name.trim()),
            })
            .await;

        let context = ExecutionContext {
            capabilities: self.capabilities.clone(),
            delivery_address: session.delivery_address.clone(),
            capability_timeout: self.config.capability_timeout(),
        };
        let result = self.router.route(call, &context, &mut session.cart_memory).await;
        if session.is_closed() {
            info!(
                event_name = "agent.turn.result_discarded",
                correlation_id = %sequence.id,
                function_name = %call.name,
                "session closed; function result discarded"
            );
            return None;
        }
        Some(result)
    }

    async fn record_result(
        &self,
        session: &ConversationSession,
        sequence: &Sequence<'_>,
        call: &FunctionCall,
        result: FunctionResult,
    ) -> Result<(), RuntimeError> {
        let success = result.is_success();
        let name = call.name.trim().to_string();
        session.turn_log().append(TurnEntry::function_result(result.into_outcome(name.clone()))).await?;
        sequence.events.emit(TurnEvent::FunctionResult { name: name.clone(), success }).await;
        self.audit_sink.emit(
            AuditEvent::new(
                sequence.audit.conversation_id.clone(),
                sequence.id.clone(),
                "function.routed",
                AuditCategory::Function,
                sequence.audit.actor.clone(),
                if success { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("function", name),
        );
        Ok(())
    }

    async fn next_reply(
        &self,
        session: &ConversationSession,
        sequence: &Sequence<'_>,
    ) -> Result<ControlFlow<StopReason, ModelReply>, RuntimeError> {
        let history = session.turn_log().snapshot().await?;
        let token = session.cancellation_token();
        match unless_cancelled(&token, self.model.continue_with(&history, sequence.events)).await {
            None => Ok(ControlFlow::Break(StopReason::Cancelled)),
            Some(Err(error)) => {
                warn!(
                    event_name = "agent.model.transport_failed",
                    correlation_id = %sequence.id,
                    error = %error,
                    "model request failed"
                );
                Ok(ControlFlow::Break(StopReason::TransportFailure))
            }
            Some(Ok(reply)) => Ok(ControlFlow::Continue(reply)),
        }
    }

    async fn conclude(
        &self,
        sequence: Sequence<'_>,
        stopped: Result<StopReason, RuntimeError>,
    ) -> Result<TurnOutcome, RuntimeError> {
        let stop_reason = match &stopped {
            Ok(stop_reason) => *stop_reason,
            Err(failure) => {
                error!(
                    event_name = "agent.turn.failed",
                    correlation_id = %sequence.id,
                    error = %failure,
                    "turn log failure ended the sequence"
                );
                StopReason::TurnLogUnavailable
            }
        };

        info!(
            event_name = "agent.turn.finished",
            correlation_id = %sequence.id,
            stop_reason = stop_reason.as_str(),
            routed_calls = sequence.routed_calls,
            "turn sequence ended"
        );
        sequence.events.emit(TurnEvent::SequenceEnded { reason: stop_reason }).await;
        self.audit_sink.emit(
            AuditEvent::new(
                sequence.audit.conversation_id.clone(),
                sequence.id.clone(),
                "turn.sequence_ended",
                AuditCategory::Turn,
                sequence.audit.actor.clone(),
                if stopped.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("stop_reason", stop_reason.as_str())
            .with_metadata("routed_calls", sequence.routed_calls.to_string()),
        );

        stopped.map(|stop_reason| TurnOutcome {
            sequence_id: sequence.id,
            stop_reason,
            reply: sequence.reply,
            routed_calls: sequence.routed_calls,
        })
    }
}

async fn unless_cancelled<F: Future>(token: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}
