//! Turn orchestration for the shopping assistant.
//!
//! A user message starts a sequence: the model replies with text or a function
//! call, calls are routed to the shopping capabilities, and their results are fed
//! back until the model is done or a stop condition fires.
//!
//! # Architecture
//!
//! 1. **Orchestration** (`runtime`) - the model/function-call loop with its
//!    iteration cap, loop guard, cancellation, and typed event stream
//! 2. **Routing** (`router`) - validates calls against their schemas and
//!    dispatches them to `ShoppingCapabilities`
//! 3. **Guardrails** (`guardrails`, `interrupt`) - privileged calls wait for
//!    authentication and resume exactly once
//! 4. **Address changes** (`revalidation`) - a new delivery address must be
//!    servable by the shops the user is buying from
//! 5. **Display** (`merger`) - paged searches folded into one view entry
//!
//! # Key Types
//!
//! - `AgentRuntime` - drives sequences for a `ConversationSession`
//! - `ModelService` - pluggable language-model transport
//! - `ShoppingCapabilities` - backend operations the model may call
//! - `TurnEvent` - progress stream consumed by the UI

pub mod capabilities;
pub mod cart_memory;
pub mod events;
pub mod guardrails;
pub mod interrupt;
pub mod llm;
pub mod loop_guard;
pub mod merger;
pub mod revalidation;
pub mod router;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use capabilities::ShoppingCapabilities;
pub use cart_memory::CartActionMemory;
pub use events::{EventSink, TurnEvent};
pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use interrupt::{AuthSignal, InterruptManager, PendingPrivilegedAction};
pub use llm::{ModelContext, ModelReply, ModelService};
pub use loop_guard::{should_stop, LoopGuard};
pub use merger::{derive_view, DisplayEntry, SearchSession};
pub use revalidation::{AddressRevalidator, CandidateSource, RevalidationOutcome};
pub use router::{ExecutionContext, FunctionRouter};
pub use runtime::{AgentRuntime, RuntimeError, StopReason, TurnOutcome};
pub use session::ConversationSession;
