pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, PrivilegedActionFlow};
pub use states::{FlowContext, FlowEvent, FlowState, FlowType, TransitionOutcome};
