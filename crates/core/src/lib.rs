pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod turn_log;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::address::{AddressId, Coordinate, DeliveryAddress, DeliveryZoneCheck};
pub use domain::cart::{CartActionRecord, CartSummary, ItemId, ShopId};
pub use domain::function::{
    FunctionCall, FunctionName, FunctionOutcome, FunctionRequest, FunctionResult,
    FunctionSchemaError,
};
pub use domain::turn::{Role, TurnEntry, TurnEntryId};
pub use errors::{ApplicationError, DomainError};
pub use flows::{FlowEngine, FlowState, FlowTransitionError, PrivilegedActionFlow};
pub use turn_log::{InMemoryTurnLog, TurnLogStore};
