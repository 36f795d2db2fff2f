//! The negotiation core: role resolution, the offer/answer state machine,
//! candidate buffering, and connection lifecycle monitoring

pub mod buffer;
pub mod lifecycle;
pub mod machine;
pub mod role;

pub use buffer::CandidateBuffer;
pub use lifecycle::{ConnectionLifecycleMonitor, LifecycleEvent};
pub use machine::{MachineEvent, NegotiationState, NegotiationStateMachine, StateReport};
pub use role::{Role, RoleResolver};
