//! Role-based authorization for MPS commands.
//!
//! The two qualification predicates in [`policy`] are the only authorization
//! primitive; [`gate`] composes them with channel and server checks into a
//! typed allow/deny decision per command invocation.

pub mod gate;
pub mod policy;

pub use gate::{Capability, CommandGate, Denial, DenialKind, GateDecision, InvocationContext};
pub use policy::{is_officer_qualified, is_staff_qualified};
