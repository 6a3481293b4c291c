pub mod directory;
pub mod reconciler;
pub mod schedule;
pub mod service;
#[cfg(test)]
mod tests;

pub use directory::{DirectoryError, InMemoryDirectory, MembershipDirectory, ResolveFuture};
pub use reconciler::{Reconciler, RoleChange, SweepReport};
pub use schedule::{start_reconciliation_loop, LoopState, SweepHandle, DEFAULT_SWEEP_INTERVAL};
pub use service::LinkService;
