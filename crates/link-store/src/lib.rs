pub mod backing;
pub mod shared;
pub mod store;

pub use shared::SharedLinkStore;
pub use store::{IdentityLinkStore, StoreError};
