// Session tracking module
// Provides the principal/session index and the record types it stores

pub mod registry;
pub mod types;

pub use registry::SessionRegistry;
pub use types::{Principal, SessionRecord};
