//! Shared credential and session state
//!
//! Both structures are process-wide, owned by the application state and
//! shared across every in-flight request behind readers-writer locks.

pub mod credentials;
pub mod sessions;

pub use credentials::CredentialPool;
pub use sessions::SessionRegistry;
