//! `jobgate-auth`: session records and the session store contract.
//!
//! This crate is decoupled from HTTP and from the storage engine: the route
//! guard lives in the API crate and durable stores live in infra.

pub mod session;
pub mod store;

pub use session::{Session, SessionPolicy};
pub use store::{InMemorySessionStore, SessionStore, SessionStoreError};
