//! `jobgate-core`: identifiers and the domain error model shared by every
//! other crate in the workspace.
//!
//! This crate is deliberately free of storage and HTTP concerns.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, SessionId, UserId};
