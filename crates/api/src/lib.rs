//! HTTP service: session-guarded job submission, job logs and the service
//! lifecycle.

pub mod app;
pub mod config;
pub mod context;
pub mod form;
pub mod middleware;
pub mod service;

pub use config::Config;
pub use form::{FieldKind, FormField, FormSpec};
pub use service::{Service, StartupError};
