//! Shared logic used by both the CLI and the HTTP handlers

pub mod workflow;

pub use workflow::{AutoRoute, RetryAdvice, Workflow, WorkflowSettings, format_retry_advice};
