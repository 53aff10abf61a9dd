//! Audit trail collaborator: append-only status-transition log,
//! cross-referencing the LLM call that produced a transition where one did.

mod audit;
mod error;

pub use audit::AuditLog;
pub use error::{SecurityError, SecurityResult};
