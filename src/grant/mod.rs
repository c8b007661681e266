//! Time-limited access grants through conditional IAM bindings.

mod client;
mod grantor;
pub mod policy;
mod project;

pub use client::{PolicyApi, ResourceManagerClient};
pub use grantor::{grant_access, grant_access_at, Grant, GrantRequest, GRANTED_MESSAGE};
pub use policy::{Binding, Condition, Policy};
pub use project::resolve_project_id;
