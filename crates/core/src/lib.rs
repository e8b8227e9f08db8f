//! `warden-core`: shared identity primitives.
//!
//! This crate contains **pure** building blocks (no infrastructure concerns):
//! identifiers, timestamps and the stable error taxonomy.

pub mod error;
pub mod id;
pub mod time;

pub use error::{ErrorCategory, ErrorCode, ServiceError, ServiceResult};
pub use id::{
    AssignmentId, DepartmentId, MembershipId, MenuRowId, OrganizationId, RoleId, UserId,
};
