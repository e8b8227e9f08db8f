//! `warden-identity`: the identity service.
//!
//! Every call takes the caller's [`RpcMetadata`](warden_observability::RpcMetadata)
//! and fails with a [`ServiceError`](warden_core::ServiceError) whose code and
//! message reach the gateway unchanged. Administrative calls additionally take
//! the operator's claims and authorize them against the policy store.

pub mod access;
pub mod bootstrap;
pub mod menus;
pub mod model;
pub mod roles;
pub mod service;
pub mod session;
pub mod users;

#[cfg(test)]
mod test_support;

pub use access::{ACTION_READ, ACTION_WRITE, RESOURCE_MENU, RESOURCE_ROLE, RESOURCE_USER};
pub use model::{
    AddMembershipRequest, AssignRoleRequest, ChangePasswordRequest, ConfigureRoleMenusRequest,
    CreateUserRequest, LoginRequest, LoginResponse, OperationStatus, PermissionInfo,
    RefreshResponse, ReplaceRoleUsersRequest, ResetPasswordRequest, TokenInfo, UpdateUserRequest,
    UpdateUserStatusRequest, UserList,
};
pub use service::{IdentityService, IdentitySettings};
