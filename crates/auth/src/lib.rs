//! `warden-auth`: authentication and authorization core.
//!
//! Domain model, storage ports, password hashing, the token service, the policy
//! evaluator and the authenticator. This crate is decoupled from HTTP and from
//! concrete storage.

pub mod authenticator;
pub mod authorize;
pub mod claims;
pub mod error;
pub mod menu;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod policy_rule;
pub mod principal;
pub mod roles;
pub mod store;
pub mod token;
pub mod token_cache;
pub mod user;

pub use authenticator::{Authenticator, DEFAULT_LOCKOUT_THRESHOLD, LoginOutcome};
pub use authorize::{AuthzError, authorize};
pub use claims::{IdentityClaims, PASSWORD_CHANGE_ONLY, TokenClaims, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use menu::{MenuNode, MenuTreeNode, MenuVersion, PermissionLevel, merge_permission_levels};
pub use password::{DEFAULT_BCRYPT_COST, PasswordHasher, PasswordPolicy};
pub use permissions::{Permission, PermissionKey, PermissionSet};
pub use policy::PolicyEvaluator;
pub use policy_rule::{MenuGrant, MenuPermissionConfig, PolicyRule, PolicyType, validate_menu_configs};
pub use principal::Principal;
pub use roles::{NewRole, RoleDefinition, RolePatch, RoleStatus, UserRoleAssignment};
pub use store::{CredentialStore, Page, PolicyStore, StoreError, StoreResult};
pub use token::{MintedToken, TokenConfigError, TokenError, TokenService, TokenSettings};
pub use token_cache::{RevocationRecord, SessionRecord, TokenCache, token_fingerprint};
pub use user::{NewUser, UserMembership, UserPatch, UserProfile, UserStatus};
