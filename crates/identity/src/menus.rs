//! Menu catalog uploads, role menu configuration and menu trees.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use warden_auth::menu::{flatten_menus, parse_menu_document};
use warden_auth::{IdentityClaims, MenuGrant, MenuTreeNode, MenuVersion, validate_menu_configs};
use warden_core::{ErrorCode, RoleId, ServiceError, ServiceResult, time::now_millis};
use warden_observability::RpcMetadata;

use crate::access::{ACTION_READ, ACTION_WRITE, RESOURCE_MENU};
use crate::model::{ConfigureRoleMenusRequest, OperationStatus};
use crate::service::{IdentityService, traced};

const VERSION_LABEL_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Next label timestamp: the current millisecond, or one past the previous
/// label when the clock has not moved.
fn next_label_time(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if now <= last => last + Duration::milliseconds(1),
        _ => now,
    }
}

impl IdentityService {
    /// Parse a YAML menu document and store it as a new catalog version.
    pub async fn upload_menus(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        document: &str,
    ) -> ServiceResult<MenuVersion> {
        traced(md, "upload_menus", async {
            self.require(operator, RESOURCE_MENU, ACTION_WRITE).await?;
            let specs = parse_menu_document(document)
                .map_err(|e| ServiceError::new(ErrorCode::InvalidMenuDocument, e.to_string()))?;

            // Held across the insert so versions land in label order.
            let mut clock = self.menu_clock.lock().await;
            let at = next_label_time(*clock, now_millis());
            let label = at.format(VERSION_LABEL_FORMAT).to_string();
            let nodes = flatten_menus(&specs, &label, at);
            let version = self.policies.insert_menu_version(&label, nodes).await?;
            *clock = Some(at);

            info!(version = %version.version, nodes = version.node_count, "menu catalog uploaded");
            Ok(version)
        })
        .await
    }

    pub async fn latest_menu_tree(&self, md: &RpcMetadata, operator: &IdentityClaims) -> ServiceResult<Vec<MenuTreeNode>> {
        traced(md, "latest_menu_tree", async {
            self.require(operator, RESOURCE_MENU, ACTION_READ).await?;
            Ok(self.authenticator.evaluator().latest_menu_tree().await?)
        })
        .await
    }

    /// Catalog versions, newest first.
    pub async fn list_menu_versions(&self, md: &RpcMetadata, operator: &IdentityClaims) -> ServiceResult<Vec<MenuVersion>> {
        traced(md, "list_menu_versions", async {
            self.require(operator, RESOURCE_MENU, ACTION_READ).await?;
            Ok(self.policies.list_menu_versions().await?)
        })
        .await
    }

    /// The caller's own menu tree. Needs no admin permission.
    pub async fn user_menu_tree(&self, md: &RpcMetadata, caller: &IdentityClaims) -> ServiceResult<Vec<MenuTreeNode>> {
        traced(md, "user_menu_tree", async {
            if caller.is_password_change_only() {
                return Err(ErrorCode::MustChangePassword.into());
            }
            Ok(self
                .authenticator
                .evaluator()
                .build_user_menu_tree(caller.user_id)
                .await?)
        })
        .await
    }

    /// Raw menu grants of a role, orphans included.
    pub async fn role_menu_permissions(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
    ) -> ServiceResult<Vec<MenuGrant>> {
        traced(md, "role_menu_permissions", async {
            self.require(operator, RESOURCE_MENU, ACTION_READ).await?;
            self.load_role(role_id).await?;
            Ok(self.policies.menu_grants_for_role(role_id).await?)
        })
        .await
    }

    /// Full latest tree tagged with the role's permission on every node.
    pub async fn role_menu_tree(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
    ) -> ServiceResult<Vec<MenuTreeNode>> {
        traced(md, "role_menu_tree", async {
            self.require(operator, RESOURCE_MENU, ACTION_READ).await?;
            Ok(self
                .authenticator
                .evaluator()
                .build_role_menu_tree_annotated(role_id)
                .await?)
        })
        .await
    }

    /// Replace every menu grant of the role with `req.menus`.
    ///
    /// One bad permission string rejects the whole request.
    pub async fn configure_role_menus(
        &self,
        md: &RpcMetadata,
        operator: &IdentityClaims,
        role_id: RoleId,
        req: ConfigureRoleMenusRequest,
    ) -> ServiceResult<OperationStatus> {
        traced(md, "configure_role_menus", async {
            self.require(operator, RESOURCE_MENU, ACTION_WRITE).await?;
            let role = self.load_role(role_id).await?;
            if role.is_system_role {
                return Err(ErrorCode::SystemRoleCannotModify.into());
            }
            let grants = validate_menu_configs(&req.menus).map_err(|bad| {
                ServiceError::new(
                    ErrorCode::InvalidMenuPermission,
                    format!("invalid menu permission '{bad}'"),
                )
            })?;
            self.policies.configure_role_menus(role_id, &grants).await?;
            info!(role_id = %role_id, grants = grants.len(), "role menus configured");
            Ok(OperationStatus::OK)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use warden_auth::{MenuPermissionConfig, Permission, PermissionLevel};

    use super::*;
    use crate::test_support::Fixture;

    const V1: &str = "
menus:
  - id: dashboard
    name: Dashboard
    path: /dashboard
    children:
      - id: patients
        name: Patients
        path: /dashboard/patients
  - id: billing
    name: Billing
    path: /billing
";

    fn config(menu_id: &str, permission: &str) -> MenuPermissionConfig {
        MenuPermissionConfig {
            menu_id: menu_id.into(),
            permission: permission.into(),
        }
    }

    fn ids(tree: &[MenuTreeNode]) -> Vec<String> {
        tree.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn label_time_is_strictly_increasing() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(next_label_time(None, t), t);
        assert_eq!(next_label_time(Some(t), t), t + Duration::milliseconds(1));
        let earlier = t - Duration::seconds(1);
        assert_eq!(next_label_time(Some(t), earlier), t + Duration::milliseconds(1));
        assert_eq!(t.format(VERSION_LABEL_FORMAT).to_string(), "20260102030405000");
    }

    #[tokio::test]
    async fn back_to_back_uploads_get_distinct_ordered_labels() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let a = fx.service.upload_menus(&md, &fx.admin, V1).await.unwrap();
        let b = fx.service.upload_menus(&md, &fx.admin, V1).await.unwrap();
        assert!(b.version > a.version);
        assert_eq!(a.node_count, 3);

        let versions = fx.service.list_menu_versions(&md, &fx.admin).await.unwrap();
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn malformed_document_is_rejected() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let err = fx
            .service
            .upload_menus(&md, &fx.admin, "menus:\n  - id: x\n    name: X\n")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMenuDocument);

        let err = fx.service.latest_menu_tree(&md, &fx.admin).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::MenuVersionNotFound);
    }

    #[tokio::test]
    async fn user_tree_follows_role_grants() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        fx.service.upload_menus(&md, &fx.admin, V1).await.unwrap();
        let (user_id, role_id) = fx.user_with_role_ids("nurse", vec![]).await;
        let nurse = fx.user_with_role("other", vec![]).await;

        fx.service
            .configure_role_menus(
                &md,
                &fx.admin,
                role_id,
                ConfigureRoleMenusRequest {
                    menus: vec![config("patients", "view_own_organization")],
                },
            )
            .await
            .unwrap();

        let caller = IdentityClaims {
            user_id,
            ..nurse.clone()
        };
        let tree = fx.service.user_menu_tree(&md, &caller).await.unwrap();
        assert_eq!(ids(&tree), vec!["dashboard".to_string()]);
        assert_eq!(ids(&tree[0].children), vec!["patients".to_string()]);

        assert!(fx.service.user_menu_tree(&md, &nurse).await.unwrap().is_empty());
        assert_eq!(fx.service.user_menu_tree(&md, &fx.admin).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_permission_rejects_whole_configuration() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let (_, role_id) = fx.user_with_role_ids("nurse", vec![]).await;
        fx.service
            .configure_role_menus(
                &md,
                &fx.admin,
                role_id,
                ConfigureRoleMenusRequest {
                    menus: vec![config("billing", "view_all_organizations")],
                },
            )
            .await
            .unwrap();

        let err = fx
            .service
            .configure_role_menus(
                &md,
                &fx.admin,
                role_id,
                ConfigureRoleMenusRequest {
                    menus: vec![config("patients", "view_own_organization"), config("billing", "edit")],
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMenuPermission);

        let grants = fx.service.role_menu_permissions(&md, &fx.admin, role_id).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].level, PermissionLevel::ViewAllOrganizations);
    }

    #[tokio::test]
    async fn annotated_tree_and_orphan_grants() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        fx.service.upload_menus(&md, &fx.admin, V1).await.unwrap();
        let (_, role_id) = fx.user_with_role_ids("nurse", vec![]).await;
        fx.service
            .configure_role_menus(
                &md,
                &fx.admin,
                role_id,
                ConfigureRoleMenusRequest {
                    menus: vec![
                        config("billing", "view_own_organization"),
                        config("retired", "view_all_organizations"),
                    ],
                },
            )
            .await
            .unwrap();

        let tree = fx.service.role_menu_tree(&md, &fx.admin, role_id).await.unwrap();
        assert_eq!(ids(&tree), vec!["dashboard".to_string(), "billing".to_string()]);
        let billing = tree[1].annotation.unwrap();
        assert!(billing.has_permission);
        assert!(!tree[0].annotation.unwrap().has_permission);

        let grants = fx.service.role_menu_permissions(&md, &fx.admin, role_id).await.unwrap();
        assert!(grants.iter().any(|g| g.menu_id == "retired"));
    }

    #[tokio::test]
    async fn system_role_menus_are_fixed() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let system = fx
            .service
            .list_roles(&md, &fx.admin)
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.is_system_role)
            .unwrap();
        let err = fx
            .service
            .configure_role_menus(&md, &fx.admin, system.id, ConfigureRoleMenusRequest { menus: vec![] })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SystemRoleCannotModify);
    }

    #[tokio::test]
    async fn menu_admin_requires_menu_permissions() {
        let fx = Fixture::new().await;
        let md = RpcMetadata::new();
        let reader = fx.user_with_role("reader", vec![Permission::new("menu", "read")]).await;
        fx.service.list_menu_versions(&md, &reader).await.unwrap();
        let err = fx.service.upload_menus(&md, &reader, V1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }
}
