#![allow(dead_code)]

use axum::http::HeaderMap;
use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

use crate::auth::{AdminUser, LoginRequest, LoginResponse};
use crate::catalog::{AdminCategory, AdminSkill, CategoryRequest, SkillRequest};
use crate::dashboard::{DashboardSnapshot, TagCounts};
use crate::listings::AdminListingView;
use crate::services::{AuditLog, ServiceConfigResponse, UpdateServiceConfigRequest};
use crate::tags::{AdminTag, RenameTagRequest};
use crate::users::{AdminUserView, GrantRoleRequest, ReasonRequest};
use crate::{ErrorResponse, HealthStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        healthz_doc,
        metrics_doc,
        openapi_doc,
        login_doc,
        logout_doc,
        me_doc,
        dashboard_doc,
        users_list_doc,
        user_suspend_doc,
        user_reactivate_doc,
        user_grant_role_doc,
        user_revoke_role_doc,
        listings_list_doc,
        listing_remove_doc,
        listing_restore_doc,
        categories_list_doc,
        category_create_doc,
        category_update_doc,
        category_delete_doc,
        category_restore_doc,
        skills_list_doc,
        skill_create_doc,
        skill_update_doc,
        skill_delete_doc,
        skill_restore_doc,
        tags_list_doc,
        tag_rename_doc,
        tag_delete_doc,
        tag_restore_doc,
        services_list_doc,
        service_config_get_doc,
        service_config_update_doc,
        audit_logs_doc
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        LoginRequest,
        LoginResponse,
        AdminUser,
        DashboardSnapshot,
        TagCounts,
        AdminUserView,
        ReasonRequest,
        GrantRoleRequest,
        AdminListingView,
        AdminCategory,
        AdminSkill,
        CategoryRequest,
        SkillRequest,
        AdminTag,
        RenameTagRequest,
        ServiceConfigResponse,
        UpdateServiceConfigRequest,
        AuditLog
    )),
    tags(
        (name = "admin-api", description = "Marketplace moderation and operations API")
    )
)]
pub struct AdminApiDoc;

pub fn document(server_url: Option<&str>) -> utoipa::openapi::OpenApi {
    let mut doc = AdminApiDoc::openapi();
    if let Some(url) = server_url {
        doc.servers = Some(vec![ServerBuilder::new().url(url).build()]);
    }
    doc
}

pub fn infer_server_url(headers: &HeaderMap) -> Option<String> {
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get("host"))
        .and_then(|value| value.to_str().ok())?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    Some(format!("{proto}://{host}"))
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, body = HealthStatus), (status = 503, body = HealthStatus))
)]
fn healthz_doc() {}

#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, content_type = "text/plain", body = String))
)]
fn metrics_doc() {}

#[utoipa::path(
    get,
    path = "/v1/openapi.json",
    responses((status = 200, body = serde_json::Value))
)]
fn openapi_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse)
    )
)]
fn login_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/auth/logout",
    responses((status = 200, body = serde_json::Value))
)]
fn logout_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/auth/me",
    responses((status = 200, body = AdminUser), (status = 401, body = ErrorResponse))
)]
fn me_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/dashboard",
    responses((status = 200, body = DashboardSnapshot), (status = 401, body = ErrorResponse))
)]
fn dashboard_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    params(
        ("status" = Option<String>, Query, description = "active, suspended or deleted"),
        ("role" = Option<String>, Query, description = "seeker, provider or admin"),
        ("q" = Option<String>, Query, description = "Email or display name search"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn users_list_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/suspend",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = ReasonRequest,
    responses(
        (status = 200, body = AdminUserView),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn user_suspend_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/reactivate",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, body = AdminUserView),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn user_reactivate_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/users/{user_id}/roles",
    params(("user_id" = String, Path, description = "User identifier")),
    request_body = GrantRoleRequest,
    responses(
        (status = 200, body = AdminUserView),
        (status = 404, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn user_grant_role_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/admin/users/{user_id}/roles/{role}",
    params(
        ("user_id" = String, Path, description = "User identifier"),
        ("role" = String, Path, description = "Role to revoke")
    ),
    responses(
        (status = 200, body = AdminUserView),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn user_revoke_role_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/listings",
    params(
        ("status" = Option<String>, Query, description = "Listing status"),
        ("q" = Option<String>, Query, description = "Title search"),
        ("seeker_id" = Option<String>, Query, description = "Owner filter"),
        ("removed" = Option<bool>, Query, description = "Removed listings only (true) or live only (false)"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn listings_list_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/listings/{listing_id}/remove",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    request_body = ReasonRequest,
    responses(
        (status = 200, body = AdminListingView),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn listing_remove_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/listings/{listing_id}/restore",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses(
        (status = 200, body = AdminListingView),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn listing_restore_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/categories",
    responses((status = 200, body = [AdminCategory]), (status = 401, body = ErrorResponse))
)]
fn categories_list_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, body = AdminCategory),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn category_create_doc() {}

#[utoipa::path(
    put,
    path = "/v1/admin/categories/{category_id}",
    params(("category_id" = String, Path, description = "Category identifier")),
    request_body = CategoryRequest,
    responses(
        (status = 200, body = AdminCategory),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn category_update_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/admin/categories/{category_id}",
    params(("category_id" = String, Path, description = "Category identifier")),
    responses((status = 200, body = AdminCategory), (status = 409, body = ErrorResponse))
)]
fn category_delete_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/categories/{category_id}/restore",
    params(("category_id" = String, Path, description = "Category identifier")),
    responses((status = 200, body = AdminCategory), (status = 409, body = ErrorResponse))
)]
fn category_restore_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/skills",
    responses((status = 200, body = [AdminSkill]), (status = 401, body = ErrorResponse))
)]
fn skills_list_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/skills",
    request_body = SkillRequest,
    responses(
        (status = 201, body = AdminSkill),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn skill_create_doc() {}

#[utoipa::path(
    put,
    path = "/v1/admin/skills/{skill_id}",
    params(("skill_id" = String, Path, description = "Skill identifier")),
    request_body = SkillRequest,
    responses(
        (status = 200, body = AdminSkill),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
fn skill_update_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/admin/skills/{skill_id}",
    params(("skill_id" = String, Path, description = "Skill identifier")),
    responses((status = 200, body = AdminSkill), (status = 409, body = ErrorResponse))
)]
fn skill_delete_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/skills/{skill_id}/restore",
    params(("skill_id" = String, Path, description = "Skill identifier")),
    responses((status = 200, body = AdminSkill), (status = 409, body = ErrorResponse))
)]
fn skill_restore_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/tags",
    params(
        ("q" = Option<String>, Query, description = "Name search"),
        ("include_deleted" = Option<bool>, Query, description = "Defaults to true"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn tags_list_doc() {}

#[utoipa::path(
    put,
    path = "/v1/admin/tags/{tag_id}",
    params(("tag_id" = String, Path, description = "Tag identifier")),
    request_body = RenameTagRequest,
    responses(
        (status = 200, body = AdminTag),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn tag_rename_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/admin/tags/{tag_id}",
    params(("tag_id" = String, Path, description = "Tag identifier")),
    responses((status = 200, body = AdminTag), (status = 409, body = ErrorResponse))
)]
fn tag_delete_doc() {}

#[utoipa::path(
    post,
    path = "/v1/admin/tags/{tag_id}/restore",
    params(("tag_id" = String, Path, description = "Tag identifier")),
    responses((status = 200, body = AdminTag), (status = 409, body = ErrorResponse))
)]
fn tag_restore_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/services",
    responses((status = 200, body = [ServiceConfigResponse]), (status = 401, body = ErrorResponse))
)]
fn services_list_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/services/{service}/config",
    params(("service" = String, Path, description = "user-api or admin-api")),
    responses((status = 200, body = ServiceConfigResponse), (status = 404, body = ErrorResponse))
)]
fn service_config_get_doc() {}

#[utoipa::path(
    put,
    path = "/v1/admin/services/{service}/config",
    params(("service" = String, Path, description = "user-api or admin-api")),
    request_body = UpdateServiceConfigRequest,
    responses(
        (status = 200, body = ServiceConfigResponse),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn service_config_update_doc() {}

#[utoipa::path(
    get,
    path = "/v1/admin/audit-logs",
    params(
        ("action" = Option<String>, Query, description = "Exact action, e.g. tag.rename"),
        ("target" = Option<String>, Query, description = "Exact target, e.g. tag:<id>"),
        ("since" = Option<i64>, Query, description = "Unix seconds lower bound"),
        ("limit" = Option<i64>, Query, description = "Maximum rows (1..=1000)")
    ),
    responses((status = 200, body = [AuditLog]), (status = 401, body = ErrorResponse))
)]
fn audit_logs_doc() {}
