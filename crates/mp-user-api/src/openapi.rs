#![allow(dead_code)]

use axum::http::HeaderMap;
use utoipa::openapi::server::ServerBuilder;
use utoipa::OpenApi;

use crate::{ErrorResponse, HealthStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        healthz_doc,
        metrics_doc,
        openapi_doc,
        register_doc,
        login_doc,
        me_doc,
        delete_account_doc,
        update_profile_doc,
        add_role_doc,
        remove_role_doc,
        set_skills_doc,
        public_profile_doc,
        categories_doc,
        skills_doc,
        tags_search_doc,
        tags_resolve_doc,
        listings_browse_doc,
        listings_create_doc,
        listing_get_doc,
        listing_update_doc,
        listing_delete_doc,
        listing_publish_doc,
        listing_close_doc,
        listing_complete_doc,
        my_listings_doc,
        applications_list_doc,
        applications_create_doc,
        my_applications_doc,
        application_withdraw_doc,
        application_accept_doc,
        application_reject_doc,
        message_send_doc,
        message_threads_doc,
        message_conversation_doc,
        message_read_doc
    ),
    components(schemas(HealthStatus, ErrorResponse)),
    tags(
        (name = "user-api", description = "Marketplace user API for seekers and providers")
    )
)]
pub struct UserApiDoc;

pub fn document(server_url: Option<&str>) -> utoipa::openapi::OpenApi {
    let mut doc = UserApiDoc::openapi();
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
    path = "/v1/auth/register",
    request_body = serde_json::Value,
    responses(
        (status = 201, body = serde_json::Value),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse),
        (status = 429, body = ErrorResponse)
    )
)]
fn register_doc() {}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = serde_json::Value,
    responses(
        (status = 200, body = serde_json::Value),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse),
        (status = 410, body = ErrorResponse)
    )
)]
fn login_doc() {}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn me_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/me",
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn delete_account_doc() {}

#[utoipa::path(
    put,
    path = "/v1/me/profile",
    request_body = serde_json::Value,
    responses((status = 200, body = serde_json::Value), (status = 422, body = ErrorResponse))
)]
fn update_profile_doc() {}

#[utoipa::path(
    post,
    path = "/v1/me/roles",
    request_body = serde_json::Value,
    responses((status = 200, body = serde_json::Value), (status = 422, body = ErrorResponse))
)]
fn add_role_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/me/roles/{role}",
    params(("role" = String, Path, description = "seeker or provider")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn remove_role_doc() {}

#[utoipa::path(
    put,
    path = "/v1/me/skills",
    request_body = serde_json::Value,
    responses((status = 200, body = serde_json::Value), (status = 422, body = ErrorResponse))
)]
fn set_skills_doc() {}

#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    responses((status = 200, body = serde_json::Value), (status = 404, body = ErrorResponse))
)]
fn public_profile_doc() {}

#[utoipa::path(
    get,
    path = "/v1/categories",
    responses((status = 200, body = serde_json::Value))
)]
fn categories_doc() {}

#[utoipa::path(
    get,
    path = "/v1/skills",
    params(
        ("q" = Option<String>, Query, description = "Name filter"),
        ("limit" = Option<i64>, Query, description = "Result limit")
    ),
    responses((status = 200, body = serde_json::Value))
)]
fn skills_doc() {}

#[utoipa::path(
    get,
    path = "/v1/tags",
    params(
        ("q" = Option<String>, Query, description = "Prefix or fuzzy match"),
        ("limit" = Option<i64>, Query, description = "Result limit")
    ),
    responses((status = 200, body = serde_json::Value))
)]
fn tags_search_doc() {}

#[utoipa::path(
    post,
    path = "/v1/tags/resolve",
    request_body = serde_json::Value,
    responses(
        (status = 200, body = serde_json::Value),
        (status = 401, body = ErrorResponse),
        (status = 403, body = ErrorResponse),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn tags_resolve_doc() {}

#[utoipa::path(
    get,
    path = "/v1/listings",
    params(
        ("category" = Option<String>, Query, description = "Category slug"),
        ("tag" = Option<String>, Query, description = "Tag name"),
        ("q" = Option<String>, Query, description = "Title or description search"),
        ("remote" = Option<bool>, Query, description = "Remote listings only"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value))
)]
fn listings_browse_doc() {}

#[utoipa::path(
    post,
    path = "/v1/listings",
    request_body = serde_json::Value,
    responses(
        (status = 201, body = serde_json::Value),
        (status = 403, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn listings_create_doc() {}

#[utoipa::path(
    get,
    path = "/v1/listings/{listing_id}",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 200, body = serde_json::Value), (status = 404, body = ErrorResponse))
)]
fn listing_get_doc() {}

#[utoipa::path(
    put,
    path = "/v1/listings/{listing_id}",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    request_body = serde_json::Value,
    responses(
        (status = 200, body = serde_json::Value),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn listing_update_doc() {}

#[utoipa::path(
    delete,
    path = "/v1/listings/{listing_id}",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 204), (status = 404, body = ErrorResponse))
)]
fn listing_delete_doc() {}

#[utoipa::path(
    post,
    path = "/v1/listings/{listing_id}/publish",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn listing_publish_doc() {}

#[utoipa::path(
    post,
    path = "/v1/listings/{listing_id}/close",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn listing_close_doc() {}

#[utoipa::path(
    post,
    path = "/v1/listings/{listing_id}/complete",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn listing_complete_doc() {}

#[utoipa::path(
    get,
    path = "/v1/me/listings",
    params(
        ("status" = Option<String>, Query, description = "Listing status"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn my_listings_doc() {}

#[utoipa::path(
    get,
    path = "/v1/listings/{listing_id}/applications",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    responses((status = 200, body = serde_json::Value), (status = 403, body = ErrorResponse))
)]
fn applications_list_doc() {}

#[utoipa::path(
    post,
    path = "/v1/listings/{listing_id}/applications",
    params(("listing_id" = String, Path, description = "Listing identifier")),
    request_body = serde_json::Value,
    responses(
        (status = 201, body = serde_json::Value),
        (status = 409, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn applications_create_doc() {}

#[utoipa::path(
    get,
    path = "/v1/me/applications",
    params(
        ("status" = Option<String>, Query, description = "Application status"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn my_applications_doc() {}

#[utoipa::path(
    post,
    path = "/v1/applications/{application_id}/withdraw",
    params(("application_id" = String, Path, description = "Application identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn application_withdraw_doc() {}

#[utoipa::path(
    post,
    path = "/v1/applications/{application_id}/accept",
    params(("application_id" = String, Path, description = "Application identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn application_accept_doc() {}

#[utoipa::path(
    post,
    path = "/v1/applications/{application_id}/reject",
    params(("application_id" = String, Path, description = "Application identifier")),
    responses((status = 200, body = serde_json::Value), (status = 409, body = ErrorResponse))
)]
fn application_reject_doc() {}

#[utoipa::path(
    post,
    path = "/v1/messages",
    request_body = serde_json::Value,
    responses(
        (status = 201, body = serde_json::Value),
        (status = 404, body = ErrorResponse),
        (status = 422, body = ErrorResponse)
    )
)]
fn message_send_doc() {}

#[utoipa::path(
    get,
    path = "/v1/messages/threads",
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn message_threads_doc() {}

#[utoipa::path(
    get,
    path = "/v1/messages/with/{user_id}",
    params(
        ("user_id" = String, Path, description = "Counterpart user identifier"),
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size")
    ),
    responses((status = 200, body = serde_json::Value), (status = 401, body = ErrorResponse))
)]
fn message_conversation_doc() {}

#[utoipa::path(
    post,
    path = "/v1/messages/{message_id}/read",
    params(("message_id" = String, Path, description = "Message identifier")),
    responses((status = 200, body = serde_json::Value), (status = 404, body = ErrorResponse))
)]
fn message_read_doc() {}
