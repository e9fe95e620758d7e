use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use retailops_auth::policy::perms;
use retailops_core::AggregateId;
use retailops_locations::{
    CloseLocation, Location, LocationCommand, LocationId, LocationKind, OpenLocation, ReopenLocation, UpdateLocation,
};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_locations))
        .route("/shops", post(open_shop))
        .route("/warehouses", post(open_warehouse))
        .route("/:id", get(get_location).patch(update_location))
        .route("/:id/close", post(close_location))
        .route("/:id/reopen", post(reopen_location))
}

async fn open_shop(
    services: Extension<Arc<AppServices>>,
    tenant: Extension<TenantContext>,
    principal: Extension<PrincipalContext>,
    body: Json<dto::OpenLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    open_location(services, tenant, principal, LocationKind::Shop, body)
}

async fn open_warehouse(
    services: Extension<Arc<AppServices>>,
    tenant: Extension<TenantContext>,
    principal: Extension<PrincipalContext>,
    body: Json<dto::OpenLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    open_location(services, tenant, principal, LocationKind::Warehouse, body)
}

fn open_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    kind: LocationKind,
    Json(body): Json<dto::OpenLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::LOCATIONS_WRITE)?;
    let tenant_id = tenant.tenant_id();

    if services
        .read_models()
        .locations
        .find_by_code(tenant_id, &body.code)
        .is_some()
    {
        return Err(ApiError::conflict(format!("location code {} already in use", body.code.trim())));
    }

    let location_id = LocationId::new(AggregateId::new());
    let committed = services.execute::<Location>(
        tenant_id,
        location_id.0,
        LocationCommand::OpenLocation(OpenLocation {
            tenant_id,
            location_id,
            kind,
            code: body.code,
            name: body.name,
            address: body.address,
            occurred_at: Utc::now(),
        }),
    )?;

    let view = services.read_models().locations.get(tenant_id, &location_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": location_id.0.to_string(),
            "events_committed": committed.len(),
            "location": view,
        })),
    ))
}

async fn list_locations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LocationListQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::LOCATIONS_READ)?;

    let mut locations = services.read_models().locations.list(tenant.tenant_id(), query.kind);
    if !authz::sees_all_locations(&principal) {
        locations.retain(|l| principal.locations().contains(&l.location_id.0));
    }
    Ok(Json(locations))
}

async fn get_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = dto::parse_id(&id, "location")?;
    authz::require_at(&tenant, &principal, perms::LOCATIONS_READ, id)?;

    services
        .read_models()
        .locations
        .get(tenant.tenant_id(), &LocationId::new(id))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("location not found"))
}

async fn update_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateLocationRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = dto::parse_id(&id, "location")?;
    authz::require(&tenant, &principal, perms::LOCATIONS_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let committed = services.execute::<Location>(
        tenant_id,
        id,
        LocationCommand::UpdateLocation(UpdateLocation {
            tenant_id,
            location_id: LocationId::new(id),
            name: body.name,
            address: body.address,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}

async fn close_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = dto::parse_id(&id, "location")?;
    authz::require(&tenant, &principal, perms::LOCATIONS_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let committed = services.execute::<Location>(
        tenant_id,
        id,
        LocationCommand::CloseLocation(CloseLocation {
            tenant_id,
            location_id: LocationId::new(id),
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}

async fn reopen_location(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = dto::parse_id(&id, "location")?;
    authz::require(&tenant, &principal, perms::LOCATIONS_WRITE)?;
    let tenant_id = tenant.tenant_id();

    let committed = services.execute::<Location>(
        tenant_id,
        id,
        LocationCommand::ReopenLocation(ReopenLocation {
            tenant_id,
            location_id: LocationId::new(id),
            occurred_at: Utc::now(),
        }),
    )?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}
