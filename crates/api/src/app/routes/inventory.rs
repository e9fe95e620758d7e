use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use retailops_auth::policy::perms;
use retailops_core::AggregateId;
use retailops_infra::workflows;
use retailops_locations::LocationId;
use retailops_products::ProductId;

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/low-stock", get(low_stock))
        .route("/locations/:id", get(location_stock))
        .route("/locations/:id/products/:pid", get(product_stock))
        .route("/locations/:id/products/:pid/adjust", post(adjust_stock))
        .route("/locations/:id/products/:pid/reorder-level", post(set_reorder_level))
}

fn parse_pair(location: &str, product: &str) -> ApiResult<(AggregateId, AggregateId)> {
    Ok((dto::parse_id(location, "location")?, dto::parse_id(product, "product")?))
}

pub async fn location_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = dto::parse_id(&id, "location")?;
    authz::require_at(&tenant, &principal, perms::INVENTORY_READ, id)?;

    Ok(Json(
        services
            .read_models()
            .inventory
            .by_location(tenant.tenant_id(), LocationId::new(id)),
    ))
}

pub async fn product_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((location, product)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let (location, product) = parse_pair(&location, &product)?;
    authz::require_at(&tenant, &principal, perms::INVENTORY_READ, location)?;

    services
        .read_models()
        .inventory
        .get(tenant.tenant_id(), LocationId::new(location), ProductId::new(product))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no stock record for this product at this location"))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> ApiResult<impl IntoResponse> {
    let (location, product) = parse_pair(&location, &product)?;
    authz::require_at(&tenant, &principal, perms::INVENTORY_WRITE, location)?;
    let tenant_id = tenant.tenant_id();
    let (location_id, product_id) = (LocationId::new(location), ProductId::new(product));

    let committed = services.run(|d| {
        workflows::adjust_stock(d, tenant_id, location_id, product_id, body.delta, body.note, Utc::now())
    })?;

    let level = services.read_models().inventory.get(tenant_id, location_id, product_id);
    Ok(Json(serde_json::json!({"events_committed": committed.len(), "level": level})))
}

pub async fn set_reorder_level(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((location, product)): Path<(String, String)>,
    Json(body): Json<dto::ReorderLevelRequest>,
) -> ApiResult<impl IntoResponse> {
    let (location, product) = parse_pair(&location, &product)?;
    authz::require_at(&tenant, &principal, perms::INVENTORY_WRITE, location)?;
    let tenant_id = tenant.tenant_id();
    let (location_id, product_id) = (LocationId::new(location), ProductId::new(product));

    let committed = services.run(|d| {
        workflows::set_reorder_level(d, tenant_id, location_id, product_id, body.level, Utc::now())
    })?;

    let level = services.read_models().inventory.get(tenant_id, location_id, product_id);
    Ok(Json(serde_json::json!({"events_committed": committed.len(), "level": level})))
}

/// Items at or below their reorder level, limited to the caller's locations.
pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::LowStockQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::INVENTORY_READ)?;
    let location = dto::parse_optional_id(query.location.as_deref(), "location")?;
    if let Some(location) = location {
        authz::require_location(&principal, location)?;
    }

    let mut levels = services
        .read_models()
        .inventory
        .low_stock(tenant.tenant_id(), location.map(LocationId::new));
    if !authz::sees_all_locations(&principal) {
        levels.retain(|l| principal.locations().contains(&l.location_id.0));
    }
    Ok(Json(levels))
}
