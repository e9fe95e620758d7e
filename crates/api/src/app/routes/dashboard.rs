//! Dashboards. `GET /` picks the view from the caller's role: tenant-wide
//! for managers, the assigned shops for shopkeepers, stock on hand for
//! warehouse staff.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;

use retailops_auth::policy::perms;
use retailops_infra::projections::{DashboardQuery, LocationView, StockLevel, TransferView};
use retailops_insights::InsightError;
use retailops_locations::{LocationId, LocationKind};
use retailops_transfers::TransferStatus;

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const DEFAULT_RANGE_DAYS: u64 = 30;
const MAX_RANGE_DAYS: i64 = 366;
const DEFAULT_VELOCITY_WINDOW: u32 = 28;
const MAX_VELOCITY_WINDOW: u32 = 365;

pub fn router() -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/shops/:id", get(shop_dashboard))
        .route("/velocity", get(velocity))
}

#[derive(Debug, Serialize)]
struct WarehouseStock {
    warehouse: LocationView,
    units_on_hand: i64,
    low_stock: usize,
    levels: Vec<StockLevel>,
    inbound: Vec<TransferView>,
}

fn query_for(params: &dto::DashboardParams) -> ApiResult<DashboardQuery> {
    let to = params.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = match params.from {
        Some(from) => from,
        None => to
            .checked_sub_days(Days::new(DEFAULT_RANGE_DAYS - 1))
            .ok_or_else(|| ApiError::bad_request("invalid_range", "`to` is out of range"))?,
    };
    if from > to {
        return Err(ApiError::bad_request("invalid_range", "`from` must not be after `to`"));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(
            "invalid_range",
            format!("date range cannot exceed {MAX_RANGE_DAYS} days"),
        ));
    }

    let mut query = DashboardQuery::new(from, to);
    if let Some(top) = params.top {
        query.top_products = top;
    }
    Ok(query)
}

fn assigned(services: &AppServices, tenant: &TenantContext, principal: &PrincipalContext, kind: LocationKind) -> Vec<LocationView> {
    let mut locations = services.read_models().locations.list(tenant.tenant_id(), Some(kind));
    if !authz::sees_all_locations(principal) {
        locations.retain(|l| principal.locations().contains(&l.location_id.0));
    }
    locations
}

pub async fn dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<dto::DashboardParams>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = tenant.tenant_id();
    let models = services.read_models();

    if principal.has_permission(perms::DASHBOARD_GLOBAL) {
        let overview = models.dashboard.overview(tenant_id, &query_for(&params)?);
        return Ok(Json(serde_json::json!({"scope": "global", "overview": overview})));
    }

    if principal.has_permission(perms::DASHBOARD_SHOP) {
        let shops: Vec<LocationId> = assigned(&services, &tenant, &principal, LocationKind::Shop)
            .into_iter()
            .map(|l| l.location_id)
            .collect();
        let query = query_for(&params)?.for_shops(shops);
        let overview = models.dashboard.overview(tenant_id, &query);
        return Ok(Json(serde_json::json!({"scope": "shop", "overview": overview})));
    }

    if principal.has_permission(perms::DASHBOARD_WAREHOUSE) {
        let in_transit = models.transfers.list(tenant_id, None, Some(TransferStatus::InTransit));
        let warehouses: Vec<WarehouseStock> = assigned(&services, &tenant, &principal, LocationKind::Warehouse)
            .into_iter()
            .map(|warehouse| {
                let levels = models.inventory.by_location(tenant_id, warehouse.location_id);
                let inbound = in_transit
                    .iter()
                    .filter(|t| t.to == warehouse.location_id)
                    .cloned()
                    .collect();
                WarehouseStock {
                    units_on_hand: levels.iter().map(|l| l.on_hand).sum(),
                    low_stock: levels.iter().filter(|l| l.is_low()).count(),
                    levels,
                    inbound,
                    warehouse,
                }
            })
            .collect();
        return Ok(Json(serde_json::json!({"scope": "warehouse", "warehouses": warehouses})));
    }

    Err(ApiError::forbidden("no dashboard available for this role"))
}

pub async fn shop_dashboard(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Query(params): Query<dto::DashboardParams>,
) -> ApiResult<impl IntoResponse> {
    if !principal.has_permission(perms::DASHBOARD_GLOBAL) {
        authz::require(&tenant, &principal, perms::DASHBOARD_SHOP)?;
    }
    let id = dto::parse_id(&id, "shop")?;
    authz::require_location(&principal, id)?;
    let tenant_id = tenant.tenant_id();

    let shop = services
        .read_models()
        .locations
        .get(tenant_id, &LocationId::new(id))
        .filter(|l| l.kind == LocationKind::Shop)
        .ok_or_else(|| ApiError::not_found("shop not found"))?;

    let query = query_for(&params)?.for_shops(vec![shop.location_id]);
    let overview = services.read_models().dashboard.overview(tenant_id, &query);
    Ok(Json(serde_json::json!({"shop": shop, "overview": overview})))
}

/// Stock-velocity forecast, most urgent first.
pub async fn velocity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::VelocityQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::INSIGHTS_READ)?;
    let location = dto::parse_optional_id(query.location.as_deref(), "location")?;
    if let Some(location) = location {
        authz::require_location(&principal, location)?;
    }

    let window = query.window.unwrap_or(DEFAULT_VELOCITY_WINDOW);
    if window == 0 || window > MAX_VELOCITY_WINDOW {
        return Err(ApiError::bad_request(
            "invalid_window",
            format!("window must be between 1 and {MAX_VELOCITY_WINDOW} days"),
        ));
    }
    let as_of: NaiveDate = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    if as_of.checked_sub_days(Days::new(u64::from(window) - 1)).is_none() {
        return Err(ApiError::bad_request("invalid_range", "`as_of` is out of range"));
    }

    let mut items = services
        .stock_velocity(tenant.tenant_id(), location.map(LocationId::new), as_of, window)
        .map_err(|err| match err {
            InsightError::InvalidInput(msg) => ApiError::bad_request("invalid_input", msg),
            InsightError::Internal(msg) => ApiError::internal(msg),
        })?;
    if !authz::sees_all_locations(&principal) {
        items.retain(|i| principal.locations().contains(&i.location_id));
    }

    Ok(Json(serde_json::json!({
        "as_of": as_of,
        "window_days": window,
        "items": items,
    })))
}
