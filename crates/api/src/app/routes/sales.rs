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
use retailops_infra::workflows::{self, RecordSaleInput, SaleLineInput};
use retailops_locations::LocationId;
use retailops_products::ProductId;
use retailops_sales::SaleId;

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_sale).get(list_sales))
        .route("/:id", get(get_sale))
        .route("/:id/void", post(void_sale))
}

pub async fn record_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RecordSaleRequest>,
) -> ApiResult<impl IntoResponse> {
    let shop = dto::parse_id(&body.shop_id, "shop")?;
    authz::require_at(&tenant, &principal, perms::SALES_CREATE, shop)?;
    let tenant_id = tenant.tenant_id();

    let lines = body
        .lines
        .iter()
        .map(|l| {
            Ok(SaleLineInput {
                product_id: ProductId::new(dto::parse_id(&l.product_id, "product")?),
                quantity: l.quantity,
                unit_price: l.unit_price,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let input = RecordSaleInput {
        sale_id: SaleId::new(AggregateId::new()),
        shop_id: LocationId::new(shop),
        cashier_id: Some(principal.principal_id().as_user_id()),
        payment: body.payment,
        lines,
        discount: body.discount,
        occurred_at: Utc::now(),
    };

    let committed = services.run(|d| workflows::record_sale(d, tenant_id, &input))?;
    let sale = services.read_models().sales.get(tenant_id, &input.sale_id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": input.sale_id.0.to_string(),
            "events_committed": committed.len(),
            "sale": sale,
        })),
    ))
}

/// Sales newest first. Without `?shop=` a shop-bound principal sees only
/// the sales of its own shops.
pub async fn list_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::SalesQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::SALES_READ)?;
    let shop = dto::parse_optional_id(query.shop.as_deref(), "shop")?;
    if let Some(shop) = shop {
        authz::require_location(&principal, shop)?;
    }

    let mut sales = services
        .read_models()
        .sales
        .list(tenant.tenant_id(), shop.map(LocationId::new));
    if !authz::sees_all_locations(&principal) {
        sales.retain(|s| principal.locations().contains(&s.shop_id.0));
    }
    Ok(Json(sales))
}

pub async fn get_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::SALES_READ)?;
    let id = dto::parse_id(&id, "sale")?;

    let sale = services
        .read_models()
        .sales
        .get(tenant.tenant_id(), &SaleId::new(id))
        .ok_or_else(|| ApiError::not_found("sale not found"))?;
    authz::require_location(&principal, sale.shop_id.0)?;
    Ok(Json(sale))
}

pub async fn void_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::SALES_VOID)?;
    let id = dto::parse_id(&id, "sale")?;
    let tenant_id = tenant.tenant_id();
    let sale_id = SaleId::new(id);

    let sale = services
        .read_models()
        .sales
        .get(tenant_id, &sale_id)
        .ok_or_else(|| ApiError::not_found("sale not found"))?;
    authz::require_location(&principal, sale.shop_id.0)?;

    let reason = body.and_then(|Json(b)| b.reason);
    let committed = services.run(|d| workflows::void_sale(d, tenant_id, sale_id, reason, Utc::now()))?;

    Ok(Json(serde_json::json!({
        "id": id.to_string(),
        "events_committed": committed.len(),
        "sale": services.read_models().sales.get(tenant_id, &sale_id),
    })))
}
