use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use retailops_auth::policy::perms;
use retailops_core::AggregateId;
use retailops_products::{
    ActivateProduct, ArchiveProduct, ChangePrice, CreateProduct, Product, ProductCommand, ProductId, UpdateProduct,
};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).patch(update_product))
        .route("/:id/price", post(change_price))
        .route("/:id/activate", post(activate_product))
        .route("/:id/archive", post(archive_product))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_WRITE)?;
    let tenant_id = tenant.tenant_id();

    if services.read_models().catalog.find_by_sku(tenant_id, &body.sku).is_some() {
        return Err(ApiError::conflict(format!("sku {} already exists", body.sku.trim())));
    }

    let product_id = ProductId::new(AggregateId::new());
    let committed = services.execute::<Product>(
        tenant_id,
        product_id.0,
        ProductCommand::CreateProduct(CreateProduct {
            tenant_id,
            product_id,
            sku: body.sku,
            name: body.name,
            category: body.category,
            barcode: body.barcode,
            price: body.price,
            occurred_at: Utc::now(),
        }),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": product_id.0.to_string(), "events_committed": committed.len()})),
    ))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_READ)?;
    Ok(Json(services.read_models().catalog.list(tenant.tenant_id())))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_READ)?;
    let id = dto::parse_id(&id, "product")?;

    services
        .read_models()
        .catalog
        .get(tenant.tenant_id(), &ProductId::new(id))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("product not found"))
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_WRITE)?;
    let id = dto::parse_id(&id, "product")?;
    let tenant_id = tenant.tenant_id();

    let cmd = ProductCommand::UpdateProduct(UpdateProduct {
        tenant_id,
        product_id: ProductId::new(id),
        name: body.name,
        category: body.category,
        barcode: body.barcode,
        occurred_at: Utc::now(),
    });
    let committed = services.execute::<Product>(tenant_id, id, cmd)?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}

pub async fn change_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangePriceRequest>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_WRITE)?;
    let id = dto::parse_id(&id, "product")?;
    let tenant_id = tenant.tenant_id();

    let cmd = ProductCommand::ChangePrice(ChangePrice {
        tenant_id,
        product_id: ProductId::new(id),
        price: body.price,
        occurred_at: Utc::now(),
    });
    let committed = services.execute::<Product>(tenant_id, id, cmd)?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}

pub async fn activate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_WRITE)?;
    let id = dto::parse_id(&id, "product")?;
    let tenant_id = tenant.tenant_id();

    let cmd = ProductCommand::ActivateProduct(ActivateProduct {
        tenant_id,
        product_id: ProductId::new(id),
        occurred_at: Utc::now(),
    });
    let committed = services.execute::<Product>(tenant_id, id, cmd)?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}

pub async fn archive_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::PRODUCTS_WRITE)?;
    let id = dto::parse_id(&id, "product")?;
    let tenant_id = tenant.tenant_id();

    let cmd = ProductCommand::ArchiveProduct(ArchiveProduct {
        tenant_id,
        product_id: ProductId::new(id),
        occurred_at: Utc::now(),
    });
    let committed = services.execute::<Product>(tenant_id, id, cmd)?;

    Ok(Json(serde_json::json!({"id": id.to_string(), "events_committed": committed.len()})))
}
