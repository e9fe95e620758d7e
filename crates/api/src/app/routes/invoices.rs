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
use retailops_infra::workflows::{self, InvoiceInput};
use retailops_invoicing::{NewInvoiceLine, SupplierInvoiceId};
use retailops_locations::LocationId;
use retailops_products::ProductId;

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(post_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/void", post(void_invoice))
}

/// Post a supplier invoice. The same supplier reference can be posted once
/// while it stands; voiding frees it.
pub async fn post_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::PostInvoiceRequest>,
) -> ApiResult<impl IntoResponse> {
    let warehouse = dto::parse_id(&body.warehouse_id, "warehouse")?;
    authz::require_at(&tenant, &principal, perms::INVOICES_WRITE, warehouse)?;
    let tenant_id = tenant.tenant_id();

    if let Some(existing) = services
        .read_models()
        .invoices
        .find_posted(tenant_id, &body.supplier, &body.reference)
    {
        return Err(ApiError::conflict(format!(
            "invoice {} from {} is already posted as {}",
            existing.reference, existing.supplier, existing.invoice_id.0
        )));
    }

    let lines = body
        .lines
        .iter()
        .map(|l| {
            Ok(NewInvoiceLine {
                product_id: ProductId::new(dto::parse_id(&l.product_id, "product")?),
                quantity: l.quantity,
                unit_cost: l.unit_cost,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let input = InvoiceInput {
        invoice_id: SupplierInvoiceId::new(AggregateId::new()),
        warehouse_id: LocationId::new(warehouse),
        supplier: body.supplier,
        reference: body.reference,
        invoice_date: body.invoice_date,
        lines,
        occurred_at: Utc::now(),
    };

    let committed = services.run(|d| workflows::post_invoice(d, tenant_id, &input))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": input.invoice_id.0.to_string(),
            "events_committed": committed.len(),
            "invoice": services.read_models().invoices.get(tenant_id, &input.invoice_id),
        })),
    ))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::InvoiceListQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::INVOICES_READ)?;
    let warehouse = dto::parse_optional_id(query.warehouse.as_deref(), "warehouse")?;
    if let Some(warehouse) = warehouse {
        authz::require_location(&principal, warehouse)?;
    }

    let mut invoices = services
        .read_models()
        .invoices
        .list(tenant.tenant_id(), warehouse.map(LocationId::new));
    if !authz::sees_all_locations(&principal) {
        invoices.retain(|i| principal.locations().contains(&i.warehouse_id.0));
    }
    Ok(Json(invoices))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::INVOICES_READ)?;
    let id = dto::parse_id(&id, "invoice")?;

    let invoice = services
        .read_models()
        .invoices
        .get(tenant.tenant_id(), &SupplierInvoiceId::new(id))
        .ok_or_else(|| ApiError::not_found("invoice not found"))?;
    authz::require_location(&principal, invoice.warehouse_id.0)?;
    Ok(Json(invoice))
}

pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::INVOICES_WRITE)?;
    let id = dto::parse_id(&id, "invoice")?;
    let tenant_id = tenant.tenant_id();
    let invoice_id = SupplierInvoiceId::new(id);

    let invoice = services
        .read_models()
        .invoices
        .get(tenant_id, &invoice_id)
        .ok_or_else(|| ApiError::not_found("invoice not found"))?;
    authz::require_location(&principal, invoice.warehouse_id.0)?;

    let reason = body.and_then(|Json(b)| b.reason);
    let committed = services.run(|d| workflows::void_invoice(d, tenant_id, invoice_id, reason, Utc::now()))?;

    Ok(Json(serde_json::json!({
        "id": id.to_string(),
        "events_committed": committed.len(),
        "invoice": services.read_models().invoices.get(tenant_id, &invoice_id),
    })))
}
