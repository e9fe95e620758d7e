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
use retailops_infra::{
    projections::TransferView,
    workflows::{self, TransferInput},
};
use retailops_locations::LocationId;
use retailops_products::ProductId;
use retailops_transfers::{TransferId, TransferLine};

use crate::app::dto;
use crate::app::errors::{ApiError, ApiResult};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(dispatch_transfer).get(list_transfers))
        .route("/:id", get(get_transfer))
        .route("/:id/receive", post(receive_transfer))
        .route("/:id/cancel", post(cancel_transfer))
}

fn load(services: &AppServices, tenant: &TenantContext, id: &str) -> ApiResult<TransferView> {
    let id = dto::parse_id(id, "transfer")?;
    services
        .read_models()
        .transfers
        .get(tenant.tenant_id(), &TransferId::new(id))
        .ok_or_else(|| ApiError::not_found("transfer not found"))
}

/// Take stock out of `from`; it stays in transit until received.
pub async fn dispatch_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::DispatchTransferRequest>,
) -> ApiResult<impl IntoResponse> {
    let from = dto::parse_id(&body.from, "source location")?;
    let to = dto::parse_id(&body.to, "destination location")?;
    authz::require_at(&tenant, &principal, perms::TRANSFERS_WRITE, from)?;
    let tenant_id = tenant.tenant_id();

    let lines = body
        .lines
        .iter()
        .map(|l| {
            Ok(TransferLine {
                product_id: ProductId::new(dto::parse_id(&l.product_id, "product")?),
                quantity: l.quantity,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let input = TransferInput {
        transfer_id: TransferId::new(AggregateId::new()),
        from: LocationId::new(from),
        to: LocationId::new(to),
        lines,
        note: body.note,
        occurred_at: Utc::now(),
    };

    let committed = services.run(|d| workflows::dispatch_transfer(d, tenant_id, &input))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": input.transfer_id.0.to_string(),
            "events_committed": committed.len(),
            "transfer": services.read_models().transfers.get(tenant_id, &input.transfer_id),
        })),
    ))
}

pub async fn list_transfers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TransferListQuery>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::TRANSFERS_READ)?;
    let location = dto::parse_optional_id(query.location.as_deref(), "location")?;
    if let Some(location) = location {
        authz::require_location(&principal, location)?;
    }

    let mut transfers = services.read_models().transfers.list(
        tenant.tenant_id(),
        location.map(LocationId::new),
        query.status,
    );
    if !authz::sees_all_locations(&principal) {
        let mine = principal.locations();
        transfers.retain(|t| mine.contains(&t.from.0) || mine.contains(&t.to.0));
    }
    Ok(Json(transfers))
}

pub async fn get_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authz::require(&tenant, &principal, perms::TRANSFERS_READ)?;
    let transfer = load(&services, &tenant, &id)?;
    if authz::require_location(&principal, transfer.from.0).is_err() {
        authz::require_location(&principal, transfer.to.0)?;
    }
    Ok(Json(transfer))
}

/// Only the destination can book a receipt.
pub async fn receive_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let transfer = load(&services, &tenant, &id)?;
    authz::require_at(&tenant, &principal, perms::TRANSFERS_WRITE, transfer.to.0)?;
    let tenant_id = tenant.tenant_id();
    let transfer_id = transfer.transfer_id;

    let committed = services.run(|d| workflows::receive_transfer(d, tenant_id, transfer_id, Utc::now()))?;

    Ok(Json(serde_json::json!({
        "id": transfer_id.0.to_string(),
        "events_committed": committed.len(),
        "transfer": services.read_models().transfers.get(tenant_id, &transfer_id),
    })))
}

/// Cancel an in-transit transfer; the stock returns to the source.
pub async fn cancel_transfer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReasonRequest>>,
) -> ApiResult<impl IntoResponse> {
    let transfer = load(&services, &tenant, &id)?;
    authz::require_at(&tenant, &principal, perms::TRANSFERS_WRITE, transfer.from.0)?;
    let tenant_id = tenant.tenant_id();
    let transfer_id = transfer.transfer_id;

    let reason = body.and_then(|Json(b)| b.reason);
    let committed =
        services.run(|d| workflows::cancel_transfer(d, tenant_id, transfer_id, reason, Utc::now()))?;

    Ok(Json(serde_json::json!({
        "id": transfer_id.0.to_string(),
        "events_committed": committed.len(),
        "transfer": services.read_models().transfers.get(tenant_id, &transfer_id),
    })))
}
