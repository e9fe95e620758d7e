use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{sse::Event as SseEvent, IntoResponse, Sse},
    Json,
};
use tokio_stream::Stream;

use crate::app::services::{self, AppServices};
use crate::context::{PrincipalContext, TenantContext};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "tenant_id": tenant.tenant_id().to_string(),
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal.permissions().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        "locations": principal.locations().iter().map(|l| l.to_string()).collect::<Vec<_>>(),
    }))
}

pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    services::tenant_sse_stream(services, tenant.tenant_id())
}
