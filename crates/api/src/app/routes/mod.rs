use axum::{routing::get, Router};

pub mod dashboard;
pub mod inventory;
pub mod invoices;
pub mod locations;
pub mod products;
pub mod sales;
pub mod system;
pub mod transfers;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest("/locations", locations::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/sales", sales::router())
        .nest("/invoices", invoices::router())
        .nest("/transfers", transfers::router())
        .nest("/dashboard", dashboard::router())
}
