use chrono::NaiveDate;
use serde::Deserialize;

use retailops_core::AggregateId;
use retailops_locations::LocationKind;
use retailops_sales::PaymentMethod;
use retailops_transfers::TransferStatus;

use crate::app::errors::{ApiError, ApiResult};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct OpenLocationRequest {
    pub code: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationListQuery {
    pub kind: Option<LocationKind>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub price: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriceRequest {
    pub price: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    pub note: Option<String>,
}

/// `level: null` clears the reorder level.
#[derive(Debug, Deserialize)]
pub struct ReorderLevelRequest {
    pub level: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Defaults to the product's current price.
    pub unit_price: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordSaleRequest {
    pub shop_id: String,
    #[serde(default = "default_payment")]
    pub payment: PaymentMethod,
    pub lines: Vec<SaleLineRequest>,
    #[serde(default)]
    pub discount: u64,
}

fn default_payment() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    pub shop: Option<String>,
}

/// Body of every `/void` and `/cancel` endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost: u64,
}

#[derive(Debug, Deserialize)]
pub struct PostInvoiceRequest {
    pub warehouse_id: String,
    pub supplier: String,
    pub reference: String,
    /// Defaults to the posting date.
    pub invoice_date: Option<NaiveDate>,
    pub lines: Vec<InvoiceLineRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListQuery {
    pub warehouse: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferLineRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct DispatchTransferRequest {
    pub from: String,
    pub to: String,
    pub lines: Vec<TransferLineRequest>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransferListQuery {
    pub location: Option<String>,
    pub status: Option<TransferStatus>,
}

/// Date range of a dashboard request; both ends inclusive.
#[derive(Debug, Default, Deserialize)]
pub struct DashboardParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub top: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VelocityQuery {
    pub location: Option<String>,
    pub window: Option<u32>,
    pub as_of: Option<NaiveDate>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id(raw: &str, what: &str) -> ApiResult<AggregateId> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request("invalid_id", format!("invalid {what} id")))
}

pub fn parse_optional_id(raw: Option<&str>, what: &str) -> ApiResult<Option<AggregateId>> {
    raw.map(|r| parse_id(r, what)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_reports_the_kind_of_id() {
        let err = parse_id("nope", "shop").unwrap_err();
        assert_eq!(err.code, "invalid_id");
        assert_eq!(err.message, "invalid shop id");
    }

    #[test]
    fn sale_request_defaults_to_cash_without_discount() {
        let req: RecordSaleRequest = serde_json::from_value(serde_json::json!({
            "shop_id": AggregateId::new().to_string(),
            "lines": [{ "product_id": AggregateId::new().to_string(), "quantity": 2 }]
        }))
        .unwrap();
        assert_eq!(req.payment, PaymentMethod::Cash);
        assert_eq!(req.discount, 0);
        assert_eq!(req.lines[0].unit_price, None);
    }

    #[test]
    fn transfer_status_filter_uses_snake_case() {
        let q: TransferListQuery = serde_json::from_value(serde_json::json!({ "status": "in_transit" })).unwrap();
        assert_eq!(q.status, Some(TransferStatus::InTransit));
    }
}
