//! Supplier invoices (event-sourced).
//!
//! Posting an invoice is how stock enters a warehouse and how product costs
//! are averaged. Voiding reverses both.

pub mod invoice;

pub use invoice::{
    AGGREGATE_TYPE, InvoiceCommand, InvoiceEvent, InvoiceLine, InvoicePosted, InvoiceStatus, InvoiceVoided,
    NewInvoiceLine, PostInvoice, SupplierInvoice, SupplierInvoiceId, VoidInvoice,
};
