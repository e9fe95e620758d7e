//! Cross-aggregate operations.
//!
//! Each workflow checks the aggregates it depends on (is the shop open? is
//! the product sellable?) through a [`UnitOfWork`](crate::unit_of_work::UnitOfWork)
//! and commits every resulting event in one atomic append.

pub mod retail;

pub use retail::{
    RecordSaleInput, SaleLineInput, TransferInput, InvoiceInput, adjust_stock, cancel_transfer,
    dispatch_transfer, post_invoice, receive_transfer, record_sale, set_reorder_level, void_invoice,
    void_sale,
};

use crate::command_dispatcher::DispatchError;

/// Attempts made before a concurrency conflict is surfaced.
pub const CONFLICT_RETRY_ATTEMPTS: usize = 3;

/// Re-run `op` when it fails on a stale stream version.
///
/// `op` must rebuild its unit of work from the store on every call.
pub fn with_conflict_retry<T>(mut op: impl FnMut() -> Result<T, DispatchError>) -> Result<T, DispatchError> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < CONFLICT_RETRY_ATTEMPTS => {
                tracing::debug!(attempt, error = %err, "retrying after concurrency conflict");
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_concurrency_conflicts_up_to_the_limit() {
        let mut calls = 0;
        let res: Result<(), _> = with_conflict_retry(|| {
            calls += 1;
            Err(DispatchError::Concurrency("stale".into()))
        });
        assert!(matches!(res, Err(DispatchError::Concurrency(_))));
        assert_eq!(calls, CONFLICT_RETRY_ATTEMPTS);
    }

    #[test]
    fn succeeds_after_a_transient_conflict() {
        let mut calls = 0;
        let res = with_conflict_retry(|| {
            calls += 1;
            if calls == 1 {
                Err(DispatchError::Concurrency("stale".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(res.unwrap(), 2);
    }

    #[test]
    fn does_not_retry_business_errors() {
        let mut calls = 0;
        let res: Result<(), _> = with_conflict_retry(|| {
            calls += 1;
            Err(DispatchError::InvariantViolation("insufficient stock".into()))
        });
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
