//! Amount helpers.
//!
//! Amounts are `u64` in the smallest currency unit (cents). Quantities are
//! `i64` so that stock deltas can be signed.

use crate::error::{DomainError, DomainResult};

/// `quantity × unit_amount`, rejecting negative quantities and overflow.
pub fn line_total(quantity: i64, unit_amount: u64) -> DomainResult<u64> {
    if quantity < 0 {
        return Err(DomainError::validation("quantity cannot be negative"));
    }
    (quantity as u64)
        .checked_mul(unit_amount)
        .ok_or_else(|| DomainError::validation("line amount overflows"))
}

/// Sum of amounts, rejecting overflow.
pub fn sum_amounts(amounts: impl IntoIterator<Item = u64>) -> DomainResult<u64> {
    amounts.into_iter().try_fold(0u64, |acc, a| {
        acc.checked_add(a)
            .ok_or_else(|| DomainError::validation("total amount overflows"))
    })
}
