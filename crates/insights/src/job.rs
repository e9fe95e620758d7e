use retailops_core::TenantId;

use crate::result::{InsightError, InsightResult};

/// A tenant-scoped, pure analytics unit.
///
/// Inputs are snapshots handed in by the caller; jobs perform no IO.
pub trait InsightJob: Send + Sync + 'static {
    type Input: Send + Sync + 'static;

    fn tenant_id(&self) -> TenantId;

    fn input(&self) -> &Self::Input;

    fn run(&self) -> Result<InsightResult, InsightError>;
}
