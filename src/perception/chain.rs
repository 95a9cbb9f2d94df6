use std::sync::Arc;

use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::perception::traits::{LocateContext, Locator};
use crate::perception::types::{LocateOutcome, LocateRequest};

/// Tries locators in order. A locator that does not handle the request, or
/// answers `NotFound`, passes it on. Errors from any locator but the last
/// are logged and skipped; cancellation always stops the chain.
pub struct LocatorChain {
    locators: Vec<Arc<dyn Locator>>,
}

impl LocatorChain {
    pub fn new(locators: Vec<Arc<dyn Locator>>) -> Self {
        Self { locators }
    }

    pub fn names(&self) -> Vec<&str> {
        self.locators.iter().map(|l| l.name()).collect()
    }

    pub async fn locate(&self, request: &LocateRequest, ctx: &LocateContext<'_>) -> ScreenPointResult<LocateOutcome> {
        let last = self.locators.len().saturating_sub(1);
        for (i, locator) in self.locators.iter().enumerate() {
            if !locator.handles(request) {
                continue;
            }
            match locator.locate(request, ctx).await {
                Ok(LocateOutcome::NotFound) => {
                    tracing::debug!(locator = locator.name(), "locator passed");
                }
                Ok(outcome) => return Ok(outcome),
                Err(ScreenPointError::Cancelled) => return Err(ScreenPointError::Cancelled),
                Err(e) if i < last => {
                    tracing::warn!(locator = locator.name(), error = %e, "locator failed; trying next");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(LocateOutcome::NotFound)
    }
}
