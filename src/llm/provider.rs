use async_trait::async_trait;

use crate::errors::ScreenPointResult;
use crate::llm::types::{ProviderRoute, VisionRequest};

/// One wire format to a vision model. Implementations make a single attempt;
/// retries, timeouts and cancellation live in `VisionProviderClient`.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    fn route(&self) -> ProviderRoute;

    /// Returns the model's text answer for an image + prompt.
    async fn complete(&self, request: &VisionRequest) -> ScreenPointResult<String>;
}
