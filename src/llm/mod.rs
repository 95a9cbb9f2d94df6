pub mod client;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod stream_assembler;
pub mod types;

pub use client::{RetryPolicy, VisionProviderClient};
pub use provider::VisionProvider;
pub use types::{ImagePayload, ProviderRoute};
