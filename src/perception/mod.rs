pub mod annotator;
pub mod chain;
pub mod dock;
pub mod locator;
pub mod prompt;
pub mod response;
pub mod screenshot;
pub mod traits;
pub mod types;

pub use annotator::MarkerOverlay;
pub use chain::LocatorChain;
pub use dock::DockLocator;
pub use locator::{LocatorSettings, VisionLocator};
pub use traits::{Annotator, LocateContext, Locator, ScreenCapture};
pub use types::{CaptureRegion, LocateOutcome, LocateRequest, Location};
