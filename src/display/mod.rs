pub mod sources;
pub mod topology;
pub mod transform;
pub mod types;

pub use topology::DisplayTopology;
pub use transform::CoordinateTransformer;
pub use types::{CoordinateMode, Display, GlobalPoint, LocalPoint, NativePoint, NativeSpace, NormalizedPoint, Topology};
