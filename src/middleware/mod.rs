pub mod cors;
pub mod latency;
pub mod tracing;

pub use cors::*;
pub use latency::*;
