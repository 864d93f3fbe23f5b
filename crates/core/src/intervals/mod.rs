//! Offline interval construction from presence transitions

mod builder;

pub use builder::{BuiltIntervals, IntervalBuilder};
