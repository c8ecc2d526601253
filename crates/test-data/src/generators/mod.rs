//! Entity generators for test data.
//!
//! - [`ActivityGenerator`]: Build uploadable activities from recorded samples
//! - [`SegmentGenerator`]: Cut favorite segments out of generated routes

pub mod activity;
pub mod segment;

pub use activity::{ActivityGenerator, ActivityNameConfig};
pub use segment::{SegmentExtractConfig, SegmentGenerator};
