//! Route geometry sources.
//!
//! [`ProceduralGenerator`] builds synthetic routes and records noisy passes
//! over them.

mod procedural;

pub use procedural::{ProceduralGenerator, TrackConfig};
