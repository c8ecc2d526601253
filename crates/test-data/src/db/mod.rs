//! Seeding generated data into a segment engine.
//!
//! The [`Seeder`] works against Postgres or an in-memory store.

mod seeder;

pub use seeder::{SeedError, Seeder};
