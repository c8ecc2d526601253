//! Fluent builder APIs for test scenarios.
//!
//! The [`ScenarioBuilder`] generates athletes who repeat routes, cuts
//! favorite segments out of those routes, and seeds them.

mod scenario;

pub use scenario::{RouteScenario, Scenario, ScenarioBuilder, ScenarioMetrics, ScenarioResult};
