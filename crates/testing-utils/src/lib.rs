//! # Energy Testing Utils
//!
//! Shared testing utilities for the telemetry collection scheduler.
//! This crate provides scripted data sources, stage processors and event
//! publishers, plus builders for test readings and configuration.
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! energy-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! Then use the mocks in your tests:
//!
//! ```rust
//! use energy_testing_utils::mocks::*;
//! use energy_testing_utils::builders::sample_weather_batch;
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
