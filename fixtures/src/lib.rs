//! Contains functionality to create representative test simulations.
//!
//! Provides shared functionality for tests and benchmarks.

pub mod street_canyon;
