//! Core library for the `stampede` CLI.
//!
//! This crate provides the building blocks used by the binary: scenario
//! configuration and compilation, the load profile, the virtual-user
//! scheduler and step executor, check evaluation, metrics aggregation and
//! threshold rules, and report output. The primary user-facing interface is
//! the `stampede` command-line application; library APIs may evolve as the
//! CLI grows.
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod profile;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod thresholds;
pub mod utils;
