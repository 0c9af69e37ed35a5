//! Device-independent runtime model shared by Helio compute backends.
//!
//! A backend adapter (e.g. `helio-cuda`) executes [`command::CommandNode`]s
//! produced by the upstream command-queue scheduler. This crate holds the
//! pieces every backend agrees on: memory objects and their allocation-policy
//! flags, kernels/programs and argument descriptors, command nodes with their
//! completion events, the [`ops::DeviceOps`] trait with the shared
//! immediate-execution path, the on-disk kernel-artifact cache layout, and
//! configuration.

pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod ops;
