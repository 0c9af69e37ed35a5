//! Shared plumbing for Helio backends: logging bootstrap and platform paths.

pub mod logging;
pub mod platform;
