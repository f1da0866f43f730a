//! Integration test suite for kiln.
//!
//! These tests drive whole projects in temporary directories: release
//! builds, incremental script bundling, the watch → rebuild → reload path
//! and the dev-mode failure policy.
//!
//! # Test Categories
//!
//! - `build_e2e`: release builds, determinism, failure semantics
//! - `incremental_bundle`: module cache reuse and invalidation
//! - `watch_rebuild`: debouncing, routing and coalesced rebuilds
//! - `live_reload`: reload signalling
//!
//! External transforms are replaced with in-process fakes, so no tools
//! need to be installed.

mod fixtures;

mod build_e2e;
mod incremental_bundle;
mod live_reload;
mod watch_rebuild;
