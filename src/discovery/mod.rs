//! Tablet discovery: which tablets of a cell the health registry should know about.

mod checksum;
mod diff;
mod filter;
mod health_registry;
mod topology_watcher;

pub use checksum::*;
pub use diff::*;
pub use filter::*;
pub use health_registry::*;
pub use topology_watcher::*;

#[cfg(test)]
mod diff_test;
