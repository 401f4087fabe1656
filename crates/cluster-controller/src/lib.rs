pub mod config;
pub mod controller;
pub mod launch;
pub mod multicast;

pub use controller::{Controller, Timeouts};
pub use launch::LaunchFn;

/// PartialFailure marks a control operation in which some nodes did not
/// complete. The CLI surfaces it as exit code 3.
#[derive(Debug, thiserror::Error)]
#[error("some nodes failed to complete {0}")]
pub struct PartialFailure(pub &'static str);
