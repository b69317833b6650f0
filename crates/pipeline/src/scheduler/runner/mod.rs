//! Scheduler runner -- owns registered jobs and drives the tick loop.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, registration, and accessor methods
//! - `scheduling`: per-tick eligibility and the atomic claim pass
//! - `execution`: start/stop of the tick loop and spawned job execution

mod core;
mod execution;
mod scheduling;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
