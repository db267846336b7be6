//! Cooperative cancellation of pipeline runs.
//!
//! Cancellation never interrupts an executor mid-task: the scheduler stops
//! launching stages, lets in-flight stages finish and skips the rest.

mod token;

pub use token::CancellationToken;
